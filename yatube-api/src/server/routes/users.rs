use crate::server::{
    Result, ServerError, ServerRouter,
    auth::AuthenticatedUser,
    html::{Found, Html, Query},
    routes::PageQuery,
    templates::{FollowTemplate, Layout, PageNav, PostCard, ProfileTemplate},
};
use axum::extract::State;
use axum_extra::routing::{RouterExt, TypedPath};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};
use yatube_common::model::{
    follow::Follow,
    post::PostFilter,
    user::{User, Username},
};
use yatube_db::client::DbClient;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_get(profile)
        .typed_get(follow_index)
        .typed_get(profile_follow)
        .typed_get(profile_unfollow)
}

async fn fetch_author(db: &DbClient, username: &Username) -> Result<User> {
    db.fetch_user_by_username(username)
        .await?
        .ok_or_else(|| ServerError::UserByNameNotFound(username.clone()))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/profile/{username}/", rejection(ServerError))]
pub struct ProfilePath {
    pub username: Username,
}

async fn profile(
    ProfilePath { username }: ProfilePath,
    Query(query): Query<PageQuery>,
    State(db): State<Arc<DbClient>>,
    viewer: Option<AuthenticatedUser>,
) -> Result<Html<ProfileTemplate>> {
    let author = fetch_author(&db, &username).await?;
    let page = db
        .fetch_post_page(PostFilter::Author(author.id), query.request())
        .await?;

    let follow = viewer
        .as_ref()
        .map(|viewer| Follow::new(viewer.user_id(), author.id))
        .filter(|follow| !follow.is_self_follow());
    let following = match follow {
        Some(follow) => db.follow_exists(follow).await?,
        None => false,
    };

    Ok(Html(ProfileTemplate {
        layout: Layout::new(viewer.as_ref()),
        author: author.username.to_string(),
        count: page.total,
        following,
        can_follow: follow.is_some(),
        follow_url: FollowPath {
            username: author.username.clone(),
        }
        .to_string(),
        unfollow_url: UnfollowPath {
            username: author.username,
        }
        .to_string(),
        posts: PostCard::list(&page),
        page: PageNav::new(&page),
    }))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/follow/", rejection(ServerError))]
pub struct FollowIndexPath();

async fn follow_index(
    FollowIndexPath(): FollowIndexPath,
    Query(query): Query<PageQuery>,
    State(db): State<Arc<DbClient>>,
    user: AuthenticatedUser,
) -> Result<Html<FollowTemplate>> {
    let page = db
        .fetch_post_page(PostFilter::FollowedBy(user.user_id()), query.request())
        .await?;
    let following = db.count_following(user.user_id()).await?;

    Ok(Html(FollowTemplate {
        layout: Layout::for_user(&user.user),
        following,
        posts: PostCard::list(&page),
        page: PageNav::new(&page),
    }))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/profile/{username}/follow/", rejection(ServerError))]
pub struct FollowPath {
    pub username: Username,
}

async fn profile_follow(
    FollowPath { username }: FollowPath,
    State(db): State<Arc<DbClient>>,
    user: AuthenticatedUser,
) -> Result<Found> {
    let author = fetch_author(&db, &username).await?;
    let follow = Follow::new(user.user_id(), author.id);

    if follow.is_self_follow() {
        debug!(user = %user.user.username, "Ignoring self-follow");
    } else if db.create_follow(follow).await? {
        info!(user = %user.user.username, author = %author.username, "Followed author");
    }

    Ok(Found(ProfilePath { username }.to_string()))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/profile/{username}/unfollow/", rejection(ServerError))]
pub struct UnfollowPath {
    pub username: Username,
}

async fn profile_unfollow(
    UnfollowPath { username }: UnfollowPath,
    State(db): State<Arc<DbClient>>,
    user: AuthenticatedUser,
) -> Result<Found> {
    let author = fetch_author(&db, &username).await?;

    if db
        .delete_follow(Follow::new(user.user_id(), author.id))
        .await?
    {
        info!(user = %user.user.username, author = %author.username, "Unfollowed author");
    }

    Ok(Found(FollowIndexPath().to_string()))
}

#[cfg(test)]
mod tests {
    use crate::server::test_util::TestApp;
    use axum::http::StatusCode;
    use yatube_common::model::follow::Follow;

    #[tokio::test]
    async fn profile_counts_posts_and_shows_follow_state() {
        let app = TestApp::new().await;
        let author = app.user("author").await;
        let reader = app.user("reader").await;
        let session = app.session(&reader).await;
        for i in 0..3 {
            app.post(&author, &format!("Пост {i}"), None).await;
        }

        let page = app.get("/profile/author/", Some(&session)).await;
        assert_eq!(page.status, StatusCode::OK);
        assert!(page.body.contains("Всего постов: 3"));
        assert!(page.body.contains("/profile/author/follow/"));

        app.get("/profile/author/follow/", Some(&session)).await;
        let following = app.get("/profile/author/", Some(&session)).await;
        assert!(following.body.contains("/profile/author/unfollow/"));

        let own = app.get("/profile/reader/", Some(&session)).await;
        assert!(!own.body.contains("/profile/reader/follow/"));
        assert!(!own.body.contains("/profile/reader/unfollow/"));
    }

    #[tokio::test]
    async fn follow_twice_then_unfollow() {
        let app = TestApp::new().await;
        let author = app.user("author").await;
        let reader = app.user("reader").await;
        let session = app.session(&reader).await;
        let follow = Follow::new(reader.id, author.id);

        for _ in 0..2 {
            let response = app.get("/profile/author/follow/", Some(&session)).await;
            assert_eq!(response.status, StatusCode::FOUND);
            assert_eq!(response.location.as_deref(), Some("/profile/author/"));
        }
        assert!(app.db.follow_exists(follow).await.unwrap());
        assert_eq!(app.db.count_following(reader.id).await.unwrap(), 1);

        for _ in 0..2 {
            let response = app.get("/profile/author/unfollow/", Some(&session)).await;
            assert_eq!(response.status, StatusCode::FOUND);
            assert_eq!(response.location.as_deref(), Some("/follow/"));
        }
        assert_eq!(app.db.count_following(reader.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn self_follow_is_ignored() {
        let app = TestApp::new().await;
        let author = app.user("author").await;
        let session = app.session(&author).await;

        for _ in 0..3 {
            let response = app.get("/profile/author/follow/", Some(&session)).await;
            assert_eq!(response.location.as_deref(), Some("/profile/author/"));
        }
        assert_eq!(app.db.count_following(author.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn follow_requires_login_and_known_author() {
        let app = TestApp::new().await;
        let author = app.user("author").await;
        let reader = app.user("reader").await;
        let session = app.session(&reader).await;

        let anonymous = app.get("/profile/author/follow/", None).await;
        assert_eq!(anonymous.status, StatusCode::FOUND);
        assert_eq!(
            anonymous.location.as_deref(),
            Some("/auth/login/?next=/profile/author/follow/")
        );
        assert!(!app.db.follow_exists(Follow::new(reader.id, author.id)).await.unwrap());

        let unknown = app.get("/profile/nobody/follow/", Some(&session)).await;
        assert_eq!(unknown.status, StatusCode::NOT_FOUND);
        let unknown = app.get("/profile/nobody/unfollow/", Some(&session)).await;
        assert_eq!(unknown.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn feed_shows_only_followed_authors() {
        let app = TestApp::new().await;
        let author = app.user("author").await;
        let stranger = app.user("stranger").await;
        let reader = app.user("reader").await;
        let session = app.session(&reader).await;
        app.post(&author, "Пост автора", None).await;
        app.post(&stranger, "Пост незнакомца", None).await;

        let empty = app.get("/follow/", Some(&session)).await;
        assert_eq!(empty.status, StatusCode::OK);
        assert!(!empty.body.contains("Пост автора"));
        assert!(empty.body.contains("Авторов в подписках: 0"));

        app.get("/profile/author/follow/", Some(&session)).await;
        let feed = app.get("/follow/", Some(&session)).await;
        assert!(feed.body.contains("Авторов в подписках: 1"));
        assert!(feed.body.contains("Пост автора"));
        assert!(!feed.body.contains("Пост незнакомца"));

        let anonymous = app.get("/follow/", None).await;
        assert_eq!(anonymous.location.as_deref(), Some("/auth/login/?next=/follow/"));
    }
}
