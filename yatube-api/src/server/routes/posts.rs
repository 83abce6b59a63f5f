use crate::server::{
    Result, ServerError, ServerRouter,
    auth::AuthenticatedUser,
    forms::{CommentForm, FieldErrors, PostSubmission, ValidPost},
    html::{Form, Found, Html, Query, html_response},
    media::{MediaStore, media_url},
    routes::{PageQuery, users::ProfilePath},
    templates::{
        GroupListTemplate, GroupOption, IndexTemplate, Layout, PageNav, PostCard,
        PostDetailTemplate, PostFormTemplate,
    },
};
use askama::Template;
use axum::{
    extract::State,
    http::{Uri, uri::PathAndQuery},
    response::{IntoResponse, Response},
};
use axum_extra::routing::{RouterExt, TypedPath};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use yatube_common::{
    cache::PageCache,
    model::{
        Id,
        group::{Group, GroupSlug},
        post::{Post, PostContent, PostFilter, PostMarker},
    },
};
use yatube_db::client::DbClient;

const INDEX_TITLE: &str = "Последние обновления на сайте";
/// Cache scope of pages rendered for visitors without a session.
const ANONYMOUS_SCOPE: &str = "anonymous";

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_get(index)
        .typed_get(group_posts)
        .typed_get(post_detail)
        .typed_get(create_post_form)
        .typed_post(create_post)
        .typed_get(edit_post_form)
        .typed_post(edit_post)
        .typed_post(add_comment)
}

async fn fetch_post(db: &DbClient, id: Id<PostMarker>) -> Result<Post> {
    db.fetch_post(id)
        .await?
        .ok_or(ServerError::PostByIdNotFound(id))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/", rejection(ServerError))]
pub struct IndexPath();

async fn index(
    IndexPath(): IndexPath,
    Query(query): Query<PageQuery>,
    uri: Uri,
    State(db): State<Arc<DbClient>>,
    State(cache): State<Arc<PageCache>>,
    viewer: Option<AuthenticatedUser>,
) -> Result<Response> {
    let scope = viewer.as_ref().map_or_else(
        || ANONYMOUS_SCOPE.to_owned(),
        |viewer| viewer.user_id().to_string(),
    );
    let key = cache.key(&scope, uri.path_and_query().map_or("/", PathAndQuery::as_str));

    let body = cache
        .get_or_render(key, move || async move {
            let page = db.fetch_post_page(PostFilter::All, query.request()).await?;
            let template = IndexTemplate {
                layout: Layout::new(viewer.as_ref()),
                title: INDEX_TITLE.to_owned(),
                posts: PostCard::list(&page),
                page: PageNav::new(&page),
            };

            Ok::<_, ServerError>(template.render()?)
        })
        .await?;

    Ok(html_response(body))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/group/{slug}/", rejection(ServerError))]
pub struct GroupPostsPath {
    pub slug: GroupSlug,
}

async fn group_posts(
    GroupPostsPath { slug }: GroupPostsPath,
    Query(query): Query<PageQuery>,
    State(db): State<Arc<DbClient>>,
    viewer: Option<AuthenticatedUser>,
) -> Result<Html<GroupListTemplate>> {
    let group = db
        .fetch_group_by_slug(&slug)
        .await?
        .ok_or_else(|| ServerError::GroupBySlugNotFound(slug.clone()))?;
    let page = db
        .fetch_post_page(PostFilter::Group(group.id), query.request())
        .await?;

    Ok(Html(GroupListTemplate {
        layout: Layout::new(viewer.as_ref()),
        title: group.title,
        description: group.description,
        posts: PostCard::list(&page),
        page: PageNav::new(&page),
    }))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts/{id}/", rejection(ServerError))]
pub struct PostDetailPath {
    pub id: Id<PostMarker>,
}

async fn detail_page(
    db: &DbClient,
    viewer: Option<&AuthenticatedUser>,
    post: &Post,
) -> Result<PostDetailTemplate> {
    let count = db.count_posts(PostFilter::Author(post.author.id)).await?;
    let comments = db.fetch_post_comments(post.id).await?;

    Ok(PostDetailTemplate::new(viewer, post, count, &comments))
}

async fn post_detail(
    PostDetailPath { id }: PostDetailPath,
    State(db): State<Arc<DbClient>>,
    viewer: Option<AuthenticatedUser>,
) -> Result<Html<PostDetailTemplate>> {
    let post = fetch_post(&db, id).await?;

    Ok(Html(detail_page(&db, viewer.as_ref(), &post).await?))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/create/", rejection(ServerError))]
pub struct CreatePostPath();

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts/{id}/edit/", rejection(ServerError))]
pub struct EditPostPath {
    pub id: Id<PostMarker>,
}

/// The post form, for a new post when `editing` is `None`.
fn post_form(
    user: &AuthenticatedUser,
    groups: &[Group],
    editing: Option<&Post>,
    submission: &PostSubmission,
    errors: &FieldErrors,
) -> PostFormTemplate {
    let image = editing.and_then(|post| post.image.as_deref());

    PostFormTemplate {
        layout: Layout::for_user(&user.user),
        is_edit: editing.is_some(),
        action: editing.map_or_else(
            || CreatePostPath().to_string(),
            |post| EditPostPath { id: post.id }.to_string(),
        ),
        text: submission.text.clone(),
        groups: GroupOption::list(groups, &submission.group),
        has_image: image.is_some(),
        image_url: image.map(media_url).unwrap_or_default(),
        text_errors: errors.field("text"),
        group_errors: errors.field("group"),
        image_errors: errors.field("image"),
    }
}

/// Stores the uploaded image, if any, and returns what gets persisted.
async fn store_content(media: &MediaStore, post: ValidPost) -> Result<PostContent> {
    let image = match post.image {
        Some(image) => Some(
            media
                .save_post_image(image.format, &image.bytes)
                .await
                .map_err(ServerError::Media)?,
        ),
        None => None,
    };

    Ok(PostContent {
        text: post.text,
        group: post.group,
        image,
    })
}

async fn create_post_form(
    CreatePostPath(): CreatePostPath,
    State(db): State<Arc<DbClient>>,
    user: AuthenticatedUser,
) -> Result<Html<PostFormTemplate>> {
    let groups = db.fetch_groups().await?;

    Ok(Html(post_form(
        &user,
        &groups,
        None,
        &PostSubmission::default(),
        &FieldErrors::default(),
    )))
}

async fn create_post(
    CreatePostPath(): CreatePostPath,
    State(db): State<Arc<DbClient>>,
    State(media): State<Arc<MediaStore>>,
    user: AuthenticatedUser,
    submission: PostSubmission,
) -> Result<Response> {
    let groups = db.fetch_groups().await?;
    let post = match submission.validate(&groups) {
        Ok(post) => post,
        Err(errors) => {
            let form = post_form(&user, &groups, None, &submission, &errors);
            return Ok(Html(form).into_response());
        }
    };

    let content = store_content(&media, post).await?;
    let post_id = db.create_post(user.user_id(), &content).await?;
    info!(%post_id, author = %user.user.username, "Created post");

    let profile = ProfilePath {
        username: user.user.username,
    };
    Ok(Found(profile.to_string()).into_response())
}

/// The post at `id`, provided `user` wrote it.
async fn fetch_own_post(
    db: &DbClient,
    id: Id<PostMarker>,
    user: &AuthenticatedUser,
) -> Result<Post> {
    let post = fetch_post(db, id).await?;

    if post.is_authored_by(user.user_id()) {
        Ok(post)
    } else {
        Err(ServerError::Forbidden)
    }
}

async fn edit_post_form(
    EditPostPath { id }: EditPostPath,
    State(db): State<Arc<DbClient>>,
    user: AuthenticatedUser,
) -> Result<Html<PostFormTemplate>> {
    let post = fetch_own_post(&db, id, &user).await?;
    let groups = db.fetch_groups().await?;
    let submission = PostSubmission {
        text: post.text.get().to_owned(),
        group: post
            .group
            .as_ref()
            .map(|group| group.id.to_string())
            .unwrap_or_default(),
        image: None,
    };

    Ok(Html(post_form(
        &user,
        &groups,
        Some(&post),
        &submission,
        &FieldErrors::default(),
    )))
}

async fn edit_post(
    EditPostPath { id }: EditPostPath,
    State(db): State<Arc<DbClient>>,
    State(media): State<Arc<MediaStore>>,
    user: AuthenticatedUser,
    submission: PostSubmission,
) -> Result<Response> {
    let post = fetch_own_post(&db, id, &user).await?;
    let groups = db.fetch_groups().await?;
    let valid = match submission.validate(&groups) {
        Ok(valid) => valid,
        Err(errors) => {
            let form = post_form(&user, &groups, Some(&post), &submission, &errors);
            return Ok(Html(form).into_response());
        }
    };

    let content = store_content(&media, valid).await?;
    db.update_post(id, &content).await?;
    info!(post_id = %id, "Updated post");

    Ok(Found(PostDetailPath { id }.to_string()).into_response())
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts/{id}/comment/", rejection(ServerError))]
pub struct CommentPath {
    pub id: Id<PostMarker>,
}

async fn add_comment(
    CommentPath { id }: CommentPath,
    State(db): State<Arc<DbClient>>,
    user: AuthenticatedUser,
    Form(form): Form<CommentForm>,
) -> Result<Response> {
    let post = fetch_post(&db, id).await?;

    match form.validate() {
        Ok(text) => {
            let comment_id = db.create_comment(post.id, user.user_id(), &text).await?;
            info!(%comment_id, post_id = %id, "Created comment");

            Ok(Found(PostDetailPath { id }.to_string()).into_response())
        }
        Err(errors) => {
            let page = detail_page(&db, Some(&user), &post)
                .await?
                .with_comment(form.text, &errors);

            Ok(Html(page).into_response())
        }
    }
}
