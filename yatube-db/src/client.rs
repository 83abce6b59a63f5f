use crate::record::{
    CommentRecord, CredentialsRecord, GroupRecord, PostRecord, UserRecord, to_primitive,
};
use sqlx::{
    QueryBuilder, Sqlite, SqlitePool,
    migrate::{MigrateError, Migrator},
    query, query_as, query_scalar,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::{fmt::Debug, str::FromStr, sync::Arc};
use thiserror::Error;
use time::Duration;
use tracing::{debug, info};
use yatube_common::{
    clock::Clock,
    model::{
        Id, ModelValidationError,
        auth::{AuthTokenHash, PasswordDigest},
        comment::{Comment, CommentMarker},
        follow::Follow,
        group::{Group, GroupMarker, GroupSlug, NewGroup},
        post::{Post, PostContent, PostFilter, PostMarker},
        text::Text,
        user::{NewUser, User, UserMarker, Username},
    },
    pagination::{POSTS_PER_PAGE, Page, PageRequest, Paginator},
};

pub type Result<T, E = DbError> = std::result::Result<T, E>;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

#[derive(Debug, Error)]
pub enum DbError {
    #[error("An object in the database was invalid: {0}")]
    Data(#[from] ModelValidationError),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error("Applying migrations failed: {0}")]
    Migrate(#[from] MigrateError),
}

macro_rules! post_select {
    () => {
        "
        SELECT
            posts.id AS post_id,
            posts.text,
            posts.created_at,
            posts.image,
            users.id AS author_id,
            users.username AS author_username,
            post_groups.id AS group_id,
            post_groups.title AS group_title,
            post_groups.slug AS group_slug,
            post_groups.description AS group_description
        FROM
            posts
            JOIN users ON users.id = posts.author_id
            LEFT JOIN post_groups ON post_groups.id = posts.group_id
        "
    };
}

const NEWEST_FIRST: &str = " ORDER BY posts.created_at DESC, posts.id DESC";

fn is_constraint_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            db_err.is_unique_violation() || db_err.is_check_violation()
        }
        _ => false,
    }
}

fn push_post_filter(builder: &mut QueryBuilder<'_, Sqlite>, filter: PostFilter) {
    match filter {
        PostFilter::All => {}
        PostFilter::Group(group) => {
            builder.push(" WHERE posts.group_id = ").push_bind(group.get());
        }
        PostFilter::Author(author) => {
            builder.push(" WHERE posts.author_id = ").push_bind(author.get());
        }
        PostFilter::FollowedBy(user) => {
            builder
                .push(" WHERE posts.author_id IN (")
                .push("SELECT follows.author_id FROM follows WHERE follows.user_id = ")
                .push_bind(user.get())
                .push(")");
        }
    }
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

pub struct DbClient {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl Debug for DbClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbClient")
            .field("pool", &self.pool)
            .field("clock", &self.clock)
            .finish()
    }
}

impl DbClient {
    #[must_use]
    pub fn new(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    pub async fn connect(database_url: &str, clock: Arc<dyn Clock>) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;

        info!(database_url, "Connected to database");
        Ok(Self::new(pool, clock))
    }

    /// A private database that lives as long as the client.
    pub async fn connect_in_memory(clock: Arc<dyn Clock>) -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        // Every connection would see its own empty database, so there must be exactly one.
        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Ok(Self::new(pool, clock))
    }

    pub async fn migrate(&self) -> Result<()> {
        MIGRATOR.run(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub async fn create_user(&self, user: &NewUser) -> Result<Option<User>> {
        let result = query_scalar::<_, i64>(
            "
            INSERT INTO users (username, password_hash)
            VALUES ($1, $2)
            RETURNING id
            ",
        )
        .bind(user.username.get())
        .bind(user.password.as_phc())
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(user_id) => Ok(Some(User {
                id: user_id.into(),
                username: user.username.clone(),
            })),
            Err(err) if is_constraint_violation(&err) => {
                debug!(username = %user.username, "Username already taken");
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    pub async fn fetch_user(&self, user_id: Id<UserMarker>) -> Result<Option<User>> {
        let record = query_as::<_, UserRecord>(
            "
            SELECT
                users.id AS user_id,
                users.username
            FROM
                users
            WHERE
                users.id = $1
            ",
        )
        .bind(user_id.get())
        .fetch_optional(&self.pool)
        .await?;

        let user = record.map(User::try_from).transpose()?;
        Ok(user)
    }

    pub async fn fetch_user_by_username(&self, username: &Username) -> Result<Option<User>> {
        let record = query_as::<_, UserRecord>(
            "
            SELECT
                users.id AS user_id,
                users.username
            FROM
                users
            WHERE
                users.username = $1
            ",
        )
        .bind(username.get())
        .fetch_optional(&self.pool)
        .await?;

        let user = record.map(User::try_from).transpose()?;
        Ok(user)
    }

    pub async fn fetch_credentials(
        &self,
        username: &Username,
    ) -> Result<Option<(User, PasswordDigest)>> {
        let record = query_as::<_, CredentialsRecord>(
            "
            SELECT
                users.id AS user_id,
                users.username,
                users.password_hash
            FROM
                users
            WHERE
                users.username = $1
            ",
        )
        .bind(username.get())
        .fetch_optional(&self.pool)
        .await?;

        let credentials = record.map(<(User, PasswordDigest)>::try_from).transpose()?;
        Ok(credentials)
    }

    /// Also deletes everything the user owns: posts, comments, follows and sessions.
    pub async fn delete_user(&self, user_id: Id<UserMarker>) -> Result<bool> {
        let result = query("DELETE FROM users WHERE id = $1")
            .bind(user_id.get())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn create_group(&self, group: &NewGroup) -> Result<Group> {
        let group_id = query_scalar::<_, i64>(
            "
            INSERT INTO post_groups (title, slug, description)
            VALUES ($1, $2, $3)
            RETURNING id
            ",
        )
        .bind(&group.title)
        .bind(group.slug.get())
        .bind(&group.description)
        .fetch_one(&self.pool)
        .await?;

        Ok(Group {
            id: group_id.into(),
            title: group.title.clone(),
            slug: group.slug.clone(),
            description: group.description.clone(),
        })
    }

    pub async fn fetch_group(&self, group_id: Id<GroupMarker>) -> Result<Option<Group>> {
        let record = query_as::<_, GroupRecord>(
            "
            SELECT
                post_groups.id AS group_id,
                post_groups.title,
                post_groups.slug,
                post_groups.description
            FROM
                post_groups
            WHERE
                post_groups.id = $1
            ",
        )
        .bind(group_id.get())
        .fetch_optional(&self.pool)
        .await?;

        let group = record.map(Group::try_from).transpose()?;
        Ok(group)
    }

    pub async fn fetch_group_by_slug(&self, slug: &GroupSlug) -> Result<Option<Group>> {
        let record = query_as::<_, GroupRecord>(
            "
            SELECT
                post_groups.id AS group_id,
                post_groups.title,
                post_groups.slug,
                post_groups.description
            FROM
                post_groups
            WHERE
                post_groups.slug = $1
            ",
        )
        .bind(slug.get())
        .fetch_optional(&self.pool)
        .await?;

        let group = record.map(Group::try_from).transpose()?;
        Ok(group)
    }

    pub async fn fetch_groups(&self) -> Result<Vec<Group>> {
        let records = query_as::<_, GroupRecord>(
            "
            SELECT
                post_groups.id AS group_id,
                post_groups.title,
                post_groups.slug,
                post_groups.description
            FROM
                post_groups
            ORDER BY
                post_groups.title
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        let groups = records
            .into_iter()
            .map(Group::try_from)
            .collect::<Result<_, _>>()?;
        Ok(groups)
    }

    /// Posts in the group stay, without a group.
    pub async fn delete_group(&self, group_id: Id<GroupMarker>) -> Result<bool> {
        let result = query("DELETE FROM post_groups WHERE id = $1")
            .bind(group_id.get())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn create_post(
        &self,
        author: Id<UserMarker>,
        content: &PostContent,
    ) -> Result<Id<PostMarker>> {
        let post_id = query_scalar::<_, i64>(
            "
            INSERT INTO posts (text, created_at, author_id, group_id, image)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            ",
        )
        .bind(content.text.get())
        .bind(to_primitive(self.clock.now()))
        .bind(author.get())
        .bind(content.group.map(Id::get))
        .bind(content.image.as_deref())
        .fetch_one(&self.pool)
        .await?;

        Ok(post_id.into())
    }

    pub async fn fetch_post(&self, post_id: Id<PostMarker>) -> Result<Option<Post>> {
        let record = query_as::<_, PostRecord>(concat!(post_select!(), " WHERE posts.id = $1"))
            .bind(post_id.get())
            .fetch_optional(&self.pool)
            .await?;

        let post = record.map(Post::try_from).transpose()?;
        Ok(post)
    }

    /// Rewrites what the form controls. Identity, author and creation time never change.
    pub async fn update_post(
        &self,
        post_id: Id<PostMarker>,
        content: &PostContent,
    ) -> Result<bool> {
        let result = query(
            "
            UPDATE posts
            SET
                text = $1,
                group_id = $2,
                image = COALESCE($3, image)
            WHERE
                id = $4
            ",
        )
        .bind(content.text.get())
        .bind(content.group.map(Id::get))
        .bind(content.image.as_deref())
        .bind(post_id.get())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn count_posts(&self, filter: PostFilter) -> Result<u64> {
        let mut builder = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM posts");
        push_post_filter(&mut builder, filter);

        let count: i64 = builder.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    /// One page of the newest-first listing selected by `filter`.
    pub async fn fetch_post_page(
        &self,
        filter: PostFilter,
        request: PageRequest,
    ) -> Result<Page<Post>> {
        let paginator = Paginator::new(self.count_posts(filter).await?, POSTS_PER_PAGE);
        let window = paginator.locate(request);

        let mut builder = QueryBuilder::<Sqlite>::new(post_select!());
        push_post_filter(&mut builder, filter);
        builder
            .push(NEWEST_FIRST)
            .push(" LIMIT ")
            .push_bind(to_i64(window.limit))
            .push(" OFFSET ")
            .push_bind(to_i64(window.offset));

        let records = builder
            .build_query_as::<PostRecord>()
            .fetch_all(&self.pool)
            .await?;
        let posts = records
            .into_iter()
            .map(Post::try_from)
            .collect::<Result<_, _>>()?;

        Ok(paginator.page(window, posts))
    }

    pub async fn create_comment(
        &self,
        post_id: Id<PostMarker>,
        author: Id<UserMarker>,
        text: &Text,
    ) -> Result<Id<CommentMarker>> {
        let comment_id = query_scalar::<_, i64>(
            "
            INSERT INTO comments (post_id, author_id, text, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            ",
        )
        .bind(post_id.get())
        .bind(author.get())
        .bind(text.get())
        .bind(to_primitive(self.clock.now()))
        .fetch_one(&self.pool)
        .await?;

        Ok(comment_id.into())
    }

    /// Newest first.
    pub async fn fetch_post_comments(&self, post_id: Id<PostMarker>) -> Result<Vec<Comment>> {
        let records = query_as::<_, CommentRecord>(
            "
            SELECT
                comments.id AS comment_id,
                comments.post_id,
                comments.text,
                comments.created_at,
                users.id AS author_id,
                users.username AS author_username
            FROM
                comments
                JOIN users ON users.id = comments.author_id
            WHERE
                comments.post_id = $1
            ORDER BY
                comments.created_at DESC,
                comments.id DESC
            ",
        )
        .bind(post_id.get())
        .fetch_all(&self.pool)
        .await?;

        let comments = records
            .into_iter()
            .map(Comment::try_from)
            .collect::<Result<_, _>>()?;
        Ok(comments)
    }

    /// Returns whether a new follow was stored.
    ///
    /// Duplicates and self-follows are refused by the schema and reported as `false`.
    pub async fn create_follow(&self, follow: Follow) -> Result<bool> {
        let result = query("INSERT INTO follows (user_id, author_id) VALUES ($1, $2)")
            .bind(follow.user.get())
            .bind(follow.author.get())
            .execute(&self.pool)
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(err) if is_constraint_violation(&err) => {
                debug!(?follow, "Follow refused by constraint");
                Ok(false)
            }
            Err(err) => Err(err.into()),
        }
    }

    pub async fn delete_follow(&self, follow: Follow) -> Result<bool> {
        let result = query("DELETE FROM follows WHERE user_id = $1 AND author_id = $2")
            .bind(follow.user.get())
            .bind(follow.author.get())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn follow_exists(&self, follow: Follow) -> Result<bool> {
        let exists = query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM follows WHERE user_id = $1 AND author_id = $2)",
        )
        .bind(follow.user.get())
        .bind(follow.author.get())
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    /// How many authors `user` follows.
    pub async fn count_following(&self, user: Id<UserMarker>) -> Result<u64> {
        let count = query_scalar::<_, i64>("SELECT COUNT(*) FROM follows WHERE user_id = $1")
            .bind(user.get())
            .fetch_one(&self.pool)
            .await?;

        Ok(u64::try_from(count).unwrap_or_default())
    }

    pub async fn create_authentication(
        &self,
        user: Id<UserMarker>,
        token_hash: &AuthTokenHash,
        lifetime: Duration,
    ) -> Result<()> {
        let now = self.clock.now();

        query(
            "
            INSERT INTO authentications (token_hash, user_id, created_at, expires_at)
            VALUES ($1, $2, $3, $4)
            ",
        )
        .bind(token_hash.0.to_vec())
        .bind(user.get())
        .bind(to_primitive(now))
        .bind(to_primitive(now + lifetime))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// The user behind an unexpired session, provided the token was issued to them.
    pub async fn fetch_authenticated_user(
        &self,
        user: Id<UserMarker>,
        token_hash: &AuthTokenHash,
    ) -> Result<Option<User>> {
        let record = query_as::<_, UserRecord>(
            "
            SELECT
                users.id AS user_id,
                users.username
            FROM
                authentications
                JOIN users ON users.id = authentications.user_id
            WHERE
                authentications.token_hash = $1
                AND authentications.user_id = $2
                AND authentications.expires_at > $3
            ",
        )
        .bind(token_hash.0.to_vec())
        .bind(user.get())
        .bind(to_primitive(self.clock.now()))
        .fetch_optional(&self.pool)
        .await?;

        let user = record.map(User::try_from).transpose()?;
        Ok(user)
    }

    pub async fn delete_authentication(&self, token_hash: &AuthTokenHash) -> Result<bool> {
        let result = query("DELETE FROM authentications WHERE token_hash = $1")
            .bind(token_hash.0.to_vec())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use crate::client::DbClient;
    use std::sync::Arc;
    use time::{Duration, macros::utc_datetime};
    use yatube_common::{
        clock::ManualClock,
        model::{
            Id,
            auth::{AuthToken, PasswordDigest},
            follow::Follow,
            group::{Group, GroupSlug, NewGroup},
            post::{PostContent, PostFilter},
            text::Text,
            user::{NewUser, User, Username},
        },
        pagination::PageRequest,
    };

    async fn client() -> (DbClient, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(utc_datetime!(2022-08-08 21:38)));
        let db = DbClient::connect_in_memory(clock.clone()).await.unwrap();
        db.migrate().await.unwrap();
        (db, clock)
    }

    async fn user(db: &DbClient, name: &str) -> User {
        let new_user = NewUser {
            username: Username::new(name.to_owned()).unwrap(),
            password: PasswordDigest::from_phc("not-a-real-digest".to_owned()),
        };
        db.create_user(&new_user).await.unwrap().unwrap()
    }

    async fn group(db: &DbClient, slug: &str) -> Group {
        let new_group = NewGroup {
            title: "Тестовая группа".to_owned(),
            slug: GroupSlug::new(slug.to_owned()).unwrap(),
            description: "Тестовое описание".to_owned(),
        };
        db.create_group(&new_group).await.unwrap()
    }

    fn content(text: &str, group: Option<&Group>) -> PostContent {
        PostContent {
            text: Text::new(text).unwrap(),
            group: group.map(|group| group.id),
            image: None,
        }
    }

    #[tokio::test]
    async fn usernames_are_unique() {
        let (db, _) = client().await;
        let author = user(&db, "author").await;

        let duplicate = NewUser {
            username: author.username.clone(),
            password: PasswordDigest::from_phc("other".to_owned()),
        };
        assert_eq!(db.create_user(&duplicate).await.unwrap(), None);

        let (found, digest) = db
            .fetch_credentials(&author.username)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found, author);
        assert_eq!(digest.as_phc(), "not-a-real-digest");
        assert_eq!(db.fetch_user(author.id).await.unwrap(), Some(author));
    }

    #[tokio::test]
    async fn post_round_trip_and_update() {
        let (db, clock) = client().await;
        let author = user(&db, "author").await;
        let first = group(&db, "first").await;
        let second = group(&db, "second").await;

        let mut created = content("Тестовый пост", Some(&first));
        created.image = Some("posts/small.gif".to_owned());
        let post_id = db.create_post(author.id, &created).await.unwrap();

        let post = db.fetch_post(post_id).await.unwrap().unwrap();
        assert_eq!(post.text.get(), "Тестовый пост");
        assert_eq!(post.author, author);
        assert_eq!(post.group.as_ref(), Some(&first));
        assert_eq!(post.created_at, utc_datetime!(2022-08-08 21:38));

        clock.advance(Duration::hours(1));
        let edited = content("Изменённый пост", Some(&second));
        assert!(db.update_post(post_id, &edited).await.unwrap());

        let updated = db.fetch_post(post_id).await.unwrap().unwrap();
        assert_eq!(updated.id, post_id);
        assert_eq!(updated.text.get(), "Изменённый пост");
        assert_eq!(updated.group.as_ref(), Some(&second));
        assert_eq!(updated.created_at, post.created_at);
        assert_eq!(updated.image.as_deref(), Some("posts/small.gif"));

        assert_eq!(db.count_posts(PostFilter::Group(first.id)).await.unwrap(), 0);
        assert_eq!(db.count_posts(PostFilter::Group(second.id)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn pages_are_newest_first() {
        let (db, clock) = client().await;
        let author = user(&db, "author").await;

        let mut ids = Vec::new();
        for i in 0..13 {
            clock.advance(Duration::minutes(1));
            let post = content(&format!("Пост {i}"), None);
            ids.push(db.create_post(author.id, &post).await.unwrap());
        }
        ids.reverse();

        let first = db.fetch_post_page(PostFilter::All, PageRequest::First).await.unwrap();
        let second = db
            .fetch_post_page(PostFilter::Author(author.id), PageRequest::Number(2))
            .await
            .unwrap();
        assert_eq!(first.items.len(), 10);
        assert_eq!(second.items.len(), 3);
        assert_eq!(second.num_pages, 2);

        let listed: Vec<_> = first.items.iter().chain(&second.items).map(|post| post.id).collect();
        assert_eq!(listed, ids);

        let clamped = db.fetch_post_page(PostFilter::All, PageRequest::Number(50)).await.unwrap();
        assert_eq!(clamped.number, 2);
    }

    #[tokio::test]
    async fn equal_timestamps_order_by_id() {
        let (db, _) = client().await;
        let author = user(&db, "author").await;

        let older = db.create_post(author.id, &content("older", None)).await.unwrap();
        let newer = db.create_post(author.id, &content("newer", None)).await.unwrap();

        let page = db.fetch_post_page(PostFilter::All, PageRequest::First).await.unwrap();
        let listed: Vec<_> = page.items.iter().map(|post| post.id).collect();
        assert_eq!(listed, [newer, older]);
    }

    #[tokio::test]
    async fn deleting_a_group_keeps_its_posts() {
        let (db, _) = client().await;
        let author = user(&db, "author").await;
        let group = group(&db, "doomed").await;
        let post_id = db.create_post(author.id, &content("text", Some(&group))).await.unwrap();

        assert_eq!(db.fetch_group(group.id).await.unwrap().as_ref(), Some(&group));
        assert!(db.delete_group(group.id).await.unwrap());
        let post = db.fetch_post(post_id).await.unwrap().unwrap();
        assert_eq!(post.group, None);
        assert!(db.fetch_group_by_slug(&group.slug).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn deleting_a_user_cascades() {
        let (db, _) = client().await;
        let author = user(&db, "author").await;
        let reader = user(&db, "reader").await;

        let post_id = db.create_post(author.id, &content("text", None)).await.unwrap();
        db.create_comment(post_id, reader.id, &Text::new("comment").unwrap())
            .await
            .unwrap();
        assert!(db.create_follow(Follow::new(reader.id, author.id)).await.unwrap());

        assert!(db.delete_user(author.id).await.unwrap());
        assert!(db.fetch_post(post_id).await.unwrap().is_none());
        assert!(db.fetch_post_comments(post_id).await.unwrap().is_empty());
        assert_eq!(db.count_following(reader.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn comments_are_newest_first() {
        let (db, clock) = client().await;
        let author = user(&db, "author").await;
        let post_id = db.create_post(author.id, &content("text", None)).await.unwrap();

        db.create_comment(post_id, author.id, &Text::new("first").unwrap())
            .await
            .unwrap();
        clock.advance(Duration::seconds(1));
        db.create_comment(post_id, author.id, &Text::new("second").unwrap())
            .await
            .unwrap();

        let comments = db.fetch_post_comments(post_id).await.unwrap();
        let texts: Vec<_> = comments.iter().map(|comment| comment.text.get()).collect();
        assert_eq!(texts, ["second", "first"]);
        assert_eq!(comments[0].author, author);
    }

    #[tokio::test]
    async fn follows_are_unique_and_never_self() {
        let (db, _) = client().await;
        let author = user(&db, "author").await;
        let reader = user(&db, "reader").await;
        let follow = Follow::new(reader.id, author.id);

        assert!(db.create_follow(follow).await.unwrap());
        assert!(!db.create_follow(follow).await.unwrap());
        assert!(!db.create_follow(Follow::new(reader.id, reader.id)).await.unwrap());
        assert_eq!(db.count_following(reader.id).await.unwrap(), 1);
        assert!(db.follow_exists(follow).await.unwrap());

        db.create_post(author.id, &content("followed", None)).await.unwrap();
        db.create_post(reader.id, &content("own", None)).await.unwrap();
        let feed = db
            .fetch_post_page(PostFilter::FollowedBy(reader.id), PageRequest::First)
            .await
            .unwrap();
        assert_eq!(feed.items.len(), 1);
        assert_eq!(feed.items[0].author, author);

        assert!(db.delete_follow(follow).await.unwrap());
        assert!(!db.delete_follow(follow).await.unwrap());
        assert!(!db.follow_exists(follow).await.unwrap());
    }

    #[tokio::test]
    async fn sessions_expire() {
        let (db, clock) = client().await;
        let author = user(&db, "author").await;
        let token = AuthToken::generate_random(author.id);
        let token_hash = token.hash().unwrap();

        db.create_authentication(author.id, &token_hash, Duration::days(14))
            .await
            .unwrap();
        assert_eq!(
            db.fetch_authenticated_user(author.id, &token_hash).await.unwrap(),
            Some(author.clone())
        );
        assert_eq!(
            db.fetch_authenticated_user(Id::new(author.id.get() + 1), &token_hash)
                .await
                .unwrap(),
            None
        );

        clock.advance(Duration::days(14));
        assert_eq!(db.fetch_authenticated_user(author.id, &token_hash).await.unwrap(), None);

        assert!(db.delete_authentication(&token_hash).await.unwrap());
    }
}
