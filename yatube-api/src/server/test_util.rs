use crate::server::{ServerState, SessionSettings, app, auth::SESSION_COOKIE, media::MediaStore};
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use std::sync::Arc;
use tempfile::TempDir;
use time::{Duration, macros::utc_datetime};
use tower::ServiceExt;
use yatube_common::{
    cache::{DEFAULT_PAGE_CACHE_TTL, PageCache},
    clock::ManualClock,
    model::{
        Id,
        auth::{AuthToken, PasswordDigest},
        group::{Group, GroupSlug, NewGroup},
        post::{PostContent, PostMarker},
        text::Text,
        user::{NewUser, User, Username},
    },
};
use yatube_db::client::DbClient;

/// A 2x1 GIF.
pub const SMALL_GIF: &[u8] = &[
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x02, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00, 0x00,
    0xff, 0xff, 0xff, 0x21, 0xf9, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0x2c, 0x00, 0x00, 0x00, 0x00,
    0x02, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x0c, 0x0a, 0x00, 0x3b,
];

const MULTIPART_BOUNDARY: &str = "yatube-test-boundary";

#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub location: Option<String>,
    pub set_cookie: Vec<String>,
    pub body: String,
}

/// The full application over an in-memory database, a temporary media root and a manual clock.
pub struct TestApp {
    pub db: Arc<DbClient>,
    pub cache: Arc<PageCache>,
    pub clock: Arc<ManualClock>,
    router: Router,
    _media_root: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        let clock = Arc::new(ManualClock::new(utc_datetime!(2022-08-08 21:38)));
        let db = DbClient::connect_in_memory(clock.clone()).await.unwrap();
        db.migrate().await.unwrap();
        let db = Arc::new(db);

        let cache = Arc::new(PageCache::new(
            "index_page",
            DEFAULT_PAGE_CACHE_TTL,
            clock.clone(),
        ));
        let media_root = tempfile::tempdir().unwrap();

        let state = ServerState {
            db_client: db.clone(),
            page_cache: cache.clone(),
            media: Arc::new(MediaStore::new(media_root.path().to_owned())),
            sessions: Arc::new(SessionSettings {
                lifetime: Duration::days(14),
                secure_cookies: false,
            }),
        };

        Self {
            db,
            cache,
            clock,
            router: app(state),
            _media_root: media_root,
        }
    }

    async fn create_user(&self, username: &str, password: PasswordDigest) -> User {
        let new_user = NewUser {
            username: Username::new(username.to_owned()).unwrap(),
            password,
        };
        self.db.create_user(&new_user).await.unwrap().unwrap()
    }

    /// A user that cannot log in with any password.
    pub async fn user(&self, username: &str) -> User {
        self.create_user(username, PasswordDigest::from_phc("!".to_owned()))
            .await
    }

    pub async fn user_with_password(&self, username: &str, password: &str) -> User {
        self.create_user(username, PasswordDigest::hash(password).unwrap())
            .await
    }

    pub async fn group(&self, slug: &str) -> Group {
        let new_group = NewGroup {
            title: "Тестовая группа".to_owned(),
            slug: GroupSlug::new(slug.to_owned()).unwrap(),
            description: "Тестовое описание".to_owned(),
        };
        self.db.create_group(&new_group).await.unwrap()
    }

    /// Each post is a second newer than the previous one.
    pub async fn post(&self, author: &User, text: &str, group: Option<&Group>) -> Id<PostMarker> {
        self.clock.advance(Duration::seconds(1));

        let content = PostContent {
            text: Text::new(text).unwrap(),
            group: group.map(|group| group.id),
            image: None,
        };
        self.db.create_post(author.id, &content).await.unwrap()
    }

    /// A `Cookie` header value carrying a live session for `user`.
    pub async fn session(&self, user: &User) -> String {
        let token = AuthToken::generate_random(user.id);
        self.db
            .create_authentication(user.id, &token.hash().unwrap(), Duration::days(14))
            .await
            .unwrap();

        format!("{SESSION_COOKIE}={}", token.as_token_str())
    }

    pub async fn request(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();

        let status = response.status();
        let headers = response.headers();
        let location = headers
            .get(header::LOCATION)
            .map(|value| value.to_str().unwrap().to_owned());
        let set_cookie = headers
            .get_all(header::SET_COOKIE)
            .iter()
            .map(|value| value.to_str().unwrap().to_owned())
            .collect();
        let body = response.into_body().collect().await.unwrap().to_bytes();

        TestResponse {
            status,
            location,
            set_cookie,
            body: String::from_utf8_lossy(&body).into_owned(),
        }
    }

    fn builder(method: &str, uri: &str, session: Option<&str>) -> axum::http::request::Builder {
        let builder = Request::builder().method(method).uri(uri);
        match session {
            Some(cookie) => builder.header(header::COOKIE, cookie),
            None => builder,
        }
    }

    pub async fn get(&self, uri: &str, session: Option<&str>) -> TestResponse {
        let request = Self::builder("GET", uri, session)
            .body(Body::empty())
            .unwrap();
        self.request(request).await
    }

    /// `body` is already urlencoded.
    pub async fn post_form(&self, uri: &str, body: &str, session: Option<&str>) -> TestResponse {
        let request = Self::builder("POST", uri, session)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body.to_owned()))
            .unwrap();
        self.request(request).await
    }

    /// Each part is `(name, file name, content)`.
    pub async fn post_multipart(
        &self,
        uri: &str,
        parts: &[(&str, Option<&str>, &[u8])],
        session: Option<&str>,
    ) -> TestResponse {
        let mut body = Vec::new();
        for (name, file_name, content) in parts {
            body.extend_from_slice(format!("--{MULTIPART_BOUNDARY}\r\n").as_bytes());
            match file_name {
                Some(file_name) => body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; \
                        name=\"{name}\"; filename=\"{file_name}\"\r\n\
                        Content-Type: application/octet-stream\r\n\r\n"
                    )
                    .as_bytes(),
                ),
                None => body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                ),
            }
            body.extend_from_slice(content);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{MULTIPART_BOUNDARY}--\r\n").as_bytes());

        let request = Self::builder("POST", uri, session)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={MULTIPART_BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap();
        self.request(request).await
    }
}
