use crate::server::{Result, ServerError, SessionSettings};
use axum::{
    extract::{FromRef, FromRequestParts, OptionalFromRequestParts},
    http::{HeaderMap, request::Parts},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use std::sync::Arc;
use tracing::debug;
use yatube_common::model::{
    Id,
    auth::AuthToken,
    user::{User, UserMarker},
};
use yatube_db::client::DbClient;

pub const SESSION_COOKIE: &str = "yatube_session";
pub const LOGIN_PATH: &str = "/auth/login/";

/// Characters escaped in the `next` parameter. Path separators stay readable.
const NEXT_ESCAPE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

#[must_use]
pub fn login_redirect(next: &str) -> String {
    format!("{LOGIN_PATH}?next={}", utf8_percent_encode(next, NEXT_ESCAPE))
}

/// Whether `next` stays on this site.
#[must_use]
pub fn is_local_path(next: &str) -> bool {
    next.starts_with('/')
        && !next.starts_with("//")
        && !next.contains('\\')
        && !next.contains(char::is_control)
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct AuthenticatedUser {
    pub user: User,
}

impl AuthenticatedUser {
    #[must_use]
    pub fn user_id(&self) -> Id<UserMarker> {
        self.user.id
    }
}

fn session_token(jar: &CookieJar) -> Option<AuthToken> {
    let cookie = jar.get(SESSION_COOKIE)?;

    match cookie.value().parse() {
        Ok(token) => Some(token),
        Err(err) => {
            debug!(%err, "Ignoring malformed session cookie");
            None
        }
    }
}

/// The user whose live session the request's cookie names, if any.
pub async fn resolve_session(headers: &HeaderMap, db: &DbClient) -> Result<Option<User>> {
    let jar = CookieJar::from_headers(headers);
    let Some(token) = session_token(&jar) else {
        return Ok(None);
    };

    let token_hash = token.hash()?;
    let user = db.fetch_authenticated_user(token.user_id, &token_hash).await?;
    if user.is_none() {
        debug!(user_id = %token.user_id, "Session cookie did not match a live session");
    }

    Ok(user)
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    Arc<DbClient>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let db = Arc::<DbClient>::from_ref(state);

        match resolve_session(&parts.headers, &db).await? {
            Some(user) => Ok(Self { user }),
            None => Err(ServerError::LoginRequired {
                next: parts
                    .uri
                    .path_and_query()
                    .map_or_else(|| parts.uri.path().to_owned(), ToString::to_string),
            }),
        }
    }
}

impl<S> OptionalFromRequestParts<S> for AuthenticatedUser
where
    Arc<DbClient>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        let db = Arc::<DbClient>::from_ref(state);
        let user = resolve_session(&parts.headers, &db).await?;

        Ok(user.map(|user| Self { user }))
    }
}

/// Issues and stores a fresh session for `user`, returning the cookie that carries it.
pub async fn start_session(
    db: &DbClient,
    settings: &SessionSettings,
    user: Id<UserMarker>,
) -> Result<Cookie<'static>> {
    let token = AuthToken::generate_random(user);
    let token_hash = token.hash()?;
    db.create_authentication(user, &token_hash, settings.lifetime)
        .await?;

    debug!(%user, "Started session");
    Ok(Cookie::build((SESSION_COOKIE, token.as_token_str()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(settings.secure_cookies)
        .max_age(settings.lifetime)
        .build())
}

/// Forgets the session named by the cookie in `jar`, if any, and expires the cookie.
pub async fn end_session(db: &DbClient, jar: CookieJar) -> Result<CookieJar> {
    if let Some(token) = session_token(&jar) {
        let deleted = db.delete_authentication(&token.hash()?).await?;
        debug!(user_id = %token.user_id, deleted, "Ended session");
    }

    Ok(jar.remove(Cookie::build(SESSION_COOKIE).path("/")))
}
