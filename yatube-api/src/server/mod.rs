use crate::server::{
    auth::{login_redirect, resolve_session},
    html::{Found, html_response},
    media::{MAX_IMAGE_BYTES, MediaStore},
    templates::{ErrorTemplate, ForbiddenTemplate, Layout, NotFoundTemplate},
};
use askama::Template;
use axum::{
    Router,
    extract::{
        DefaultBodyLimit, FromRef, Request, State,
        multipart::{MultipartError, MultipartRejection},
        rejection::{FormRejection, PathRejection, QueryRejection},
    },
    http::{StatusCode, Uri},
    middleware::{self, Next},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use thiserror::Error;
use time::Duration;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{debug, error};
use yatube_common::{
    cache::PageCache,
    model::{
        Id,
        auth::{AuthTokenHashError, PasswordHashError},
        group::GroupSlug,
        post::PostMarker,
        user::Username,
    },
};
use yatube_db::client::{DbClient, DbError};

pub mod auth;
pub mod forms;
pub mod html;
pub mod media;
mod routes;
pub mod templates;
#[cfg(test)]
mod test_util;

/// Room for a maximum-size image plus the rest of the post form.
const MAX_REQUEST_BYTES: usize = MAX_IMAGE_BYTES + 1024 * 1024;

pub type ServerRouter = Router<ServerState>;

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct SessionSettings {
    pub lifetime: Duration,
    pub secure_cookies: bool,
}

#[derive(Clone, Debug, FromRef)]
pub struct ServerState {
    pub db_client: Arc<DbClient>,
    pub page_cache: Arc<PageCache>,
    pub media: Arc<MediaStore>,
    pub sessions: Arc<SessionSettings>,
}

pub fn routes() -> ServerRouter {
    routes::routes().fallback(fallback)
}

pub fn app(state: ServerState) -> Router {
    let media_service = ServeDir::new(state.media.root());

    routes()
        .nest_service("/media", media_service)
        .layer(middleware::from_fn_with_state(state.clone(), error_pages_for_viewer))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Marks a response rendered from a [`ServerError`] with the anonymous layout.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
struct ErrorPage(StatusCode);

/// Re-renders error pages with the navigation of the logged-in viewer.
async fn error_pages_for_viewer(
    State(db): State<Arc<DbClient>>,
    request: Request,
    next: Next,
) -> Response {
    let headers = request.headers().clone();
    let mut response = next.run(request).await;

    let Some(ErrorPage(status)) = response.extensions_mut().remove::<ErrorPage>() else {
        return response;
    };

    match resolve_session(&headers, &db).await {
        Ok(Some(viewer)) => ServerError::page(status, Layout::for_user(&viewer)),
        Ok(None) => response,
        Err(err) => {
            error!(%err, "Viewer of error page could not be resolved");
            response
        }
    }
}

pub async fn fallback(request: Request) -> ServerError {
    ServerError::UnknownRoute(request.into_parts().0.uri)
}

pub type Result<T, E = ServerError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Unknown route requested: {0}")]
    UnknownRoute(Uri),
    #[error("Path rejected: {0}")]
    PathRejection(#[from] PathRejection),
    #[error("Query string rejected: {0}")]
    QueryRejection(#[from] QueryRejection),
    #[error("Incoming form rejected: {0}")]
    FormRejection(#[from] FormRejection),
    #[error("Incoming multipart form rejected: {0}")]
    MultipartRejection(#[from] MultipartRejection),
    #[error("Reading multipart form failed: {0}")]
    Multipart(#[from] MultipartError),
    #[error("Login is required to access {next}")]
    LoginRequired { next: String },
    #[error("Only the author may do this")]
    Forbidden,
    #[error("Group with slug {0} was not found.")]
    GroupBySlugNotFound(GroupSlug),
    #[error("Post with id {0} was not found.")]
    PostByIdNotFound(Id<PostMarker>),
    #[error("User with username {0} was not found.")]
    UserByNameNotFound(Username),
    #[error("Template could not be rendered: {0}")]
    Template(#[from] askama::Error),
    #[error("Storing uploaded media failed: {0}")]
    Media(std::io::Error),
    #[error(transparent)]
    Database(#[from] DbError),
    #[error("The auth token could not be hashed: {0}")]
    AuthTokenHash(#[from] AuthTokenHashError),
    #[error(transparent)]
    PasswordHash(#[from] PasswordHashError),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::UnknownRoute(_)
            | ServerError::PathRejection(_)
            | ServerError::GroupBySlugNotFound(_)
            | ServerError::PostByIdNotFound(_)
            | ServerError::UserByNameNotFound(_) => StatusCode::NOT_FOUND,
            ServerError::QueryRejection(rejection) => rejection.status(),
            ServerError::FormRejection(rejection) => rejection.status(),
            ServerError::MultipartRejection(rejection) => rejection.status(),
            ServerError::Multipart(err) => err.status(),
            ServerError::LoginRequired { .. } => StatusCode::FOUND,
            ServerError::Forbidden => StatusCode::FORBIDDEN,
            ServerError::Template(_)
            | ServerError::Media(_)
            | ServerError::Database(_)
            | ServerError::AuthTokenHash(_)
            | ServerError::PasswordHash(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn page(status: StatusCode, layout: Layout) -> Response {
        let rendered = match status {
            StatusCode::NOT_FOUND => NotFoundTemplate { layout }.render(),
            StatusCode::FORBIDDEN => ForbiddenTemplate { layout }.render(),
            _ => ErrorTemplate {
                layout,
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("Error").to_owned(),
            }
            .render(),
        };

        let mut response = match rendered {
            Ok(body) => html_response(body),
            Err(err) => {
                error!(%err, "Error page could not be rendered");
                status.canonical_reason().unwrap_or_default().into_response()
            }
        };
        *response.status_mut() = status;
        response
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();

        if let ServerError::LoginRequired { next } = &self {
            debug!(%next, "Redirecting anonymous user to login");
            return Found(login_redirect(next)).into_response();
        }

        if status.is_server_error() {
            error!(error = %self, %status, "Replying with error");
        } else {
            debug!(error = %self, %status, "Replying with error");
        }

        let mut response = Self::page(status, Layout::anonymous());
        response.extensions_mut().insert(ErrorPage(status));
        response
    }
}
