use crate::server::ServerError;
use askama::Template;
use axum::{
    Form as AxumForm,
    extract::{FromRequest, FromRequestParts, Query as AxumQuery},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use axum_extra::TypedHeader;
use headers::ContentType;

/// A rendered page.
#[derive(Debug, Clone, Copy, Default)]
pub struct Html<T>(pub T);

impl<T: Template> IntoResponse for Html<T> {
    fn into_response(self) -> Response {
        match self.0.render() {
            Ok(body) => html_response(body),
            Err(err) => ServerError::Template(err).into_response(),
        }
    }
}

pub fn html_response(body: String) -> Response {
    (TypedHeader(ContentType::html()), body).into_response()
}

/// `302 Found` to a local path.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct Found(pub String);

impl IntoResponse for Found {
    fn into_response(self) -> Response {
        (StatusCode::FOUND, [(header::LOCATION, self.0)]).into_response()
    }
}

#[derive(FromRequest, Debug, Clone, Copy, Default)]
#[from_request(via(AxumForm), rejection(ServerError))]
pub struct Form<T>(pub T);

#[derive(FromRequestParts, Debug, Clone, Copy, Default)]
#[from_request(via(AxumQuery), rejection(ServerError))]
pub struct Query<T>(pub T);
