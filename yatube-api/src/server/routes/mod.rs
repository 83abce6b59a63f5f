use crate::server::ServerRouter;
use axum::Router;
use serde::Deserialize;
use yatube_common::pagination::PageRequest;

mod auth;
pub mod posts;
pub mod users;

pub fn routes() -> ServerRouter {
    Router::new()
        .merge(posts::routes())
        .merge(users::routes())
        .merge(auth::routes())
}

/// The `page` query parameter of every listing.
#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize)]
struct PageQuery {
    page: Option<String>,
}

impl PageQuery {
    fn request(&self) -> PageRequest {
        PageRequest::parse(self.page.as_deref())
    }
}
