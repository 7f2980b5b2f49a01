pub mod archive;
pub mod health;
pub mod index;

#[cfg(test)]
pub(crate) mod test_helpers;

use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index::index_page))
        .route("/archive/{archive_hash}/", get(archive::download_archive))
        .route("/health", get(health::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
