use axum::extract::State;
use axum::response::Html;

use crate::error::ServerError;
use crate::state::AppState;

/// GET / — serve the configured index document.
pub async fn index_page(State(state): State<AppState>) -> Result<Html<String>, ServerError> {
    let contents = tokio::fs::read_to_string(&state.inner.config.index_path).await?;
    Ok(Html(contents))
}
