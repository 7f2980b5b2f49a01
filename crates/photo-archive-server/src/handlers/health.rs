use axum::extract::State;
use axum::response::IntoResponse;

use crate::state::AppState;

/// GET /health — liveness plus the number of producers currently running.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.inner.start_time.elapsed().as_secs(),
        "active_archives": state.live_producers(),
    }))
}
