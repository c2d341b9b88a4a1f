use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};

use crate::state::AppState;

/// GET /api/status: scheduler state, failing tasks and last attempt per stage.
pub async fn orchestrator_status(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.orchestrator.status().await))
}
