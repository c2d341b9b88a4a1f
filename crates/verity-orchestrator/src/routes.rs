use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers;
use crate::state::AppState;

pub fn create_router() -> Router<AppState> {
    Router::new()
        // Health
        .route("/api/health", get(handlers::health::health_check))
        // Orchestrator
        .route("/api/status", get(handlers::status::orchestrator_status))
        .route("/api/stages/runs", get(handlers::stages::list_runs))
        .route("/api/stages/{name}/trigger", post(handlers::stages::trigger_stage))
}
