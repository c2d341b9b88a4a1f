use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use tracing::{info, warn};

use verity_core::api_types::HealthResponse;
use verity_core::{Capability, QueueSummary};

use crate::state::AppState;

const VERSION: &str = env!("CARGO_PKG_VERSION");

pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    info!("Health check requested");

    let (store_connected, queue) = match &state.store {
        Some(store) => match store.queue_summary().await {
            Ok(queue) => (true, queue),
            Err(e) => {
                warn!("Relational store check failed: {e}");
                (false, QueueSummary::default())
            }
        },
        None => (false, QueueSummary::default()),
    };

    let graph_connected = match &state.graph {
        Some(graph) => match graph.ping().await {
            Ok(()) => true,
            Err(e) => {
                warn!("Graph connectivity check failed: {e}");
                false
            }
        },
        None => false,
    };

    let mut degraded = state.capabilities.missing();
    if !graph_connected && !degraded.contains(&Capability::Graph) {
        degraded.push(Capability::Graph);
    }

    let status = if !store_connected {
        "unavailable"
    } else if graph_connected {
        "ok"
    } else {
        "degraded"
    };

    let response = HealthResponse {
        status: status.to_string(),
        version: VERSION.to_string(),
        store_connected,
        graph_connected,
        queue,
        degraded,
    };

    (StatusCode::OK, Json(response))
}
