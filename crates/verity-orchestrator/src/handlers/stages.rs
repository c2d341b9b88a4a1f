use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;

use verity_core::api_types::{StageRunState, StageRunStatus, StageRunsResponse, StageTriggerResponse};

use crate::state::AppState;

const MAX_RUNS: usize = 100;

/// POST /api/stages/{name}/trigger: run a stage now, in the background.
/// Returns 202 with a run_id, 404 for unknown stages and 409 while the
/// stage is already running.
pub async fn trigger_stage(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    if state.orchestrator.stage(&name).is_none() {
        warn!(stage = %name, "Stage not found");
        return (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": format!("Stage '{name}' not found") })),
        )
            .into_response();
    }

    if !state.orchestrator.claim(&name).await {
        return (
            StatusCode::CONFLICT,
            Json(serde_json::json!({ "error": format!("Stage '{name}' is already running") })),
        )
            .into_response();
    }

    let run_id = Uuid::new_v4().to_string();
    info!(stage = %name, run_id = %run_id, "Triggering stage on demand");
    {
        let mut runs = state.runs.write().await;
        runs.push(StageRunStatus {
            run_id: run_id.clone(),
            stage: name.clone(),
            status: StageRunState::Running,
            started_at: Utc::now(),
            finished_at: None,
            failed_tasks: Vec::new(),
        });
        // Keep only the last 100 runs
        if runs.len() > MAX_RUNS {
            let excess = runs.len() - MAX_RUNS;
            runs.drain(0..excess);
        }
    }

    let orchestrator = state.orchestrator.clone();
    let runs = state.runs.clone();
    let id = run_id.clone();
    let stage = name.clone();
    tokio::spawn(async move {
        let name = stage.clone();
        let result = tokio::spawn(async move { orchestrator.run_claimed(&name).await }).await;
        let mut runs = runs.write().await;
        if let Some(run) = runs.iter_mut().find(|r| r.run_id == id) {
            run.finished_at = Some(Utc::now());
            match result {
                Ok(Some(r)) if r.succeeded() => run.status = StageRunState::Completed,
                Ok(Some(r)) => {
                    run.status = StageRunState::Failed;
                    run.failed_tasks = r.failed;
                }
                Ok(None) => {
                    run.status = StageRunState::Failed;
                    error!(run_id = %id, stage = %stage, "Stage vanished before it ran");
                }
                Err(e) => {
                    run.status = StageRunState::Failed;
                    error!(run_id = %id, stage = %stage, error = %e, "Stage run panicked");
                }
            }
        }
    });

    (
        StatusCode::ACCEPTED,
        Json(StageTriggerResponse {
            run_id,
            stage: name,
            status: "running".to_string(),
            message: "Stage triggered, running in background".to_string(),
        }),
    )
        .into_response()
}

/// GET /api/stages/runs: on-demand runs, newest first.
pub async fn list_runs(State(state): State<AppState>) -> impl IntoResponse {
    let runs = state.runs.read().await;
    let runs: Vec<StageRunStatus> = runs.iter().rev().cloned().collect();
    (StatusCode::OK, Json(StageRunsResponse { runs }))
}
