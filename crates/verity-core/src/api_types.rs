use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::article::QueueSummary;
use crate::capability::Capability;

// --- Health ---

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub store_connected: bool,
    pub graph_connected: bool,
    pub queue: QueueSummary,
    pub degraded: Vec<Capability>,
}

// --- Orchestrator ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorStatus {
    pub running: bool,
    pub failed_tasks: Vec<String>,
    pub last_run: BTreeMap<String, DateTime<Utc>>,
    pub in_flight: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StageTriggerResponse {
    pub run_id: String,
    pub stage: String,
    pub status: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum StageRunState {
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageRunStatus {
    pub run_id: String,
    pub stage: String,
    pub status: StageRunState,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub failed_tasks: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StageRunsResponse {
    pub runs: Vec<StageRunStatus>,
}
