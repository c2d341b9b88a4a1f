use std::sync::Arc;

use tokio::sync::RwLock;

use verity_core::api_types::StageRunStatus;
use verity_core::{Capabilities, FactStore, GraphStore};

use crate::scheduler::Orchestrator;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub store: Option<Arc<dyn FactStore>>,
    pub graph: Option<Arc<dyn GraphStore>>,
    pub capabilities: Capabilities,
    pub runs: Arc<RwLock<Vec<StageRunStatus>>>,
}
