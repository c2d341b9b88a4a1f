pub mod handlers;
pub mod routes;
pub mod scheduler;
pub mod stages;
pub mod state;
pub mod task;

pub use scheduler::{Orchestrator, Stage, StageRun};
pub use task::{run_task, ProcessRunner, TaskError, TaskOutcome, TaskRunner, TaskSpec};
