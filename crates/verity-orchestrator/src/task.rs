use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, info, warn};

use verity_core::{Result, RetryPolicy, VerityError};

/// Hard ceiling for one sub-process.
pub const TASK_TIMEOUT: Duration = Duration::from_secs(3600);

/// One executable a stage launches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl TaskSpec {
    pub fn new(program: impl Into<PathBuf>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// Stable display name: file name plus arguments.
    pub fn name(&self) -> String {
        let program = self
            .program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.display().to_string());
        std::iter::once(program)
            .chain(self.args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// The executable must exist and be a readable regular file.
    pub fn validate(&self) -> Result<()> {
        validate_program(&self.program)
    }
}

fn validate_program(path: &Path) -> Result<()> {
    let meta = std::fs::metadata(path).map_err(|e| {
        VerityError::Orchestration(format!("{} is not accessible: {e}", path.display()))
    })?;
    if !meta.is_file() {
        return Err(VerityError::Orchestration(format!(
            "{} is not a regular file",
            path.display()
        )));
    }
    Ok(())
}

/// Typed result of one sub-process run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub task: String,
    /// `None` when the process was killed by a signal or the timeout.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub elapsed_ms: u64,
    pub timed_out: bool,
}

impl TaskOutcome {
    pub fn succeeded(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }

    /// Last non-empty stdout line, where stages print their JSON report.
    pub fn report_line(&self) -> Option<&str> {
        self.stdout.lines().rev().find(|l| !l.trim().is_empty())
    }
}

#[derive(Debug)]
pub enum TaskError {
    /// The process could not be started at all.
    Launch(VerityError),
    /// It ran and failed.
    Failed(TaskOutcome),
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskError::Launch(e) => write!(f, "launch failed: {e}"),
            TaskError::Failed(o) if o.timed_out => write!(f, "{} timed out", o.task),
            TaskError::Failed(o) => write!(f, "{} exited with {:?}", o.task, o.exit_code),
        }
    }
}

#[async_trait]
pub trait TaskRunner: Send + Sync {
    async fn run(&self, task: &TaskSpec) -> Result<TaskOutcome>;
}

/// Runs tasks as child processes that inherit the orchestrator's environment.
pub struct ProcessRunner {
    timeout: Duration,
}

impl ProcessRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new(TASK_TIMEOUT)
    }
}

#[async_trait]
impl TaskRunner for ProcessRunner {
    async fn run(&self, task: &TaskSpec) -> Result<TaskOutcome> {
        task.validate()?;
        let name = task.name();
        let started = Instant::now();

        let child = Command::new(&task.program)
            .args(&task.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| VerityError::Orchestration(format!("cannot start {name}: {e}")))?;

        // Both pipes are drained concurrently; dropping the future on
        // timeout kills the child.
        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(TaskOutcome {
                task: name,
                exit_code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                elapsed_ms: started.elapsed().as_millis() as u64,
                timed_out: false,
            }),
            Ok(Err(e)) => Err(VerityError::Orchestration(format!("waiting on {name}: {e}"))),
            Err(_) => {
                warn!(task = %name, timeout_secs = self.timeout.as_secs(), "Task timed out and was killed");
                Ok(TaskOutcome {
                    task: name,
                    exit_code: None,
                    stdout: String::new(),
                    stderr: String::new(),
                    elapsed_ms: started.elapsed().as_millis() as u64,
                    timed_out: true,
                })
            }
        }
    }
}

/// Run `task`, retrying non-zero exits under `retry`. Launch failures are not retried.
pub async fn run_task(
    runner: &dyn TaskRunner,
    task: &TaskSpec,
    retry: &RetryPolicy,
) -> std::result::Result<TaskOutcome, TaskError> {
    let name = task.name();
    let outcome = retry
        .run(
            &name,
            move || async move {
                match runner.run(task).await {
                    Ok(outcome) if outcome.succeeded() => Ok(outcome),
                    Ok(outcome) => Err(TaskError::Failed(outcome)),
                    Err(e) => Err(TaskError::Launch(e)),
                }
            },
            |e| matches!(e, TaskError::Failed(_)),
        )
        .await?;

    info!(task = %name, elapsed_ms = outcome.elapsed_ms, stdout_len = outcome.stdout.len(), "Task finished");
    if let Some(line) = outcome.report_line() {
        debug!(task = %name, report = %line, "Task report");
    }
    Ok(outcome)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> TaskSpec {
        TaskSpec::new("/bin/sh", &["-c", script])
    }

    #[test]
    fn names_include_arguments() {
        let task = TaskSpec::new("/opt/verity/bin/verity-stage", &["contradictions", "--backfill"]);
        assert_eq!(task.name(), "verity-stage contradictions --backfill");
    }

    #[test]
    fn missing_program_fails_validation() {
        let err = TaskSpec::new("/nonexistent/verity-stage", &[]).validate().unwrap_err();
        assert!(matches!(err, VerityError::Orchestration(_)));
    }

    #[tokio::test]
    async fn captures_exit_code_and_output() {
        let outcome = ProcessRunner::default()
            .run(&sh("echo '{\"stage\":\"trust\"}'; echo oops >&2; exit 3"))
            .await
            .unwrap();
        assert_eq!(outcome.exit_code, Some(3));
        assert_eq!(outcome.report_line(), Some("{\"stage\":\"trust\"}"));
        assert_eq!(outcome.stderr.trim(), "oops");
        assert!(!outcome.succeeded());
    }

    #[tokio::test]
    async fn large_output_does_not_block() {
        let outcome = ProcessRunner::default()
            .run(&sh("head -c 1048576 /dev/zero | tr '\\0' x; head -c 1048576 /dev/zero | tr '\\0' y >&2"))
            .await
            .unwrap();
        assert!(outcome.succeeded());
        assert_eq!(outcome.stdout.len(), 1_048_576);
        assert_eq!(outcome.stderr.len(), 1_048_576);
    }

    #[tokio::test]
    async fn timeout_kills_the_process() {
        let outcome = ProcessRunner::new(Duration::from_millis(200))
            .run(&sh("sleep 5"))
            .await
            .unwrap();
        assert!(outcome.timed_out);
        assert_eq!(outcome.exit_code, None);
        assert!(outcome.elapsed_ms < 5000);
    }
}
