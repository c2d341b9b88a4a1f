use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use verity_core::api_types::OrchestratorStatus;
use verity_core::RetryPolicy;

use crate::task::{run_task, TaskError, TaskOutcome, TaskRunner, TaskSpec};

/// A named group of tasks run every `period`. A zero period disables the
/// schedule; the stage can still be triggered by hand.
#[derive(Debug, Clone)]
pub struct Stage {
    pub name: String,
    pub tasks: Vec<TaskSpec>,
    pub period: Duration,
    pub parallel: bool,
}

impl Stage {
    pub fn new(name: &str, tasks: Vec<TaskSpec>, period_secs: u64) -> Self {
        Self {
            name: name.to_string(),
            tasks,
            period: Duration::from_secs(period_secs),
            parallel: false,
        }
    }

    pub fn parallel(mut self) -> Self {
        self.parallel = true;
        self
    }

    pub fn is_scheduled(&self) -> bool {
        !self.period.is_zero()
    }

    fn is_due(&self, last_run: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        let elapsed = (now - last_run).to_std().unwrap_or(Duration::ZERO);
        self.is_scheduled() && elapsed >= self.period
    }
}

/// Last `max_chars` characters of `s`.
fn tail(s: &str, max_chars: usize) -> &str {
    let skip = s.chars().count().saturating_sub(max_chars);
    match s.char_indices().nth(skip) {
        Some((idx, _)) => &s[idx..],
        None => s,
    }
}

#[derive(Debug, Clone, Default)]
pub struct StageRun {
    pub stage: String,
    pub outcomes: Vec<TaskOutcome>,
    pub failed: Vec<String>,
}

impl StageRun {
    pub fn succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Holds a stage in flight; released on drop, including while unwinding.
struct Claim<'a> {
    in_flight: &'a Mutex<BTreeSet<String>>,
    name: String,
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        lock(self.in_flight).remove(&self.name);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Single-loop stage scheduler.
///
/// Every tick, each scheduled stage whose period has elapsed since its last
/// attempt is run to completion before the next stage is considered. A
/// stage is never started while it is already in flight.
pub struct Orchestrator {
    stages: Vec<Stage>,
    runner: Arc<dyn TaskRunner>,
    retry: RetryPolicy,
    tick: Duration,
    running: AtomicBool,
    last_run: RwLock<BTreeMap<String, DateTime<Utc>>>,
    failed: RwLock<BTreeSet<String>>,
    in_flight: Mutex<BTreeSet<String>>,
}

impl Orchestrator {
    pub fn new(stages: Vec<Stage>, runner: Arc<dyn TaskRunner>, retry: RetryPolicy, tick: Duration) -> Self {
        Self::starting_at(stages, runner, retry, tick, Utc::now())
    }

    /// All stages count as having just run at `start`, so nothing fires on boot.
    pub fn starting_at(
        stages: Vec<Stage>,
        runner: Arc<dyn TaskRunner>,
        retry: RetryPolicy,
        tick: Duration,
        start: DateTime<Utc>,
    ) -> Self {
        let last_run = stages.iter().map(|s| (s.name.clone(), start)).collect();
        Self {
            stages,
            runner,
            retry,
            tick,
            running: AtomicBool::new(false),
            last_run: RwLock::new(last_run),
            failed: RwLock::new(BTreeSet::new()),
            in_flight: Mutex::new(BTreeSet::new()),
        }
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn stage(&self, name: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// Names of tasks whose executable is missing or unreadable.
    pub fn validate(&self) -> Vec<String> {
        let mut missing = Vec::new();
        for task in self.stages.iter().flat_map(|s| &s.tasks) {
            if let Err(e) = task.validate() {
                warn!(task = %task.name(), error = %e, "Task executable not usable");
                missing.push(task.name());
            }
        }
        missing
    }

    pub async fn status(&self) -> OrchestratorStatus {
        let in_flight = lock(&self.in_flight).iter().cloned().collect();
        OrchestratorStatus {
            running: self.running.load(Ordering::SeqCst),
            failed_tasks: self.failed.read().await.iter().cloned().collect(),
            last_run: self.last_run.read().await.clone(),
            in_flight,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Ask the loop to exit after the current tick. Never touches the host process.
    pub fn stop(&self) {
        info!("Orchestrator stopping");
        self.running.store(false, Ordering::SeqCst);
    }

    /// Mark `name` in flight. False if it already was.
    pub async fn claim(&self, name: &str) -> bool {
        lock(&self.in_flight).insert(name.to_string())
    }

    /// Stages whose period has elapsed at `now`.
    pub async fn due_stages(&self, now: DateTime<Utc>) -> Vec<String> {
        let last_run = self.last_run.read().await;
        self.stages
            .iter()
            .filter(|s| {
                let last = last_run.get(&s.name).copied().unwrap_or(now);
                s.is_due(last, now)
            })
            .map(|s| s.name.clone())
            .collect()
    }

    /// One scheduler pass as of `now`. Returns the runs it performed.
    pub async fn tick_at(&self, now: DateTime<Utc>) -> Vec<StageRun> {
        let mut runs = Vec::new();
        for name in self.due_stages(now).await {
            if !self.claim(&name).await {
                info!(stage = %name, "Stage still in flight, skipping this tick");
                continue;
            }
            let Some(stage) = self.stage(&name) else {
                lock(&self.in_flight).remove(&name);
                continue;
            };
            // Stamped before the attempt, so a failing or panicking stage waits a full period.
            self.last_run.write().await.insert(name, now);
            runs.push(self.execute(stage).await);
        }
        runs
    }

    /// Run a stage that the caller has already claimed, then release it.
    pub async fn run_claimed(&self, name: &str) -> Option<StageRun> {
        match self.stage(name) {
            Some(stage) => Some(self.execute(stage).await),
            None => {
                lock(&self.in_flight).remove(name);
                None
            }
        }
    }

    async fn execute(&self, stage: &Stage) -> StageRun {
        let _claim = Claim {
            in_flight: &self.in_flight,
            name: stage.name.clone(),
        };
        info!(stage = %stage.name, tasks = stage.tasks.len(), parallel = stage.parallel, "Triggering stage");
        let results = if stage.parallel && stage.tasks.len() > 1 {
            let mut set = JoinSet::new();
            for task in stage.tasks.clone() {
                let runner = self.runner.clone();
                let retry = self.retry.clone();
                set.spawn(async move {
                    let name = task.name();
                    (name, run_task(runner.as_ref(), &task, &retry).await)
                });
            }
            let mut results = Vec::new();
            while let Some(joined) = set.join_next().await {
                match joined {
                    Ok(result) => results.push(result),
                    Err(e) => error!(stage = %stage.name, error = %e, "Task panicked"),
                }
            }
            results
        } else {
            let mut results = Vec::new();
            for task in &stage.tasks {
                results.push((task.name(), run_task(self.runner.as_ref(), task, &self.retry).await));
            }
            results
        };

        let mut run = StageRun {
            stage: stage.name.clone(),
            ..Default::default()
        };
        {
            let mut failed = self.failed.write().await;
            for (name, result) in results {
                match result {
                    Ok(outcome) => {
                        failed.remove(&name);
                        run.outcomes.push(outcome);
                    }
                    Err(e) => {
                        error!(stage = %stage.name, task = %name, error = %e, "Task failed");
                        failed.insert(name.clone());
                        run.failed.push(name);
                        if let TaskError::Failed(outcome) = e {
                            if !outcome.stderr.is_empty() {
                                warn!(task = %outcome.task, stderr = %tail(&outcome.stderr, 500), "Task stderr");
                            }
                            run.outcomes.push(outcome);
                        }
                    }
                }
            }
        }

        if run.succeeded() {
            info!(stage = %stage.name, "Stage complete");
        } else {
            warn!(stage = %stage.name, failed = ?run.failed, "Stage finished with failures");
        }
        run
    }

    /// Drive the schedule until [`Orchestrator::stop`] is called. A panic
    /// inside a tick is logged and the loop carries on.
    pub async fn run(self: Arc<Self>) {
        self.running.store(true, Ordering::SeqCst);
        info!(stages = self.stages.len(), tick_secs = self.tick.as_secs(), "Orchestrator online");

        let mut interval = tokio::time::interval(self.tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval.tick().await;

        while self.is_running() {
            interval.tick().await;
            if !self.is_running() {
                break;
            }
            let this = self.clone();
            if let Err(e) = tokio::spawn(async move { this.tick_at(Utc::now()).await }).await {
                error!(error = %e, "Scheduler tick failed");
            }
        }
        info!("Orchestrator loop exited");
    }
}
