use std::path::{Path, PathBuf};

use verity_core::AppConfig;

use crate::scheduler::Stage;
use crate::task::TaskSpec;

pub const STAGE_BIN: &str = "verity-stage";

/// `VERITY_STAGE_BIN`, or `verity-stage` next to the running executable.
pub fn resolve_stage_bin(config: &AppConfig) -> PathBuf {
    config.stage_bin.clone().unwrap_or_else(|| {
        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join(STAGE_BIN)))
            .unwrap_or_else(|| PathBuf::from(STAGE_BIN))
    })
}

/// The pipeline schedule, in dependency order.
pub fn default_stages(config: &AppConfig, stage_bin: &Path) -> Vec<Stage> {
    let stage = |args: &[&str]| vec![TaskSpec::new(stage_bin, args)];
    let mut stages = Vec::new();

    if !config.ingest_tasks.is_empty() {
        let tasks = config
            .ingest_tasks
            .iter()
            .map(|path| TaskSpec::new(path.as_str(), &[]))
            .collect();
        stages.push(Stage::new("ingestion", tasks, 30 * 60).parallel());
    }

    stages.extend([
        Stage::new("trust", stage(&["trust"]), 60 * 60),
        Stage::new("extraction", stage(&["digest"]), 5 * 60),
        Stage::new("provenance", stage(&["provenance"]), 10 * 60),
        Stage::new("publication", stage(&["publish"]), 60 * 60),
        Stage::new("contradictions", stage(&["contradictions"]), 6 * 60 * 60),
        Stage::new("contradiction-backfill", stage(&["contradictions", "--backfill"]), 0),
        Stage::new("archival", stage(&["archive"]), 24 * 60 * 60),
    ]);
    stages
}
