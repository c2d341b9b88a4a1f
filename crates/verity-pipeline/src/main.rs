use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

use verity_core::{AppConfig, FactStore, PipelineContext, Result};
use verity_pipeline::{bootstrap, DetectionMode, StageReport};

/// Run one pipeline stage and print its report as a JSON line.
///
/// Exit status: 0 success, 1 configuration or store failure, 2 publication
/// blocked by a quality gate.
#[derive(Parser)]
#[command(name = "verity-stage", version)]
struct Cli {
    #[command(subcommand)]
    stage: Stage,
}

#[derive(Subcommand, Clone, Copy)]
enum Stage {
    /// Extract and deduplicate facts from unprocessed articles
    Digest,
    /// Resolve originality for unchecked facts
    Provenance,
    /// Score recent facts against the trusted baseline
    Contradictions {
        /// Check every original fact instead of a recent window
        #[arg(long, conflicts_with = "days")]
        backfill: bool,
        /// Window size in days (defaults to CONTRADICTION_WINDOW_HOURS)
        #[arg(long, value_parser = clap::value_parser!(i64).range(1..=3650))]
        days: Option<i64>,
    },
    /// Push gated facts and articles to the graph
    Publish,
    /// Apply the trusted-sources list to article trust scores
    Trust,
    /// Move aged article bodies to the archive database
    Archive,
}

impl Stage {
    fn name(&self) -> &'static str {
        match self {
            Stage::Digest => "digest",
            Stage::Provenance => "provenance",
            Stage::Contradictions { .. } => "contradictions",
            Stage::Publish => "publish",
            Stage::Trust => "trust",
            Stage::Archive => "archive",
        }
    }
}

async fn run(stage: Stage, ctx: &PipelineContext) -> Result<StageReport> {
    Ok(match stage {
        Stage::Digest => StageReport::Digest(verity_pipeline::run_digest(ctx).await?),
        Stage::Provenance => StageReport::Provenance(verity_pipeline::run_provenance(ctx).await?),
        Stage::Contradictions { backfill, days } => {
            let mode = match (backfill, days) {
                (true, _) => DetectionMode::Backfill,
                (false, Some(days)) => DetectionMode::Window { hours: days * 24 },
                (false, None) => DetectionMode::Window {
                    hours: ctx.config.thresholds.recency_hours,
                },
            };
            StageReport::Contradictions(verity_pipeline::run_contradictions(ctx, mode).await?)
        }
        Stage::Publish => StageReport::Publish(verity_pipeline::run_publish(ctx).await?),
        Stage::Trust => StageReport::Trust(verity_pipeline::run_trust(ctx).await?),
        Stage::Archive => {
            let archive = bootstrap::connect_archive(&ctx.config).await?;
            let archive = archive.as_ref().map(|a| a as &dyn FactStore);
            StageReport::Archive(verity_pipeline::run_archive(ctx, archive).await?)
        }
    })
}

#[tokio::main]
async fn main() -> ExitCode {
    // stdout carries the report line; logs go to stderr.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("verity=info".parse().expect("static directive")),
        )
        .init();

    let cli = Cli::parse();
    let stage = cli.stage;
    let config = AppConfig::from_env();

    let result = match bootstrap::build_context(config).await {
        Ok(ctx) => run(stage, &ctx).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(report) => {
            match serde_json::to_string(&report) {
                Ok(line) => println!("{line}"),
                Err(e) => error!(error = %e, "Failed to serialize report"),
            }
            ExitCode::from(report.exit_code())
        }
        Err(e) => {
            error!(stage = stage.name(), error = %e, "Stage failed");
            println!("{}", serde_json::json!({ "stage": stage.name(), "error": e.to_string() }));
            ExitCode::from(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn days_window_is_bounded() {
        let cli = Cli::try_parse_from(["verity-stage", "contradictions", "--days", "30"])
            .expect("failed to parse a 30 day window");
        assert!(matches!(cli.stage, Stage::Contradictions { days: Some(30), backfill: false }));

        for days in ["0", "3651", "9223372036854775807"] {
            assert!(Cli::try_parse_from(["verity-stage", "contradictions", "--days", days]).is_err());
        }
    }

    #[test]
    fn backfill_and_days_conflict() {
        assert!(
            Cli::try_parse_from(["verity-stage", "contradictions", "--backfill", "--days", "2"]).is_err()
        );
    }
}
