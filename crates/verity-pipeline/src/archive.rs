use std::collections::HashSet;

use chrono::{Duration, Utc};
use tracing::{info, instrument, warn};

use verity_core::{ArticleId, Capability, FactStore, PipelineContext, Result};

use crate::report::ArchiveReport;

/// Move aged article bodies to the archive database.
///
/// Rows are copied first. Articles that own no facts are then deleted from
/// the primary store; the rest keep their row for their facts and lose
/// only `raw_text`.
#[instrument(skip(ctx, archive))]
pub async fn run_archive(ctx: &PipelineContext, archive: Option<&dyn FactStore>) -> Result<ArchiveReport> {
    let mut report = ArchiveReport::default();
    let Some(archive) = archive else {
        warn!("No archive database configured, skipping archival");
        report.degraded.push(Capability::Archive);
        return Ok(report);
    };

    let thresholds = &ctx.config.thresholds;
    let cutoff = Utc::now() - Duration::days(thresholds.archive_retention_days);
    let articles = ctx
        .store
        .archivable_articles(cutoff, thresholds.archive_batch)
        .await?;
    report.selected = articles.len() as u64;
    if articles.is_empty() {
        info!("Nothing to archive");
        return Ok(report);
    }

    report.archived = archive.archive_articles(&articles).await?;

    let ids: Vec<ArticleId> = articles.iter().map(|a| a.id).collect();
    let owning: HashSet<ArticleId> = ctx.store.articles_with_facts(&ids).await?.into_iter().collect();
    let (keep, drop): (Vec<ArticleId>, Vec<ArticleId>) = ids.into_iter().partition(|id| owning.contains(id));

    report.deleted = ctx.store.delete_articles(&drop).await?;
    report.text_cleared = ctx.store.clear_raw_text(&keep).await?;

    info!(
        selected = report.selected,
        archived = report.archived,
        deleted = report.deleted,
        text_cleared = report.text_cleared,
        "Archival complete"
    );
    Ok(report)
}
