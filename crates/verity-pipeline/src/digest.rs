use tracing::{debug, info, instrument, warn};

use verity_core::{
    validate_embedding, Article, Capability, NewFact, PipelineContext, Result, VerityError,
    EMBEDDING_DIM,
};

use crate::report::DigestReport;

#[derive(Debug, Default)]
struct ArticleTally {
    inserted: u64,
    duplicates: u64,
    dropped: u64,
}

/// Extract, embed, dedup and insert facts for one batch of unprocessed articles.
///
/// Every article in the batch is marked processed whatever happens to its
/// facts, so a poisoned article cannot stall the queue.
#[instrument(skip(ctx))]
pub async fn run_digest(ctx: &PipelineContext) -> Result<DigestReport> {
    let mut report = DigestReport::default();
    for capability in [Capability::Extraction, Capability::Embedding] {
        if !ctx.has(capability) {
            report.degraded.push(capability);
        }
    }
    if !report.degraded.is_empty() {
        warn!(missing = ?report.degraded, "Fact extraction unavailable, leaving articles queued");
        return Ok(report);
    }

    let articles = ctx
        .store
        .unprocessed_articles(ctx.config.thresholds.extraction_batch)
        .await?;
    info!(batch = articles.len(), "Digesting articles");

    for article in &articles {
        report.articles += 1;
        match digest_article(ctx, article).await {
            Ok(tally) => {
                report.inserted += tally.inserted;
                report.duplicates += tally.duplicates;
                report.dropped += tally.dropped;
                info!(
                    article_id = article.id,
                    inserted = tally.inserted,
                    duplicates = tally.duplicates,
                    dropped = tally.dropped,
                    "Article digested"
                );
            }
            Err(e) => {
                report.failures += 1;
                warn!(article_id = article.id, error = %e, "Article extraction failed");
            }
        }
        ctx.store.mark_article_processed(article.id).await?;
    }

    Ok(report)
}

/// Freshly fetched text wins over the stored copy. A fetched publication
/// date is written back before any fact is derived from the article.
async fn best_text(ctx: &PipelineContext, article: &Article) -> Result<Option<String>> {
    if let Some(fetcher) = ctx.fetcher() {
        match fetcher.fetch(&article.url).await {
            Ok(Some(content)) => {
                if let Some(date) = content.published_date {
                    if article.published_date != Some(date) {
                        ctx.store.update_published_date(article.id, date).await?;
                        debug!(article_id = article.id, %date, "Published date refreshed");
                    }
                }
                return Ok(Some(content.text));
            }
            Ok(None) => debug!(article_id = article.id, "Content service had nothing, using stored text"),
            Err(e) => warn!(article_id = article.id, error = %e, "Content fetch failed, using stored text"),
        }
    }
    Ok(article.raw_text.clone().filter(|t| !t.trim().is_empty()))
}

async fn digest_article(ctx: &PipelineContext, article: &Article) -> Result<ArticleTally> {
    let mut tally = ArticleTally::default();
    let Some(text) = best_text(ctx, article).await? else {
        return Ok(tally);
    };

    let extractor = ctx.extractor()?;
    let embedder = ctx.embedder()?;
    let thresholds = &ctx.config.thresholds;
    let retry = thresholds.collaborator_retry();

    let candidates = retry
        .run("extract", || extractor.extract(&text), VerityError::is_transient)
        .await?;

    for candidate in candidates {
        if !candidate.is_complete() {
            tally.dropped += 1;
            continue;
        }
        let statement = candidate.statement();

        let embedding = match retry
            .run("embed", || embedder.embed(&statement), VerityError::is_transient)
            .await
            .and_then(|v| validate_embedding(&v, EMBEDDING_DIM).map(|_| v))
        {
            Ok(v) => v,
            Err(e) => {
                tally.dropped += 1;
                warn!(article_id = article.id, statement = %statement, error = %e, "Candidate dropped");
                continue;
            }
        };

        if let Some((existing, distance)) = ctx
            .store
            .nearest_fact(&embedding, thresholds.dedup_distance)
            .await?
        {
            tally.duplicates += 1;
            debug!(
                article_id = article.id,
                existing_fact = existing,
                distance,
                statement = %statement,
                "Duplicate fact skipped"
            );
            continue;
        }

        let fact_id = ctx
            .store
            .insert_fact(&NewFact {
                article_id: article.id,
                subject: candidate.subject.trim().to_string(),
                predicate: candidate.predicate.trim().to_string(),
                object: candidate.object.trim().to_string(),
                confidence: candidate.confidence.clamp(0.0, 1.0),
                embedding,
            })
            .await?;
        tally.inserted += 1;
        debug!(article_id = article.id, fact_id, statement = %statement, "Fact inserted");
    }

    Ok(tally)
}
