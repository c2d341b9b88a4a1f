use std::collections::HashSet;

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use verity_core::{
    cosine_distance, CandidateWindow, Capability, ContradictionEdge, Fact, PipelineContext,
    Result, Thresholds, VerityError,
};

use crate::report::ContradictionReport;

pub const METHOD: &str = "nli";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DetectionMode {
    /// Facts inserted within the last `hours`.
    Window { hours: i64 },
    /// Every original fact.
    Backfill,
}

impl DetectionMode {
    pub fn candidate_window(&self) -> CandidateWindow {
        match self {
            // A window reaching past the representable range covers everything.
            DetectionMode::Window { hours } => Duration::try_hours(*hours)
                .and_then(|span| Utc::now().checked_sub_signed(span))
                .map_or(CandidateWindow::Backfill, |since| CandidateWindow::Since { since }),
            DetectionMode::Backfill => CandidateWindow::Backfill,
        }
    }
}

/// Distance between two facts if it falls inside the band worth scoring.
/// Closer pairs restate each other, farther pairs are about different things.
pub fn scoring_distance(a: &Fact, b: &Fact, thresholds: &Thresholds) -> Option<f64> {
    let distance = cosine_distance(a.embedding.as_deref()?, b.embedding.as_deref()?);
    (distance >= thresholds.prune_min_distance && distance <= thresholds.prune_max_distance)
        .then_some(distance)
}

/// Score candidates against the trusted, matured baseline and record conflicts.
#[instrument(skip(ctx))]
pub async fn run_contradictions(ctx: &PipelineContext, mode: DetectionMode) -> Result<ContradictionReport> {
    let mut report = ContradictionReport::default();
    if !ctx.has(Capability::Entailment) {
        warn!("Entailment collaborator unavailable, skipping contradiction detection");
        report.degraded.push(Capability::Entailment);
        return Ok(report);
    }
    let scorer = ctx.entailment()?;
    let thresholds = &ctx.config.thresholds;
    let retry = thresholds.collaborator_retry();

    let matured_before = Utc::now() - Duration::days(thresholds.maturation_days);
    let baseline = ctx
        .store
        .baseline_facts(thresholds.baseline_min_trust, matured_before, thresholds.baseline_limit)
        .await?;
    let candidates = ctx.store.candidate_facts(mode.candidate_window()).await?;
    report.baseline = baseline.len() as u64;
    report.candidates = candidates.len() as u64;
    info!(baseline = baseline.len(), candidates = candidates.len(), "Checking for contradictions");

    let mut seen = HashSet::new();
    for candidate in &candidates {
        for base in &baseline {
            if base.id == candidate.id {
                continue;
            }
            let key = ContradictionEdge::new(base.id, candidate.id, 0.0, METHOD).key();
            if !seen.insert(key) {
                continue;
            }
            let Some(distance) = scoring_distance(base, candidate, thresholds) else {
                report.pruned += 1;
                continue;
            };

            let premise = base.statement();
            let hypothesis = candidate.statement();
            let scores = match retry
                .run(
                    "entailment",
                    || scorer.score(&premise, &hypothesis),
                    VerityError::is_transient,
                )
                .await
            {
                Ok(scores) => scores,
                Err(e) => {
                    report.failed_checks += 1;
                    warn!(baseline_fact = base.id, candidate_fact = candidate.id, error = %e, "Entailment check failed");
                    continue;
                }
            };
            report.checked += 1;

            if scores.contradiction > thresholds.contradiction_score {
                let edge = ContradictionEdge::new(base.id, candidate.id, scores.contradiction, METHOD);
                ctx.store.upsert_contradiction(&edge).await?;
                info!(
                    fact_id_1 = edge.fact_id_1,
                    fact_id_2 = edge.fact_id_2,
                    score = edge.score,
                    distance,
                    "Contradiction recorded"
                );
                report.edges.push(edge);
            } else {
                debug!(baseline_fact = base.id, candidate_fact = candidate.id, score = scores.contradiction, "No contradiction");
            }
        }
    }
    report.found = report.edges.len() as u64;

    if !report.edges.is_empty() {
        match ctx.graph() {
            Some(graph) => match graph.merge_contradictions(&report.edges).await {
                Ok(sent) => {
                    report.graph_synced = true;
                    debug!(sent, "Contradictions pushed to graph");
                }
                Err(e) => warn!(error = %e, "Graph push failed, publisher will carry the edges"),
            },
            None => report.degraded.push(Capability::Graph),
        }
    }

    info!(
        checked = report.checked,
        found = report.found,
        pruned = report.pruned,
        failed_checks = report.failed_checks,
        "Contradiction detection complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oversized_window_degrades_to_backfill() {
        let huge = DetectionMode::Window { hours: i64::MAX };
        assert_eq!(huge.candidate_window(), CandidateWindow::Backfill);

        let day = DetectionMode::Window { hours: 24 };
        assert!(matches!(day.candidate_window(), CandidateWindow::Since { .. }));
    }

    fn fact(id: i64, embedding: Vec<f32>) -> Fact {
        Fact {
            id,
            article_id: 1,
            subject: "s".into(),
            predicate: "p".into(),
            object: "o".into(),
            confidence: 1.0,
            embedding: Some(embedding),
            is_original: true,
            provenance_id: None,
            external_source_url: None,
            checked_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn prune_band_rejects_restatements_and_unrelated_pairs() {
        let t = Thresholds::default();
        let base = fact(1, vec![1.0, 0.0]);
        assert!(scoring_distance(&base, &fact(2, vec![1.0, 0.01]), &t).is_none());
        assert!(scoring_distance(&base, &fact(3, vec![0.0, 1.0]), &t).is_none());
        let d = scoring_distance(&base, &fact(4, vec![1.0, 0.8]), &t).unwrap();
        assert!(d > 0.2 && d < 0.3);
    }

    #[test]
    fn missing_embedding_is_pruned() {
        let mut other = fact(2, vec![]);
        other.embedding = None;
        assert!(scoring_distance(&fact(1, vec![1.0]), &other, &Thresholds::default()).is_none());
    }
}
