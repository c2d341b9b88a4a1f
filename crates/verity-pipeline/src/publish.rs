use std::collections::{BTreeSet, HashSet};

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{info, instrument, warn};

use verity_core::{
    Article, ArticleId, Assertion, Capability, ContradictionEdge, Fact, FactId, Mention,
    PipelineContext, Result, SimilarPair,
};

use crate::report::{PublishReport, SyncOutcome};

/// Everything that crosses both quality gates, in a canonical order.
#[derive(Debug, Clone, Default)]
pub struct GatedPayload {
    pub facts: Vec<Fact>,
    pub articles: Vec<Article>,
    pub assertions: Vec<Assertion>,
    pub contradictions: Vec<ContradictionEdge>,
    pub similarities: Vec<SimilarPair>,
}

#[derive(Serialize)]
struct Fingerprint<'a> {
    facts: Vec<(FactId, &'a str, &'a str, &'a str)>,
    articles: Vec<(ArticleId, &'a str, bool)>,
    assertions: &'a [Assertion],
    contradictions: Vec<(FactId, FactId, String)>,
    similarities: Vec<(FactId, FactId)>,
}

impl GatedPayload {
    /// Apply both gates. `checked` may contain echoes; they contribute
    /// assertion edges pointing at their root but never become nodes.
    pub fn build(
        checked: Vec<Fact>,
        articles: Vec<Article>,
        contradictions: Vec<ContradictionEdge>,
        similarities: Vec<SimilarPair>,
    ) -> Self {
        let published: HashSet<FactId> = checked
            .iter()
            .filter(|f| f.is_publishable())
            .map(|f| f.id)
            .collect();
        let article_ids: HashSet<ArticleId> = articles.iter().map(|a| a.id).collect();

        let assertions: BTreeSet<Assertion> = checked
            .iter()
            .filter(|f| article_ids.contains(&f.article_id))
            .filter_map(|f| {
                let root = if f.is_original { Some(f.id) } else { f.provenance_id };
                root.filter(|r| published.contains(r)).map(|fact_id| Assertion {
                    article_id: f.article_id,
                    fact_id,
                })
            })
            .collect();

        let both = |a: FactId, b: FactId| published.contains(&a) && published.contains(&b);
        let mut contradictions: Vec<ContradictionEdge> = contradictions
            .into_iter()
            .filter(|e| both(e.fact_id_1, e.fact_id_2))
            .collect();
        contradictions.sort_by_key(|e| e.key());
        let mut similarities: Vec<SimilarPair> = similarities
            .into_iter()
            .filter(|p| both(p.fact_id_1, p.fact_id_2))
            .collect();
        similarities.sort_by_key(|p| (p.fact_id_1, p.fact_id_2));

        let mut facts: Vec<Fact> = checked.into_iter().filter(Fact::is_publishable).collect();
        facts.sort_by_key(|f| f.id);
        let mut articles = articles;
        articles.sort_by_key(|a| a.id);

        Self {
            facts,
            articles,
            assertions: assertions.into_iter().collect(),
            contradictions,
            similarities,
        }
    }

    /// SHA-256 over the graph-visible content. Timestamps and float
    /// distances are left out so an unchanged store hashes the same.
    pub fn digest(&self) -> String {
        let fingerprint = Fingerprint {
            facts: self
                .facts
                .iter()
                .map(|f| (f.id, f.subject.as_str(), f.predicate.as_str(), f.object.as_str()))
                .collect(),
            articles: self
                .articles
                .iter()
                .map(|a| (a.id, a.url.as_str(), a.is_reference))
                .collect(),
            assertions: &self.assertions,
            contradictions: self
                .contradictions
                .iter()
                .map(|e| (e.fact_id_1, e.fact_id_2, format!("{:.4}", e.score)))
                .collect(),
            similarities: self
                .similarities
                .iter()
                .map(|p| (p.fact_id_1, p.fact_id_2))
                .collect(),
        };
        let bytes = serde_json::to_vec(&fingerprint).unwrap_or_default();
        hex::encode(Sha256::digest(&bytes))
    }
}

/// Project gated facts and articles into the graph store.
#[instrument(skip(ctx))]
pub async fn run_publish(ctx: &PipelineContext) -> Result<PublishReport> {
    let checked = ctx.store.checked_facts().await?;
    let articles = ctx.store.publishable_articles().await?;

    if !checked.iter().any(Fact::is_publishable) {
        let reason = format!(
            "gate 1 passed no facts ({} checked, none original and checked)",
            checked.len()
        );
        warn!(reason = %reason, "Publication blocked");
        return Ok(PublishReport::empty(SyncOutcome::GateBlocked { reason }));
    }
    if articles.is_empty() {
        let reason = "gate 2 passed no articles (none topic-classified or reference)".to_string();
        warn!(reason = %reason, "Publication blocked");
        return Ok(PublishReport::empty(SyncOutcome::GateBlocked { reason }));
    }

    let Some(graph) = ctx.graph() else {
        warn!("Graph store unavailable, nothing published");
        let mut report = PublishReport::empty(SyncOutcome::Skipped);
        report.degraded.push(Capability::Graph);
        return Ok(report);
    };

    let contradictions = ctx.store.contradictions().await?;
    let similarities = ctx
        .store
        .similar_pairs(ctx.config.thresholds.provenance_distance)
        .await?;
    let payload = GatedPayload::build(checked, articles, contradictions, similarities);
    let digest = payload.digest();

    let last_sync = ctx.store.last_sync().await?;
    if last_sync.as_ref().is_some_and(|s| s.digest == digest) {
        info!(digest = %digest, "Gated payload unchanged since last sync");
        return Ok(PublishReport::empty(SyncOutcome::Unchanged { digest }));
    }

    let mut degraded = Vec::new();
    let mut entity_failures = 0;
    let since = last_sync.map(|s| s.synced_at);
    let mentions = match ctx.entities() {
        Some(recognizer) => {
            let fresh = payload
                .facts
                .iter()
                .filter(|f| match (since, f.checked_at) {
                    (Some(since), Some(checked)) => checked >= since,
                    _ => true,
                });
            let mut mentions = BTreeSet::new();
            for fact in fresh {
                match recognizer.recognize(&fact.statement()).await {
                    Ok(found) => mentions.extend(found.into_iter().filter_map(|m| {
                        let name = m.text.trim().to_lowercase();
                        (!name.is_empty()).then(|| Mention {
                            fact_id: fact.id,
                            name,
                            entity_type: m.entity_type,
                        })
                    })),
                    Err(e) => {
                        entity_failures += 1;
                        warn!(fact_id = fact.id, error = %e, "Entity recognition failed");
                    }
                }
            }
            mentions.into_iter().collect::<Vec<_>>()
        }
        None => {
            degraded.push(Capability::Entities);
            Vec::new()
        }
    };

    graph.ensure_schema().await?;
    let articles = graph.merge_articles(&payload.articles).await?;
    let facts = graph.merge_facts(&payload.facts).await?;
    let assertions = graph.merge_assertions(&payload.assertions).await?;
    let contradictions = graph.merge_contradictions(&payload.contradictions).await?;
    let similarities = graph.merge_similarities(&payload.similarities).await?;
    let mentions = graph.merge_mentions(&mentions).await?;
    // Leave the sync point where it was so the next run recognizes these facts again.
    if entity_failures == 0 {
        ctx.store.record_sync_digest(&digest).await?;
    } else {
        warn!(entity_failures, "Sync point held back until entity recognition succeeds");
    }

    info!(
        digest = %digest,
        facts,
        articles,
        assertions,
        contradictions,
        similarities,
        mentions,
        entity_failures,
        "Graph publication complete"
    );

    Ok(PublishReport {
        outcome: SyncOutcome::Published { digest },
        facts,
        articles,
        assertions,
        contradictions,
        similarities,
        mentions,
        entity_failures,
        degraded,
    })
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn fact(id: FactId, article_id: ArticleId, original: bool, root: Option<FactId>, checked: bool) -> Fact {
        Fact {
            id,
            article_id,
            subject: format!("s{id}"),
            predicate: "p".into(),
            object: "o".into(),
            confidence: 1.0,
            embedding: None,
            is_original: original,
            provenance_id: root,
            external_source_url: None,
            checked_at: checked.then(Utc::now),
            created_at: Utc::now(),
        }
    }

    fn article(id: ArticleId) -> Article {
        Article {
            id,
            url: format!("https://news.example/{id}"),
            title: None,
            publisher: None,
            raw_text: None,
            trust_score: 0.5,
            published_date: None,
            processed_at: Some(Utc::now()),
            is_reference: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn echoes_assert_their_root() {
        let checked = vec![fact(1, 10, true, None, true), fact(2, 20, false, Some(1), true)];
        let payload = GatedPayload::build(checked, vec![article(10), article(20)], vec![], vec![]);
        assert_eq!(payload.facts.len(), 1);
        assert_eq!(
            payload.assertions,
            vec![
                Assertion { article_id: 10, fact_id: 1 },
                Assertion { article_id: 20, fact_id: 1 },
            ]
        );
    }

    #[test]
    fn assertions_need_both_endpoints_gated() {
        // Article 20 did not pass gate 2.
        let checked = vec![fact(1, 10, true, None, true), fact(2, 20, true, None, true)];
        let payload = GatedPayload::build(checked, vec![article(10)], vec![], vec![]);
        assert_eq!(payload.assertions, vec![Assertion { article_id: 10, fact_id: 1 }]);
    }

    #[test]
    fn edges_to_unpublished_facts_are_dropped() {
        let checked = vec![fact(1, 10, true, None, true), fact(2, 10, false, Some(1), true)];
        let edges = vec![ContradictionEdge::new(1, 2, 0.9, "nli")];
        let payload = GatedPayload::build(checked, vec![article(10)], edges, vec![]);
        assert!(payload.contradictions.is_empty());
    }

    #[test]
    fn digest_ignores_input_order() {
        let a = GatedPayload::build(
            vec![fact(1, 10, true, None, true), fact(2, 10, true, None, true)],
            vec![article(10)],
            vec![],
            vec![],
        );
        let b = GatedPayload::build(
            vec![fact(2, 10, true, None, true), fact(1, 10, true, None, true)],
            vec![article(10)],
            vec![],
            vec![],
        );
        assert_eq!(a.digest(), b.digest());
        assert_eq!(a.digest().len(), 64);
    }
}
