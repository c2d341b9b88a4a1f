use tracing::{debug, info, instrument, warn};

use verity_core::{
    Capability, Neighbor, PipelineContext, ReferenceArticle, Resolution, Result, SourcedFact,
    VerityError,
};

use crate::report::ProvenanceReport;

/// What the resolver concluded for one fact. `Deferred` leaves it unchecked
/// and is only returned for failures that may clear on a later run.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Resolved(Resolution),
    /// No internal predecessor and the external check failed for good.
    Unsearched(String),
    Deferred(String),
}

/// The earliest neighbor that was both stored before `fact` and published
/// before it. Equal dates go to the lowest fact id.
pub fn earliest_predecessor<'a>(fact: &SourcedFact, neighbors: &'a [Neighbor]) -> Option<&'a SourcedFact> {
    let own_date = fact.effective_date();
    neighbors
        .iter()
        .map(|n| &n.fact)
        .filter(|n| n.fact.precedes(&fact.fact) && n.effective_date() < own_date)
        .min_by_key(|n| (n.effective_date(), n.fact.id))
}

/// Follow `predecessor` one hop to its root. `None` if it is still unresolved.
fn inherit(predecessor: &SourcedFact) -> Result<Option<Resolution>> {
    let pred = &predecessor.fact;
    if pred.checked_at.is_none() {
        return Ok(None);
    }
    if pred.is_original {
        return Ok(Some(Resolution::EchoOf { root: pred.id }));
    }
    if let Some(root) = pred.provenance_id {
        return Ok(Some(Resolution::EchoOf { root }));
    }
    if let Some(url) = &pred.external_source_url {
        return Ok(Some(Resolution::External { url: url.clone() }));
    }
    Err(VerityError::DataIntegrity(format!(
        "fact {} is an echo with neither a root nor an external source",
        pred.id
    )))
}

/// Resolve every unchecked fact in one batch, oldest first.
#[instrument(skip(ctx))]
pub async fn run_provenance(ctx: &PipelineContext) -> Result<ProvenanceReport> {
    let mut report = ProvenanceReport::default();
    if !ctx.has(Capability::Search) {
        report.degraded.push(Capability::Search);
    }

    let facts = ctx
        .store
        .unresolved_facts(ctx.config.thresholds.provenance_batch)
        .await?;
    info!(batch = facts.len(), "Resolving provenance");

    for fact in &facts {
        report.examined += 1;
        match resolve_fact(ctx, fact).await {
            Ok(Verdict::Resolved(resolution)) => {
                ctx.store.record_resolution(fact.fact.id, &resolution).await?;
                match &resolution {
                    Resolution::Original => report.original += 1,
                    Resolution::EchoOf { .. } => report.echoes += 1,
                    Resolution::External { .. } => report.external += 1,
                }
                debug!(fact_id = fact.fact.id, ?resolution, "Provenance resolved");
            }
            Ok(Verdict::Unsearched(reason)) => {
                ctx.store.record_resolution(fact.fact.id, &Resolution::Original).await?;
                report.original += 1;
                report.search_failures += 1;
                warn!(fact_id = fact.fact.id, reason = %reason, "External check failed, resolved as original");
            }
            Ok(Verdict::Deferred(reason)) => {
                report.deferred += 1;
                debug!(fact_id = fact.fact.id, reason = %reason, "Provenance deferred");
            }
            Err(e) => {
                report.failures += 1;
                warn!(fact_id = fact.fact.id, error = %e, "Provenance resolution failed");
            }
        }
    }

    info!(
        examined = report.examined,
        original = report.original,
        echoes = report.echoes,
        external = report.external,
        deferred = report.deferred,
        search_failures = report.search_failures,
        "Provenance batch complete"
    );
    Ok(report)
}

pub async fn resolve_fact(ctx: &PipelineContext, fact: &SourcedFact) -> Result<Verdict> {
    let thresholds = &ctx.config.thresholds;
    let neighbors = ctx
        .store
        .neighbors(
            &fact.fact,
            thresholds.provenance_distance,
            thresholds.provenance_neighbor_limit,
        )
        .await?;

    if let Some(predecessor) = earliest_predecessor(fact, &neighbors) {
        match inherit(predecessor) {
            Ok(Some(resolution)) => return Ok(Verdict::Resolved(resolution)),
            Ok(None) => {
                return Ok(Verdict::Deferred(format!(
                    "predecessor {} is unresolved",
                    predecessor.fact.id
                )))
            }
            // A broken chain cannot be followed; fall through to the external check.
            Err(e) => warn!(fact_id = fact.fact.id, error = %e, "Predecessor unusable, ignoring it"),
        }
    }

    let Some(search) = ctx.search() else {
        return Ok(Verdict::Resolved(Resolution::Original));
    };

    let statement = fact.fact.statement();
    let before = fact.effective_date().date_naive();
    let hits = thresholds
        .collaborator_retry()
        .run("search", || search.search(&statement, before), VerityError::is_transient)
        .await;

    let hits = match hits {
        Ok(hits) => hits,
        Err(e @ VerityError::MalformedResponse { .. }) => {
            debug!(fact_id = fact.fact.id, error = %e, "Unreadable search response, treating as no hit");
            return Ok(Verdict::Resolved(Resolution::Original));
        }
        Err(e) if e.is_transient() => return Ok(Verdict::Deferred(format!("search failed: {e}"))),
        Err(e) => return Ok(Verdict::Unsearched(e.to_string())),
    };

    let own_url = ctx
        .store
        .get_article(fact.fact.article_id)
        .await?
        .map(|a| a.url);
    let Some(hit) = hits
        .into_iter()
        .find(|h| Some(h.url.as_str()) != own_url.as_deref())
    else {
        return Ok(Verdict::Resolved(Resolution::Original));
    };

    let reference_id = ctx
        .store
        .upsert_reference_article(&ReferenceArticle {
            url: hit.url.clone(),
            title: hit.title.clone(),
            published_date: hit.published_date(),
        })
        .await?;
    debug!(fact_id = fact.fact.id, reference_id, url = %hit.url, "External source found");
    Ok(Verdict::Resolved(Resolution::External { url: hit.url }))
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use verity_core::Fact;

    use super::*;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, day, 12, 0, 0).unwrap()
    }

    fn sourced(id: i64, created: DateTime<Utc>, published: Option<DateTime<Utc>>) -> SourcedFact {
        SourcedFact {
            fact: Fact {
                id,
                article_id: id,
                subject: "Japan".into(),
                predicate: "was hit by".into(),
                object: "an earthquake".into(),
                confidence: 0.9,
                embedding: None,
                is_original: true,
                provenance_id: None,
                external_source_url: None,
                checked_at: Some(created),
                created_at: created,
            },
            published_date: published,
            trust_score: 0.5,
        }
    }

    fn near(fact: SourcedFact) -> Neighbor {
        Neighbor { fact, distance: 0.1 }
    }

    #[test]
    fn equal_dates_break_to_lowest_id() {
        let own = sourced(10, at(5), Some(at(5)));
        let neighbors = vec![
            near(sourced(7, at(2), Some(at(3)))),
            near(sourced(4, at(2), Some(at(3)))),
            near(sourced(6, at(1), Some(at(4)))),
        ];
        assert_eq!(earliest_predecessor(&own, &neighbors).unwrap().fact.id, 4);
    }

    #[test]
    fn later_insert_cannot_be_a_predecessor() {
        // Stored after `own` even though its article claims an earlier date.
        let own = sourced(3, at(2), Some(at(5)));
        let neighbors = vec![near(sourced(9, at(3), Some(at(1))))];
        assert!(earliest_predecessor(&own, &neighbors).is_none());
    }

    #[test]
    fn same_day_publication_is_not_earlier() {
        let own = sourced(5, at(2), Some(at(2)));
        let neighbors = vec![near(sourced(1, at(1), Some(at(2))))];
        assert!(earliest_predecessor(&own, &neighbors).is_none());
    }

    #[test]
    fn missing_date_falls_back_to_insert_time() {
        let own = sourced(5, at(4), None);
        let neighbors = vec![near(sourced(1, at(1) - Duration::hours(1), None))];
        assert_eq!(earliest_predecessor(&own, &neighbors).unwrap().fact.id, 1);
    }

    #[test]
    fn echoes_inherit_their_predecessors_root() {
        let mut pred = sourced(2, at(1), None);
        pred.fact.is_original = false;
        pred.fact.provenance_id = Some(1);
        assert_eq!(inherit(&pred).unwrap(), Some(Resolution::EchoOf { root: 1 }));

        pred.fact.provenance_id = None;
        pred.fact.external_source_url = Some("https://a.example/x".into());
        assert_eq!(
            inherit(&pred).unwrap(),
            Some(Resolution::External { url: "https://a.example/x".into() })
        );

        pred.fact.checked_at = None;
        assert_eq!(inherit(&pred).unwrap(), None);
    }
}
