mod common;

use std::sync::atomic::Ordering;

use chrono::{Duration, Utc};

use verity_core::{Assertion, FactCandidate, FactStore};
use verity_pipeline::{
    run_contradictions, run_digest, run_provenance, run_publish, DetectionMode, SyncOutcome,
};

use common::{at_angle, axis, day, near, PairScript, World};

// ---------------------------------------------------------------------------
// One earthquake, three outlets
// ---------------------------------------------------------------------------

#[tokio::test]
async fn earthquake_story_flows_from_articles_to_graph() {
    let world = World::new();
    let wire = world
        .store
        .add_article("https://www.reuters.com/world/quake", Some("wire report"), 0.9, Some(day(1)))
        .await;
    let paper = world
        .store
        .add_article("https://daily.example/quake", Some("paper report"), 0.5, Some(day(2)))
        .await;
    let blog = world
        .store
        .add_article("https://blog.example/quake", Some("blog repost"), 0.3, Some(day(3)))
        .await;
    for id in [wire, paper, blog] {
        world.store.classify_article(id).await;
    }

    let original = FactCandidate::new("Japan", "was struck by", "a magnitude 7.1 earthquake", 0.95);
    let reworded = FactCandidate::new("Japan", "was hit by", "a 7.1-magnitude earthquake", 0.9);
    let conflicting = FactCandidate::new("The earthquake", "measured", "magnitude 5.2", 0.8);
    world.embedder.pin(&original.statement(), axis(0));
    world.embedder.pin(&reworded.statement(), at_angle(25.8));
    world.embedder.pin(&conflicting.statement(), near(0, 2, 0.3));
    world.extractor.answer("wire report", vec![original.clone()]);
    world.extractor.answer("paper report", vec![reworded.clone(), conflicting.clone()]);
    world.extractor.answer("blog repost", vec![original.clone()]);
    world.entailment.script(
        &original.statement(),
        &conflicting.statement(),
        PairScript::Score(0.88),
    );

    let ctx = world.context();

    // Extraction: the blog repost is an exact duplicate of the wire claim.
    let digest = run_digest(&ctx).await.expect("failed to run digest");
    assert_eq!(digest.articles, 3);
    assert_eq!(digest.inserted, 3);
    assert_eq!(digest.duplicates, 1);

    let facts = world.store.facts().await;
    let id_of = |statement: &str| {
        facts
            .iter()
            .find(|f| f.statement() == statement)
            .map(|f| f.id)
            .expect("fact not extracted")
    };
    let root = id_of(&original.statement());
    let echo = id_of(&reworded.statement());
    let claim = id_of(&conflicting.statement());

    // The wire claim has matured into the trusted baseline.
    world
        .store
        .set_fact_created_at(root, Utc::now() - Duration::days(10))
        .await;

    // Provenance: the reworded claim echoes the wire, the conflicting one stands alone.
    let provenance = run_provenance(&ctx).await.expect("failed to run provenance");
    assert_eq!(provenance.examined, 3);
    assert_eq!(provenance.original, 2);
    assert_eq!(provenance.echoes, 1);
    assert_eq!(world.search.calls.load(Ordering::SeqCst), 2);
    let echoed = world
        .store
        .get_fact(echo)
        .await
        .expect("failed to load fact")
        .expect("fact missing");
    assert_eq!(echoed.provenance_id, Some(root));

    // Contradictions: the fresh claim against the matured wire claim.
    let detection = run_contradictions(&ctx, DetectionMode::Window { hours: 24 })
        .await
        .expect("failed to run detection");
    assert_eq!(detection.baseline, 1);
    assert_eq!(detection.candidates, 1);
    assert_eq!(detection.found, 1);

    // Publication.
    let published = run_publish(&ctx).await.expect("failed to run publish");
    assert!(matches!(published.outcome, SyncOutcome::Published { .. }));
    assert_eq!(published.facts, 2);
    assert_eq!(published.articles, 3);
    assert_eq!(published.contradictions, 1);

    assert_eq!(world.graph.fact_ids().await, vec![root, claim]);
    assert_eq!(
        world.graph.assertions().await,
        vec![
            Assertion { article_id: wire, fact_id: root },
            Assertion { article_id: paper, fact_id: root },
            Assertion { article_id: paper, fact_id: claim },
        ]
    );
    let edges = world.graph.contradictions().await;
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].key(), (root, claim));

    // A second pass over an unchanged store does nothing new.
    let again = run_digest(&ctx).await.expect("failed to rerun digest");
    assert_eq!(again.articles, 0);
    let republished = run_publish(&ctx).await.expect("failed to rerun publish");
    assert!(matches!(republished.outcome, SyncOutcome::Unchanged { .. }));
}

#[tokio::test]
async fn single_article_yields_two_unresolved_facts_then_two_originals() {
    let world = World::new();
    let text = "A magnitude 7 earthquake struck Japan in 2025, killing 956 people.";
    world
        .store
        .add_article("https://news.example/japan-quake", Some(text), 0.6, Some(day(6)))
        .await;
    world.extractor.answer(
        text,
        vec![
            FactCandidate::new("A magnitude 7 earthquake", "struck", "Japan in 2025", 0.95),
            FactCandidate::new("The Japan earthquake", "killed", "956 people", 0.9),
        ],
    );

    let ctx = world.context();
    let digest = run_digest(&ctx).await.expect("failed to run digest");

    assert_eq!(digest.inserted, 2);
    assert_eq!(digest.duplicates, 0);
    let facts = world.store.facts().await;
    assert_eq!(facts.len(), 2);
    for fact in &facts {
        let embedding = fact.embedding.as_ref().expect("fact stored without embedding");
        assert_eq!(embedding.len(), verity_core::EMBEDDING_DIM);
        assert!(fact.checked_at.is_none());
    }

    let provenance = run_provenance(&ctx).await.expect("failed to run provenance");

    assert_eq!(provenance.original, 2);
    for fact in world.store.facts().await {
        assert!(fact.is_original);
        assert!(fact.provenance_id.is_none());
        assert!(fact.external_source_url.is_none());
        assert!(fact.checked_at.is_some());
    }
}
