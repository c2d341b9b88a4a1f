mod common;

use std::sync::atomic::Ordering;

use verity_core::{FactId, FactStore};
use verity_pipeline::run_provenance;

use common::{at_angle, axis, day, hit, SearchScript, World};

async fn fact(world: &World, id: FactId) -> verity_core::Fact {
    world
        .store
        .get_fact(id)
        .await
        .expect("failed to load fact")
        .expect("fact missing")
}

// ---------------------------------------------------------------------------
// Echo chains
// ---------------------------------------------------------------------------

#[tokio::test]
async fn echo_of_an_echo_points_at_the_root() {
    let world = World::new();
    let a = world.store.add_article("https://a.example/1", None, 0.5, Some(day(1))).await;
    let b = world.store.add_article("https://b.example/2", None, 0.5, Some(day(2))).await;
    let c = world.store.add_article("https://c.example/3", None, 0.5, Some(day(3))).await;

    // A-B and B-C sit inside the provenance radius, A-C does not.
    let root = world.fact(a, "Kyoto", at_angle(0.0)).await;
    let echo = world.fact(b, "Kyoto", at_angle(25.8)).await;
    let far_echo = world.fact(c, "Kyoto", at_angle(51.7)).await;

    let report = run_provenance(&world.context()).await.expect("failed to run provenance");

    assert_eq!(report.examined, 3);
    assert_eq!(report.original, 1);
    assert_eq!(report.echoes, 2);
    assert_eq!(world.search.calls.load(Ordering::SeqCst), 1);

    let root = fact(&world, root).await;
    assert!(root.is_original);
    assert!(root.checked_at.is_some());
    for id in [echo, far_echo] {
        let f = fact(&world, id).await;
        assert!(!f.is_original);
        assert_eq!(f.provenance_id, Some(root.id));
    }

    // No echo ever points at another echo.
    for f in world.store.facts().await {
        if let Some(target) = f.provenance_id {
            assert!(fact(&world, target).await.is_original);
        }
    }
}

#[tokio::test]
async fn equal_publication_dates_go_to_the_lowest_id() {
    let world = World::new();
    let a1 = world.store.add_article("https://a.example/1", None, 0.5, Some(day(1))).await;
    let a2 = world.store.add_article("https://a.example/2", None, 0.5, Some(day(1))).await;
    let a3 = world.store.add_article("https://a.example/3", None, 0.5, Some(day(2))).await;

    let first = world.fact(a1, "Osaka", axis(0)).await;
    let twin = world.fact(a2, "Osaka", axis(0)).await;
    let late = world.fact(a3, "Osaka", axis(0)).await;

    run_provenance(&world.context()).await.expect("failed to run provenance");

    // Same-day twins are not echoes of each other.
    assert!(fact(&world, first).await.is_original);
    assert!(fact(&world, twin).await.is_original);
    assert_eq!(fact(&world, late).await.provenance_id, Some(first));
}

#[tokio::test]
async fn later_publication_cannot_be_a_predecessor() {
    let world = World::new();
    // Stored first but published after the second article.
    let late = world.store.add_article("https://a.example/late", None, 0.5, Some(day(5))).await;
    let early = world.store.add_article("https://b.example/early", None, 0.5, Some(day(2))).await;

    let stored_first = world.fact(late, "Sendai", axis(0)).await;
    let stored_second = world.fact(early, "Sendai", axis(0)).await;

    run_provenance(&world.context()).await.expect("failed to run provenance");

    assert!(fact(&world, stored_first).await.is_original);
    assert!(fact(&world, stored_second).await.is_original);
}

// ---------------------------------------------------------------------------
// External search
// ---------------------------------------------------------------------------

#[tokio::test]
async fn external_hits_become_shared_reference_articles() {
    let world = World::new();
    let a = world.store.add_article("https://a.example/1", None, 0.5, Some(day(3))).await;
    let b = world.store.add_article("https://b.example/2", None, 0.5, Some(day(4))).await;
    let first = world.fact(a, "Kobe", axis(0)).await;
    let second = world.fact(b, "Nagoya", axis(1)).await;

    world.search.set(SearchScript::Hits(vec![hit(
        "https://archive.example/quake",
        Some("2024-12-30"),
    )]));
    let report = run_provenance(&world.context()).await.expect("failed to run provenance");

    assert_eq!(report.external, 2);
    for id in [first, second] {
        let f = fact(&world, id).await;
        assert!(!f.is_original);
        assert!(f.provenance_id.is_none());
        assert_eq!(f.external_source_url.as_deref(), Some("https://archive.example/quake"));
    }

    let references: Vec<_> = world
        .store
        .articles()
        .await
        .into_iter()
        .filter(|a| a.is_reference)
        .collect();
    assert_eq!(references.len(), 1);
    assert_eq!(references[0].url, "https://archive.example/quake");
    assert!(references[0].published_date.is_some());
}

#[tokio::test]
async fn a_hit_on_the_fact_own_article_is_not_external() {
    let world = World::new();
    let a = world.store.add_article("https://a.example/1", None, 0.5, Some(day(3))).await;
    let id = world.fact(a, "Kobe", axis(0)).await;

    world.search.set(SearchScript::Hits(vec![hit("https://a.example/1", None)]));
    run_provenance(&world.context()).await.expect("failed to run provenance");

    assert!(fact(&world, id).await.is_original);
}

#[tokio::test]
async fn unreadable_search_response_counts_as_no_hit() {
    let world = World::new();
    let a = world.store.add_article("https://a.example/1", None, 0.5, Some(day(3))).await;
    let id = world.fact(a, "Kobe", axis(0)).await;

    world.search.set(SearchScript::Malformed);
    let report = run_provenance(&world.context()).await.expect("failed to run provenance");

    assert_eq!(report.original, 1);
    let f = fact(&world, id).await;
    assert!(f.is_original);
    assert!(f.checked_at.is_some());
}

// ---------------------------------------------------------------------------
// Deferral
// ---------------------------------------------------------------------------

#[tokio::test]
async fn search_outage_defers_and_a_later_run_resolves() {
    let world = World::new();
    let a = world.store.add_article("https://a.example/1", None, 0.5, Some(day(1))).await;
    let b = world.store.add_article("https://b.example/2", None, 0.5, Some(day(2))).await;
    let root = world.fact(a, "Kobe", axis(0)).await;
    let echo = world.fact(b, "Kobe", axis(0)).await;

    world.search.set(SearchScript::Transient);
    let report = run_provenance(&world.context()).await.expect("failed to run provenance");

    // The root is searched with retries, the echo waits on its unresolved predecessor.
    assert_eq!(report.deferred, 2);
    assert_eq!(world.search.calls.load(Ordering::SeqCst), 3);
    assert!(fact(&world, root).await.checked_at.is_none());
    assert!(fact(&world, echo).await.checked_at.is_none());

    world.search.set(SearchScript::Hits(Vec::new()));
    let report = run_provenance(&world.context()).await.expect("failed to run provenance");

    assert_eq!(report.original, 1);
    assert_eq!(report.echoes, 1);
    assert_eq!(fact(&world, echo).await.provenance_id, Some(root));
}

#[tokio::test]
async fn rejected_search_resolves_instead_of_stalling_the_batch() {
    let mut world = World::new();
    world.config.thresholds.provenance_batch = 1;
    let a = world.store.add_article("https://a.example/1", None, 0.5, Some(day(1))).await;
    let b = world.store.add_article("https://b.example/2", None, 0.5, Some(day(2))).await;
    let first = world.fact(a, "Kobe", axis(0)).await;
    let second = world.fact(b, "Nagoya", axis(1)).await;

    world.search.set(SearchScript::Rejected);
    let ctx = world.context();
    let report = run_provenance(&ctx).await.expect("failed to run provenance");

    assert_eq!(report.examined, 1);
    assert_eq!(report.deferred, 0);
    assert_eq!(report.original, 1);
    assert_eq!(report.search_failures, 1);
    // Permanent failures are not retried.
    assert_eq!(world.search.calls.load(Ordering::SeqCst), 1);
    let f = fact(&world, first).await;
    assert!(f.is_original);
    assert!(f.checked_at.is_some());

    let report = run_provenance(&ctx).await.expect("failed to rerun provenance");

    assert_eq!(report.examined, 1);
    assert_eq!(report.search_failures, 1);
    assert!(fact(&world, second).await.checked_at.is_some());
}

#[tokio::test]
async fn checked_facts_are_never_examined_again() {
    let world = World::new();
    let a = world.store.add_article("https://a.example/1", None, 0.5, Some(day(1))).await;
    world.fact(a, "Kobe", axis(0)).await;

    let ctx = world.context();
    run_provenance(&ctx).await.expect("failed to run provenance");
    let again = run_provenance(&ctx).await.expect("failed to rerun provenance");

    assert_eq!(again.examined, 0);
    assert_eq!(world.search.calls.load(Ordering::SeqCst), 1);
}
