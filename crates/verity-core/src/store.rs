use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::article::{Article, ArticleId, QueueSummary, ReferenceArticle};
use crate::error::Result;
use crate::fact::{ContradictionEdge, Fact, FactId, NewFact, Resolution, SourcedFact};

/// A semantic neighbor returned by vector search, nearest first.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    pub fact: SourcedFact,
    pub distance: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CandidateWindow {
    /// Facts not yet known to be echoes, inserted at or after the given instant.
    Since { since: DateTime<Utc> },
    /// Every original fact, regardless of age.
    Backfill,
}

/// Fingerprint of the last payload pushed to the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncState {
    pub digest: String,
    pub synced_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimilarPair {
    pub fact_id_1: FactId,
    pub fact_id_2: FactId,
    pub distance: f64,
}

/// The relational source of truth for articles, facts and contradiction edges.
#[async_trait]
pub trait FactStore: Send + Sync {
    async fn ping(&self) -> Result<()>;

    // Articles

    /// Articles with text that extraction has not visited yet, oldest first.
    async fn unprocessed_articles(&self, limit: usize) -> Result<Vec<Article>>;
    async fn get_article(&self, id: ArticleId) -> Result<Option<Article>>;
    async fn mark_article_processed(&self, id: ArticleId) -> Result<()>;
    async fn update_published_date(&self, id: ArticleId, date: DateTime<Utc>) -> Result<()>;
    /// Insert a reference article, or return the id of the existing row with the same URL.
    async fn upsert_reference_article(&self, reference: &ReferenceArticle) -> Result<ArticleId>;
    /// Set `trust_score` on every article hosted on `domain`. Returns rows touched.
    async fn apply_trust_score(&self, domain: &str, score: f64) -> Result<u64>;

    // Facts

    async fn insert_fact(&self, fact: &NewFact) -> Result<FactId>;
    async fn get_fact(&self, id: FactId) -> Result<Option<Fact>>;
    /// Closest stored fact strictly under `max_distance`, if any.
    async fn nearest_fact(&self, embedding: &[f32], max_distance: f64)
        -> Result<Option<(FactId, f64)>>;
    /// Facts under `max_distance` from `fact`, excluding the fact itself.
    async fn neighbors(&self, fact: &Fact, max_distance: f64, limit: usize)
        -> Result<Vec<Neighbor>>;
    /// Embedded facts with `checked_at` unset, ordered by `(created_at, id)`.
    async fn unresolved_facts(&self, limit: usize) -> Result<Vec<SourcedFact>>;
    /// Write the provenance outcome and stamp `checked_at`.
    async fn record_resolution(&self, id: FactId, resolution: &Resolution) -> Result<()>;

    // Contradictions

    /// Original facts from trusted sources inserted before `matured_before`.
    async fn baseline_facts(
        &self,
        min_trust: f64,
        matured_before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Fact>>;
    async fn candidate_facts(&self, window: CandidateWindow) -> Result<Vec<Fact>>;
    /// Insert the edge, or refresh score and detection time if the pair exists.
    async fn upsert_contradiction(&self, edge: &ContradictionEdge) -> Result<()>;
    async fn contradictions(&self) -> Result<Vec<ContradictionEdge>>;

    // Publication

    /// Every fact the provenance resolver has finished with.
    async fn checked_facts(&self) -> Result<Vec<Fact>>;
    /// Articles passing gate 2: processed and topic-classified, or references.
    async fn publishable_articles(&self) -> Result<Vec<Article>>;
    /// Pairs of publishable facts closer than `max_distance`, `fact_id_1 < fact_id_2`.
    async fn similar_pairs(&self, max_distance: f64) -> Result<Vec<SimilarPair>>;
    async fn last_sync(&self) -> Result<Option<SyncState>>;
    async fn record_sync_digest(&self, digest: &str) -> Result<()>;

    // Archival

    async fn archivable_articles(
        &self,
        processed_before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Article>>;
    /// The subset of `ids` that still own at least one fact.
    async fn articles_with_facts(&self, ids: &[ArticleId]) -> Result<Vec<ArticleId>>;
    /// Copy rows verbatim, keeping ids. Rows already present are left alone.
    async fn archive_articles(&self, articles: &[Article]) -> Result<u64>;
    async fn delete_articles(&self, ids: &[ArticleId]) -> Result<u64>;
    async fn clear_raw_text(&self, ids: &[ArticleId]) -> Result<u64>;

    async fn queue_summary(&self) -> Result<QueueSummary>;
}
