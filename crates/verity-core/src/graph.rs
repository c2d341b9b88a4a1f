use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::article::{Article, ArticleId};
use crate::error::Result;
use crate::fact::{ContradictionEdge, Fact, FactId};
use crate::store::SimilarPair;

/// `(:Article)-[:ASSERTED]->(:Fact)`. For an echo the edge points at its root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Assertion {
    pub article_id: ArticleId,
    pub fact_id: FactId,
}

/// `(:Fact)-[:MENTIONS]->(:Entity {name, type})`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Mention {
    pub fact_id: FactId,
    pub name: String,
    pub entity_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphCounts {
    pub facts: u64,
    pub articles: u64,
    pub entities: u64,
    pub assertions: u64,
    pub contradictions: u64,
    pub similarities: u64,
    pub mentions: u64,
}

/// Derived projection of the relational store. Every write merges on natural
/// keys, and edges whose endpoints are absent are skipped. Merge calls
/// return the number of items sent.
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn ping(&self) -> Result<()>;
    async fn ensure_schema(&self) -> Result<()>;
    async fn merge_articles(&self, articles: &[Article]) -> Result<u64>;
    async fn merge_facts(&self, facts: &[Fact]) -> Result<u64>;
    async fn merge_assertions(&self, assertions: &[Assertion]) -> Result<u64>;
    async fn merge_contradictions(&self, edges: &[ContradictionEdge]) -> Result<u64>;
    async fn merge_similarities(&self, pairs: &[SimilarPair]) -> Result<u64>;
    async fn merge_mentions(&self, mentions: &[Mention]) -> Result<u64>;
    async fn counts(&self) -> Result<GraphCounts>;
}
