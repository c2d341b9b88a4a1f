use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use tokio::sync::RwLock;

use verity_core::graph::{Assertion, GraphCounts, GraphStore, Mention};
use verity_core::store::SimilarPair;
use verity_core::{Article, ArticleId, ContradictionEdge, Fact, FactId, Result};

#[derive(Default)]
struct Projection {
    schema_ready: bool,
    articles: BTreeMap<ArticleId, Article>,
    facts: BTreeMap<FactId, Fact>,
    entities: BTreeSet<(String, String)>,
    assertions: BTreeSet<Assertion>,
    contradictions: BTreeMap<(FactId, FactId), ContradictionEdge>,
    similarities: BTreeMap<(FactId, FactId), f64>,
    mentions: BTreeSet<Mention>,
}

/// In-process [`GraphStore`] mirroring Neo4j's MATCH/MERGE semantics: nodes
/// are keyed by id, and an edge whose endpoint is missing is dropped.
#[derive(Default)]
pub struct MemoryGraph {
    inner: RwLock<Projection>,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn schema_ready(&self) -> bool {
        self.inner.read().await.schema_ready
    }

    pub async fn fact_ids(&self) -> Vec<FactId> {
        self.inner.read().await.facts.keys().copied().collect()
    }

    pub async fn article_ids(&self) -> Vec<ArticleId> {
        self.inner.read().await.articles.keys().copied().collect()
    }

    pub async fn assertions(&self) -> Vec<Assertion> {
        self.inner.read().await.assertions.iter().copied().collect()
    }

    pub async fn contradictions(&self) -> Vec<ContradictionEdge> {
        self.inner
            .read()
            .await
            .contradictions
            .values()
            .cloned()
            .collect()
    }

    pub async fn mentions(&self) -> Vec<Mention> {
        self.inner.read().await.mentions.iter().cloned().collect()
    }
}

#[async_trait]
impl GraphStore for MemoryGraph {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn ensure_schema(&self) -> Result<()> {
        self.inner.write().await.schema_ready = true;
        Ok(())
    }

    async fn merge_articles(&self, articles: &[Article]) -> Result<u64> {
        let mut g = self.inner.write().await;
        for a in articles {
            g.articles.insert(
                a.id,
                Article {
                    raw_text: None,
                    ..a.clone()
                },
            );
        }
        Ok(articles.len() as u64)
    }

    async fn merge_facts(&self, facts: &[Fact]) -> Result<u64> {
        let mut g = self.inner.write().await;
        for f in facts {
            g.facts.insert(f.id, f.clone());
        }
        Ok(facts.len() as u64)
    }

    async fn merge_assertions(&self, assertions: &[Assertion]) -> Result<u64> {
        let mut g = self.inner.write().await;
        for a in assertions {
            if g.articles.contains_key(&a.article_id) && g.facts.contains_key(&a.fact_id) {
                g.assertions.insert(*a);
            }
        }
        Ok(assertions.len() as u64)
    }

    async fn merge_contradictions(&self, edges: &[ContradictionEdge]) -> Result<u64> {
        let mut g = self.inner.write().await;
        for e in edges {
            if g.facts.contains_key(&e.fact_id_1) && g.facts.contains_key(&e.fact_id_2) {
                g.contradictions.insert(e.key(), e.clone());
            }
        }
        Ok(edges.len() as u64)
    }

    async fn merge_similarities(&self, pairs: &[SimilarPair]) -> Result<u64> {
        let mut g = self.inner.write().await;
        for p in pairs {
            if g.facts.contains_key(&p.fact_id_1) && g.facts.contains_key(&p.fact_id_2) {
                g.similarities.insert((p.fact_id_1, p.fact_id_2), p.distance);
            }
        }
        Ok(pairs.len() as u64)
    }

    async fn merge_mentions(&self, mentions: &[Mention]) -> Result<u64> {
        let mut g = self.inner.write().await;
        for m in mentions {
            if g.facts.contains_key(&m.fact_id) {
                g.entities.insert((m.name.clone(), m.entity_type.clone()));
                g.mentions.insert(m.clone());
            }
        }
        Ok(mentions.len() as u64)
    }

    async fn counts(&self) -> Result<GraphCounts> {
        let g = self.inner.read().await;
        Ok(GraphCounts {
            facts: g.facts.len() as u64,
            articles: g.articles.len() as u64,
            entities: g.entities.len() as u64,
            assertions: g.assertions.len() as u64,
            contradictions: g.contradictions.len() as u64,
            similarities: g.similarities.len() as u64,
            mentions: g.mentions.len() as u64,
        })
    }
}
