use async_trait::async_trait;
use neo4rs::{query, Graph, Query};
use std::future::Future;

use verity_core::graph::{Assertion, GraphCounts, GraphStore, Mention};
use verity_core::store::SimilarPair;
use verity_core::{Article, ContradictionEdge, Fact, Result, VerityError, EMBEDDING_DIM};

/// Timeout for all Neo4j operations (seconds).
const NEO4J_TIMEOUT_SECS: u64 = 10;

const SCHEMA: &[&str] = &[
    "CREATE CONSTRAINT fact_id IF NOT EXISTS FOR (f:Fact) REQUIRE f.id IS UNIQUE",
    "CREATE CONSTRAINT article_id IF NOT EXISTS FOR (a:Article) REQUIRE a.id IS UNIQUE",
    "CREATE CONSTRAINT entity_key IF NOT EXISTS FOR (e:Entity) REQUIRE (e.name, e.type) IS UNIQUE",
    "CREATE FULLTEXT INDEX fact_statement_fulltext IF NOT EXISTS FOR (f:Fact) ON EACH [f.statement]",
];

pub struct Neo4jGraphStore {
    graph: Option<Graph>,
}

impl Neo4jGraphStore {
    /// Connect, falling back to a disconnected store instead of failing.
    pub async fn new(uri: &str, user: &str, password: &str) -> Self {
        match timed(Graph::new(uri, user, password)).await {
            Ok(Ok(graph)) => {
                tracing::info!(uri = %uri, "Connected to Neo4j");
                Self { graph: Some(graph) }
            }
            Ok(Err(e)) => {
                tracing::warn!(uri = %uri, error = %e, "Failed to connect to Neo4j, running without graph");
                Self { graph: None }
            }
            Err(e) => {
                tracing::warn!(uri = %uri, error = %e, "Neo4j connection timed out, running without graph");
                Self { graph: None }
            }
        }
    }

    fn graph(&self) -> Result<&Graph> {
        self.graph
            .as_ref()
            .ok_or_else(|| VerityError::Graph("Neo4j not connected".into()))
    }

    pub fn is_connected(&self) -> bool {
        self.graph.is_some()
    }

    /// Run a batch of write queries in one transaction.
    async fn write_batch(&self, label: &str, queries: Vec<Query>) -> Result<u64> {
        if queries.is_empty() {
            return Ok(0);
        }
        let count = queries.len() as u64;

        let mut txn = timed(self.graph()?.start_txn())
            .await?
            .map_err(|e| VerityError::Graph(format!("Failed to start transaction: {}", e)))?;

        for q in queries {
            timed(txn.run(q))
                .await?
                .map_err(|e| VerityError::Graph(format!("Failed to write {}: {}", label, e)))?;
        }

        timed(txn.commit())
            .await?
            .map_err(|e| VerityError::Graph(format!("Failed to commit {}: {}", label, e)))?;

        tracing::debug!(kind = label, count, "Merged graph batch");
        Ok(count)
    }

    async fn count(&self, cypher: &str) -> Result<u64> {
        let mut stream = timed(self.graph()?.execute(query(cypher)))
            .await?
            .map_err(|e| VerityError::Graph(format!("Failed to run count: {}", e)))?;

        match stream.next().await {
            Ok(Some(row)) => {
                let count: i64 = row
                    .get("cnt")
                    .map_err(|e| VerityError::Graph(format!("Failed to get count: {}", e)))?;
                Ok(count.max(0) as u64)
            }
            Ok(None) => Ok(0),
            Err(e) => Err(VerityError::Graph(format!("Error counting: {}", e))),
        }
    }
}

/// Wrap any async operation with a timeout, converting timeout to VerityError::Graph.
async fn timed<T, F: Future<Output = T>>(op: F) -> std::result::Result<T, VerityError> {
    tokio::time::timeout(std::time::Duration::from_secs(NEO4J_TIMEOUT_SECS), op)
        .await
        .map_err(|_| {
            tracing::warn!("Neo4j operation timed out after {}s", NEO4J_TIMEOUT_SECS);
            VerityError::Graph(format!(
                "Neo4j operation timed out after {}s",
                NEO4J_TIMEOUT_SECS
            ))
        })
}

fn rfc3339(dt: Option<chrono::DateTime<chrono::Utc>>) -> String {
    dt.map(|d| d.to_rfc3339()).unwrap_or_default()
}

fn article_query(a: &Article) -> Query {
    query(
        "MERGE (a:Article {id: $id}) \
         SET a.url = $url, a.title = $title, a.publisher = $publisher, \
             a.trust_score = $trust_score, a.published_date = $published_date, \
             a.is_reference = $is_reference",
    )
    .param("id", a.id)
    .param("url", a.url.clone())
    .param("title", a.title.clone().unwrap_or_default())
    .param("publisher", a.publisher.clone().unwrap_or_default())
    .param("trust_score", a.trust_score)
    .param("published_date", rfc3339(a.published_date))
    .param("is_reference", a.is_reference)
}

fn fact_query(f: &Fact) -> Query {
    let embedding: Vec<f64> = f
        .embedding
        .as_ref()
        .map(|e| e.iter().map(|x| *x as f64).collect())
        .unwrap_or_default();

    query(
        "MERGE (f:Fact {id: $id}) \
         SET f.statement = $statement, f.subject = $subject, f.predicate = $predicate, \
             f.object = $object, f.confidence = $confidence, f.embedding = $embedding, \
             f.article_id = $article_id, f.created_at = $created_at, \
             f.checked_at = $checked_at",
    )
    .param("id", f.id)
    .param("statement", f.statement())
    .param("subject", f.subject.clone())
    .param("predicate", f.predicate.clone())
    .param("object", f.object.clone())
    .param("confidence", f.confidence)
    .param("embedding", embedding)
    .param("article_id", f.article_id)
    .param("created_at", f.created_at.to_rfc3339())
    .param("checked_at", rfc3339(f.checked_at))
}

#[async_trait]
impl GraphStore for Neo4jGraphStore {
    async fn ping(&self) -> Result<()> {
        self.count("RETURN 1 AS cnt").await.map(|_| ())
    }

    async fn ensure_schema(&self) -> Result<()> {
        let graph = self.graph()?;
        for statement in SCHEMA {
            timed(graph.run(query(statement)))
                .await?
                .map_err(|e| VerityError::Graph(format!("Schema statement failed: {}", e)))?;
        }

        let vector_index = format!(
            "CREATE VECTOR INDEX fact_embedding IF NOT EXISTS FOR (f:Fact) ON (f.embedding) \
             OPTIONS {{indexConfig: {{`vector.dimensions`: {EMBEDDING_DIM}, \
             `vector.similarity_function`: 'cosine'}}}}"
        );
        timed(graph.run(query(&vector_index)))
            .await?
            .map_err(|e| VerityError::Graph(format!("Vector index creation failed: {}", e)))?;

        tracing::info!("Graph schema ensured");
        Ok(())
    }

    async fn merge_articles(&self, articles: &[Article]) -> Result<u64> {
        self.write_batch("articles", articles.iter().map(article_query).collect())
            .await
    }

    async fn merge_facts(&self, facts: &[Fact]) -> Result<u64> {
        self.write_batch("facts", facts.iter().map(fact_query).collect())
            .await
    }

    async fn merge_assertions(&self, assertions: &[Assertion]) -> Result<u64> {
        let queries = assertions
            .iter()
            .map(|a| {
                query(
                    "MATCH (a:Article {id: $article_id}) \
                     MATCH (f:Fact {id: $fact_id}) \
                     MERGE (a)-[:ASSERTED]->(f)",
                )
                .param("article_id", a.article_id)
                .param("fact_id", a.fact_id)
            })
            .collect();
        self.write_batch("assertions", queries).await
    }

    async fn merge_contradictions(&self, edges: &[ContradictionEdge]) -> Result<u64> {
        let queries = edges
            .iter()
            .map(|e| {
                query(
                    "MATCH (a:Fact {id: $id1}) \
                     MATCH (b:Fact {id: $id2}) \
                     MERGE (a)-[r:CONTRADICTS]->(b) \
                     SET r.score = $score, r.method = $method, r.detected_at = $detected_at",
                )
                .param("id1", e.fact_id_1)
                .param("id2", e.fact_id_2)
                .param("score", e.score)
                .param("method", e.method.clone())
                .param("detected_at", e.detected_at.to_rfc3339())
            })
            .collect();
        self.write_batch("contradictions", queries).await
    }

    async fn merge_similarities(&self, pairs: &[SimilarPair]) -> Result<u64> {
        let queries = pairs
            .iter()
            .map(|p| {
                query(
                    "MATCH (a:Fact {id: $id1}) \
                     MATCH (b:Fact {id: $id2}) \
                     MERGE (a)-[r:SIMILAR_TO]->(b) \
                     SET r.distance = $distance",
                )
                .param("id1", p.fact_id_1)
                .param("id2", p.fact_id_2)
                .param("distance", p.distance)
            })
            .collect();
        self.write_batch("similarities", queries).await
    }

    async fn merge_mentions(&self, mentions: &[Mention]) -> Result<u64> {
        let queries = mentions
            .iter()
            .map(|m| {
                query(
                    "MATCH (f:Fact {id: $fact_id}) \
                     MERGE (e:Entity {name: $name, type: $type}) \
                     MERGE (f)-[:MENTIONS]->(e)",
                )
                .param("fact_id", m.fact_id)
                .param("name", m.name.clone())
                .param("type", m.entity_type.clone())
            })
            .collect();
        self.write_batch("mentions", queries).await
    }

    async fn counts(&self) -> Result<GraphCounts> {
        Ok(GraphCounts {
            facts: self.count("MATCH (n:Fact) RETURN count(n) AS cnt").await?,
            articles: self.count("MATCH (n:Article) RETURN count(n) AS cnt").await?,
            entities: self.count("MATCH (n:Entity) RETURN count(n) AS cnt").await?,
            assertions: self
                .count("MATCH ()-[r:ASSERTED]->() RETURN count(r) AS cnt")
                .await?,
            contradictions: self
                .count("MATCH ()-[r:CONTRADICTS]->() RETURN count(r) AS cnt")
                .await?,
            similarities: self
                .count("MATCH ()-[r:SIMILAR_TO]->() RETURN count(r) AS cnt")
                .await?,
            mentions: self
                .count("MATCH ()-[r:MENTIONS]->() RETURN count(r) AS cnt")
                .await?,
        })
    }
}
