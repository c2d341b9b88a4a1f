use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pgvector::Vector;
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool};
use tracing::{debug, info};

use verity_core::store::{CandidateWindow, FactStore, Neighbor, SimilarPair, SyncState};
use verity_core::{
    Article, ArticleId, ContradictionEdge, Fact, FactId, NewFact, QueueStatus, QueueSummary,
    ReferenceArticle, Resolution, Result, SourcedFact, VerityError,
};

const SYNC_STATE_KEY: &str = "publish";

const ARTICLE_COLUMNS: &str = "a.id, a.url, a.title, a.publisher, a.raw_text, a.trust_score, \
     a.published_date, a.processed_at, a.is_reference, a.created_at";

/// Same shape as `ARTICLE_COLUMNS` without pulling article bodies over the wire.
const ARTICLE_META_COLUMNS: &str = "a.id, a.url, a.title, a.publisher, NULL::TEXT AS raw_text, \
     a.trust_score, a.published_date, a.processed_at, a.is_reference, a.created_at";

const FACT_COLUMNS: &str = "f.id, f.article_id, f.subject, f.predicate, f.object, f.confidence, \
     f.embedding, f.is_original, f.provenance_id, f.external_source_url, f.checked_at, \
     f.created_at";

/// Host of `a.url`, lowercased, `www.` stripped.
const HOST_EXPR: &str =
    "lower(substring(a.url from '^[A-Za-z][A-Za-z0-9+.-]*://(?:www\\.)?([^/:?#]+)'))";

#[derive(Debug, FromRow)]
struct ArticleRow {
    id: i64,
    url: String,
    title: Option<String>,
    publisher: Option<String>,
    raw_text: Option<String>,
    trust_score: f64,
    published_date: Option<DateTime<Utc>>,
    processed_at: Option<DateTime<Utc>>,
    is_reference: bool,
    created_at: DateTime<Utc>,
}

impl From<ArticleRow> for Article {
    fn from(r: ArticleRow) -> Self {
        Article {
            id: r.id,
            url: r.url,
            title: r.title,
            publisher: r.publisher,
            raw_text: r.raw_text,
            trust_score: r.trust_score,
            published_date: r.published_date,
            processed_at: r.processed_at,
            is_reference: r.is_reference,
            created_at: r.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct FactRow {
    id: i64,
    article_id: i64,
    subject: String,
    predicate: String,
    object: String,
    confidence: f64,
    embedding: Option<Vector>,
    is_original: bool,
    provenance_id: Option<i64>,
    external_source_url: Option<String>,
    checked_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl From<FactRow> for Fact {
    fn from(r: FactRow) -> Self {
        Fact {
            id: r.id,
            article_id: r.article_id,
            subject: r.subject,
            predicate: r.predicate,
            object: r.object,
            confidence: r.confidence,
            embedding: r.embedding.map(|v| v.to_vec()),
            is_original: r.is_original,
            provenance_id: r.provenance_id,
            external_source_url: r.external_source_url,
            checked_at: r.checked_at,
            created_at: r.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct SourcedFactRow {
    #[sqlx(flatten)]
    fact: FactRow,
    published_date: Option<DateTime<Utc>>,
    trust_score: f64,
}

impl From<SourcedFactRow> for SourcedFact {
    fn from(r: SourcedFactRow) -> Self {
        SourcedFact {
            fact: r.fact.into(),
            published_date: r.published_date,
            trust_score: r.trust_score,
        }
    }
}

#[derive(Debug, FromRow)]
struct NeighborRow {
    #[sqlx(flatten)]
    sourced: SourcedFactRow,
    distance: f64,
}

#[derive(Debug, FromRow)]
struct ContradictionRow {
    fact1_id: i64,
    fact2_id: i64,
    score: f64,
    method: String,
    detected_at: DateTime<Utc>,
}

fn store_err(context: &str) -> impl Fn(sqlx::Error) -> VerityError + '_ {
    move |e| VerityError::Store(format!("{context}: {e}"))
}

fn limit(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

/// PostgreSQL + pgvector implementation of [`FactStore`].
///
/// Queries are runtime-checked (`sqlx::query_as`), so building the crate
/// needs no live database. Every call borrows a pooled connection for its
/// own duration only.
#[derive(Clone)]
pub struct PgFactStore {
    pool: PgPool,
}

impl PgFactStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(std::time::Duration::from_secs(10))
            .connect(database_url)
            .await
            .map_err(|e| VerityError::Config(format!("cannot reach relational store: {e}")))?;

        info!("Connected to PostgreSQL");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply the embedded schema migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| VerityError::Store(format!("migration failed: {e}")))?;
        debug!("Schema migrations applied");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn fetch_sourced(&self, sql: &str, n: usize) -> Result<Vec<SourcedFact>> {
        let rows = sqlx::query_as::<_, SourcedFactRow>(sql)
            .bind(limit(n))
            .fetch_all(&self.pool)
            .await
            .map_err(store_err("fetch facts"))?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[async_trait]
impl FactStore for PgFactStore {
    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(store_err("ping"))?;
        Ok(())
    }

    async fn unprocessed_articles(&self, n: usize) -> Result<Vec<Article>> {
        let sql = format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles a \
             WHERE a.processed_at IS NULL AND NOT a.is_reference \
             ORDER BY a.created_at, a.id LIMIT $1"
        );
        let rows = sqlx::query_as::<_, ArticleRow>(&sql)
            .bind(limit(n))
            .fetch_all(&self.pool)
            .await
            .map_err(store_err("fetch unprocessed articles"))?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn get_article(&self, id: ArticleId) -> Result<Option<Article>> {
        let sql = format!("SELECT {ARTICLE_COLUMNS} FROM articles a WHERE a.id = $1");
        let row = sqlx::query_as::<_, ArticleRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err("get article"))?;
        Ok(row.map(Into::into))
    }

    async fn mark_article_processed(&self, id: ArticleId) -> Result<()> {
        sqlx::query("UPDATE articles SET processed_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(store_err("mark article processed"))?;
        Ok(())
    }

    async fn update_published_date(&self, id: ArticleId, date: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE articles SET published_date = $2 WHERE id = $1")
            .bind(id)
            .bind(date)
            .execute(&self.pool)
            .await
            .map_err(store_err("update published date"))?;
        Ok(())
    }

    async fn upsert_reference_article(&self, reference: &ReferenceArticle) -> Result<ArticleId> {
        // The no-op update makes RETURNING yield the existing row on conflict.
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO articles (url, title, published_date, is_reference, trust_score) \
             VALUES ($1, $2, $3, TRUE, 0.5) \
             ON CONFLICT (url) DO UPDATE SET url = EXCLUDED.url \
             RETURNING id",
        )
        .bind(&reference.url)
        .bind(&reference.title)
        .bind(reference.published_date)
        .fetch_one(&self.pool)
        .await
        .map_err(store_err("upsert reference article"))?;
        Ok(id)
    }

    async fn apply_trust_score(&self, domain: &str, score: f64) -> Result<u64> {
        let sql = format!(
            "UPDATE articles a SET trust_score = $2 \
             WHERE {HOST_EXPR} = $1 OR {HOST_EXPR} LIKE '%.' || $1"
        );
        let result = sqlx::query(&sql)
            .bind(domain.to_lowercase())
            .bind(score)
            .execute(&self.pool)
            .await
            .map_err(store_err("apply trust score"))?;
        Ok(result.rows_affected())
    }

    async fn insert_fact(&self, fact: &NewFact) -> Result<FactId> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO extracted_facts \
             (article_id, subject, predicate, object, confidence, embedding) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING id",
        )
        .bind(fact.article_id)
        .bind(&fact.subject)
        .bind(&fact.predicate)
        .bind(&fact.object)
        .bind(fact.confidence)
        .bind(Vector::from(fact.embedding.clone()))
        .fetch_one(&self.pool)
        .await
        .map_err(store_err("insert fact"))?;
        Ok(id)
    }

    async fn get_fact(&self, id: FactId) -> Result<Option<Fact>> {
        let sql = format!("SELECT {FACT_COLUMNS} FROM extracted_facts f WHERE f.id = $1");
        let row = sqlx::query_as::<_, FactRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err("get fact"))?;
        Ok(row.map(Into::into))
    }

    async fn nearest_fact(
        &self,
        embedding: &[f32],
        max_distance: f64,
    ) -> Result<Option<(FactId, f64)>> {
        let row: Option<(i64, f64)> = sqlx::query_as(
            "SELECT f.id, (f.embedding <=> $1) AS distance FROM extracted_facts f \
             WHERE f.embedding IS NOT NULL AND (f.embedding <=> $1) < $2 \
             ORDER BY distance ASC, f.id ASC LIMIT 1",
        )
        .bind(Vector::from(embedding.to_vec()))
        .bind(max_distance)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err("nearest fact"))?;
        Ok(row)
    }

    async fn neighbors(
        &self,
        fact: &Fact,
        max_distance: f64,
        n: usize,
    ) -> Result<Vec<Neighbor>> {
        let Some(embedding) = fact.embedding.as_ref() else {
            return Ok(Vec::new());
        };
        let sql = format!(
            "SELECT {FACT_COLUMNS}, a.published_date, a.trust_score, \
             (f.embedding <=> $1) AS distance \
             FROM extracted_facts f JOIN articles a ON a.id = f.article_id \
             WHERE f.id <> $2 AND f.embedding IS NOT NULL AND (f.embedding <=> $1) < $3 \
             ORDER BY distance ASC, f.id ASC LIMIT $4"
        );
        let rows = sqlx::query_as::<_, NeighborRow>(&sql)
            .bind(Vector::from(embedding.clone()))
            .bind(fact.id)
            .bind(max_distance)
            .bind(limit(n))
            .fetch_all(&self.pool)
            .await
            .map_err(store_err("fact neighbors"))?;
        Ok(rows
            .into_iter()
            .map(|r| Neighbor {
                fact: r.sourced.into(),
                distance: r.distance,
            })
            .collect())
    }

    async fn unresolved_facts(&self, n: usize) -> Result<Vec<SourcedFact>> {
        let sql = format!(
            "SELECT {FACT_COLUMNS}, a.published_date, a.trust_score \
             FROM extracted_facts f JOIN articles a ON a.id = f.article_id \
             WHERE f.checked_at IS NULL AND f.embedding IS NOT NULL \
             ORDER BY f.created_at ASC, f.id ASC LIMIT $1"
        );
        self.fetch_sourced(&sql, n).await
    }

    async fn record_resolution(&self, id: FactId, resolution: &Resolution) -> Result<()> {
        let result = sqlx::query(
            "UPDATE extracted_facts \
             SET is_original = $2, provenance_id = $3, external_source_url = $4, \
                 checked_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(resolution.is_original())
        .bind(resolution.provenance_id())
        .bind(resolution.external_source_url())
        .execute(&self.pool)
        .await
        .map_err(store_err("record resolution"))?;

        if result.rows_affected() == 0 {
            return Err(VerityError::NotFound(format!("fact {id}")));
        }
        Ok(())
    }

    async fn baseline_facts(
        &self,
        min_trust: f64,
        matured_before: DateTime<Utc>,
        n: usize,
    ) -> Result<Vec<Fact>> {
        let sql = format!(
            "SELECT {FACT_COLUMNS} FROM extracted_facts f JOIN articles a ON a.id = f.article_id \
             WHERE f.is_original AND f.checked_at IS NOT NULL AND f.embedding IS NOT NULL \
             AND a.trust_score >= $1 AND f.created_at < $2 \
             ORDER BY a.trust_score DESC, f.id ASC LIMIT $3"
        );
        let rows = sqlx::query_as::<_, FactRow>(&sql)
            .bind(min_trust)
            .bind(matured_before)
            .bind(limit(n))
            .fetch_all(&self.pool)
            .await
            .map_err(store_err("baseline facts"))?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn candidate_facts(&self, window: CandidateWindow) -> Result<Vec<Fact>> {
        let rows = match window {
            CandidateWindow::Since { since } => {
                let sql = format!(
                    "SELECT {FACT_COLUMNS} FROM extracted_facts f \
                     WHERE f.embedding IS NOT NULL AND f.is_original \
                     AND f.created_at >= $1 ORDER BY f.id"
                );
                sqlx::query_as::<_, FactRow>(&sql)
                    .bind(since)
                    .fetch_all(&self.pool)
                    .await
            }
            CandidateWindow::Backfill => {
                let sql = format!(
                    "SELECT {FACT_COLUMNS} FROM extracted_facts f \
                     WHERE f.embedding IS NOT NULL AND f.is_original \
                     AND f.checked_at IS NOT NULL ORDER BY f.id"
                );
                sqlx::query_as::<_, FactRow>(&sql).fetch_all(&self.pool).await
            }
        }
        .map_err(store_err("candidate facts"))?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn upsert_contradiction(&self, edge: &ContradictionEdge) -> Result<()> {
        let (a, b) = edge.key();
        if a == b {
            return Err(VerityError::DataIntegrity(format!(
                "fact {a} cannot contradict itself"
            )));
        }
        sqlx::query(
            "INSERT INTO contradiction_relationships \
             (fact1_id, fact2_id, score, method, detected_at) VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (fact1_id, fact2_id) DO UPDATE \
             SET score = EXCLUDED.score, method = EXCLUDED.method, \
                 detected_at = EXCLUDED.detected_at",
        )
        .bind(a)
        .bind(b)
        .bind(edge.score)
        .bind(&edge.method)
        .bind(edge.detected_at)
        .execute(&self.pool)
        .await
        .map_err(store_err("upsert contradiction"))?;
        Ok(())
    }

    async fn contradictions(&self) -> Result<Vec<ContradictionEdge>> {
        let rows = sqlx::query_as::<_, ContradictionRow>(
            "SELECT fact1_id, fact2_id, score, method, detected_at \
             FROM contradiction_relationships ORDER BY fact1_id, fact2_id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(store_err("list contradictions"))?;
        Ok(rows
            .into_iter()
            .map(|r| ContradictionEdge {
                fact_id_1: r.fact1_id,
                fact_id_2: r.fact2_id,
                score: r.score,
                detected_at: r.detected_at,
                method: r.method,
            })
            .collect())
    }

    async fn checked_facts(&self) -> Result<Vec<Fact>> {
        let sql = format!(
            "SELECT {FACT_COLUMNS} FROM extracted_facts f \
             WHERE f.checked_at IS NOT NULL ORDER BY f.id"
        );
        let rows = sqlx::query_as::<_, FactRow>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(store_err("checked facts"))?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn publishable_articles(&self) -> Result<Vec<Article>> {
        let sql = format!(
            "SELECT {ARTICLE_META_COLUMNS} FROM articles a \
             WHERE a.is_reference \
             OR (a.processed_at IS NOT NULL \
                 AND EXISTS (SELECT 1 FROM article_topics t WHERE t.article_id = a.id)) \
             ORDER BY a.id"
        );
        let rows = sqlx::query_as::<_, ArticleRow>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(store_err("publishable articles"))?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn similar_pairs(&self, max_distance: f64) -> Result<Vec<SimilarPair>> {
        let rows: Vec<(i64, i64, f64)> = sqlx::query_as(
            "SELECT f1.id, f2.id, (f1.embedding <=> f2.embedding) AS distance \
             FROM extracted_facts f1 JOIN extracted_facts f2 ON f1.id < f2.id \
             WHERE f1.is_original AND f1.checked_at IS NOT NULL AND f1.embedding IS NOT NULL \
             AND f2.is_original AND f2.checked_at IS NOT NULL AND f2.embedding IS NOT NULL \
             AND (f1.embedding <=> f2.embedding) < $1 \
             ORDER BY f1.id, f2.id",
        )
        .bind(max_distance)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err("similar pairs"))?;
        Ok(rows
            .into_iter()
            .map(|(fact_id_1, fact_id_2, distance)| SimilarPair {
                fact_id_1,
                fact_id_2,
                distance,
            })
            .collect())
    }

    async fn last_sync(&self) -> Result<Option<SyncState>> {
        let row: Option<(String, DateTime<Utc>)> =
            sqlx::query_as("SELECT digest, synced_at FROM graph_sync_state WHERE name = $1")
                .bind(SYNC_STATE_KEY)
                .fetch_optional(&self.pool)
                .await
                .map_err(store_err("read sync state"))?;
        Ok(row.map(|(digest, synced_at)| SyncState { digest, synced_at }))
    }

    async fn record_sync_digest(&self, digest: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO graph_sync_state (name, digest, synced_at) VALUES ($1, $2, NOW()) \
             ON CONFLICT (name) DO UPDATE SET digest = EXCLUDED.digest, synced_at = NOW()",
        )
        .bind(SYNC_STATE_KEY)
        .bind(digest)
        .execute(&self.pool)
        .await
        .map_err(store_err("record sync digest"))?;
        Ok(())
    }

    async fn archivable_articles(
        &self,
        processed_before: DateTime<Utc>,
        n: usize,
    ) -> Result<Vec<Article>> {
        let sql = format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles a \
             WHERE a.processed_at IS NOT NULL AND a.processed_at < $1 \
             AND NOT a.is_reference AND a.raw_text IS NOT NULL \
             ORDER BY a.id LIMIT $2"
        );
        let rows = sqlx::query_as::<_, ArticleRow>(&sql)
            .bind(processed_before)
            .bind(limit(n))
            .fetch_all(&self.pool)
            .await
            .map_err(store_err("archivable articles"))?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn articles_with_facts(&self, ids: &[ArticleId]) -> Result<Vec<ArticleId>> {
        sqlx::query_scalar(
            "SELECT DISTINCT article_id FROM extracted_facts \
             WHERE article_id = ANY($1) ORDER BY article_id",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err("articles with facts"))
    }

    async fn archive_articles(&self, articles: &[Article]) -> Result<u64> {
        let mut tx = self.pool.begin().await.map_err(store_err("begin archive"))?;
        let mut inserted = 0;
        for a in articles {
            let result = sqlx::query(
                "INSERT INTO articles (id, url, title, publisher, raw_text, trust_score, \
                 published_date, processed_at, is_reference, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
                 ON CONFLICT DO NOTHING",
            )
            .bind(a.id)
            .bind(&a.url)
            .bind(&a.title)
            .bind(&a.publisher)
            .bind(&a.raw_text)
            .bind(a.trust_score)
            .bind(a.published_date)
            .bind(a.processed_at)
            .bind(a.is_reference)
            .bind(a.created_at)
            .execute(&mut *tx)
            .await
            .map_err(store_err("archive article"))?;
            inserted += result.rows_affected();
        }
        tx.commit().await.map_err(store_err("commit archive"))?;
        Ok(inserted)
    }

    async fn delete_articles(&self, ids: &[ArticleId]) -> Result<u64> {
        let result = sqlx::query("DELETE FROM articles WHERE id = ANY($1)")
            .bind(ids)
            .execute(&self.pool)
            .await
            .map_err(store_err("delete articles"))?;
        Ok(result.rows_affected())
    }

    async fn clear_raw_text(&self, ids: &[ArticleId]) -> Result<u64> {
        let result = sqlx::query("UPDATE articles SET raw_text = NULL WHERE id = ANY($1)")
            .bind(ids)
            .execute(&self.pool)
            .await
            .map_err(store_err("clear article text"))?;
        Ok(result.rows_affected())
    }

    async fn queue_summary(&self) -> Result<QueueSummary> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM processing_queue GROUP BY status")
                .fetch_all(&self.pool)
                .await
                .map_err(store_err("queue summary"))?;

        let mut summary = QueueSummary::default();
        for (status, count) in rows {
            match QueueStatus::parse(&status) {
                Some(s) => summary.add(s, count.max(0) as u64),
                None => debug!(status = %status, count, "Ignoring unknown queue status"),
            }
        }
        Ok(summary)
    }
}
