use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use verity_core::store::{CandidateWindow, FactStore, Neighbor, SimilarPair, SyncState};
use verity_core::{
    cosine_distance, domain_of, host_matches, Article, ArticleId, ContradictionEdge, Fact,
    FactId, NewFact, QueueStatus, QueueSummary, ReferenceArticle, Resolution, Result,
    SourcedFact, VerityError,
};

#[derive(Default)]
struct State {
    next_article_id: ArticleId,
    next_fact_id: FactId,
    articles: BTreeMap<ArticleId, Article>,
    facts: BTreeMap<FactId, Fact>,
    contradictions: BTreeMap<(FactId, FactId), ContradictionEdge>,
    classified: BTreeSet<ArticleId>,
    queue: BTreeMap<ArticleId, QueueStatus>,
    sync: Option<SyncState>,
}

impl State {
    fn sourced(&self, fact: &Fact) -> SourcedFact {
        let article = self.articles.get(&fact.article_id);
        SourcedFact {
            fact: fact.clone(),
            published_date: article.and_then(|a| a.published_date),
            trust_score: article.map(|a| a.trust_score).unwrap_or(0.5),
        }
    }

    fn trust_of(&self, fact: &Fact) -> f64 {
        self.articles
            .get(&fact.article_id)
            .map(|a| a.trust_score)
            .unwrap_or(0.5)
    }
}

/// In-process [`FactStore`] with the same semantics as the PostgreSQL one.
/// Vector search is a linear scan.
#[derive(Default)]
pub struct MemoryFactStore {
    state: Mutex<State>,
}

impl MemoryFactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an article as ingestion would. Returns its id.
    pub async fn add_article(
        &self,
        url: &str,
        raw_text: Option<&str>,
        trust_score: f64,
        published_date: Option<DateTime<Utc>>,
    ) -> ArticleId {
        let mut state = self.state.lock().await;
        state.next_article_id += 1;
        let id = state.next_article_id;
        state.articles.insert(
            id,
            Article {
                id,
                url: url.to_string(),
                title: None,
                publisher: None,
                raw_text: raw_text.map(String::from),
                trust_score,
                published_date,
                processed_at: None,
                is_reference: false,
                created_at: Utc::now(),
            },
        );
        id
    }

    /// Attach a topic label, as the upstream classifier does.
    pub async fn classify_article(&self, id: ArticleId) {
        self.state.lock().await.classified.insert(id);
    }

    pub async fn set_queue_status(&self, id: ArticleId, status: QueueStatus) {
        self.state.lock().await.queue.insert(id, status);
    }

    pub async fn set_processed_at(&self, id: ArticleId, at: DateTime<Utc>) {
        if let Some(a) = self.state.lock().await.articles.get_mut(&id) {
            a.processed_at = Some(at);
        }
    }

    pub async fn set_fact_created_at(&self, id: FactId, at: DateTime<Utc>) {
        if let Some(f) = self.state.lock().await.facts.get_mut(&id) {
            f.created_at = at;
        }
    }

    pub async fn facts(&self) -> Vec<Fact> {
        self.state.lock().await.facts.values().cloned().collect()
    }

    pub async fn articles(&self) -> Vec<Article> {
        self.state.lock().await.articles.values().cloned().collect()
    }
}

#[async_trait]
impl FactStore for MemoryFactStore {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn unprocessed_articles(&self, limit: usize) -> Result<Vec<Article>> {
        let state = self.state.lock().await;
        let mut articles: Vec<Article> = state
            .articles
            .values()
            .filter(|a| a.processed_at.is_none() && !a.is_reference)
            .cloned()
            .collect();
        articles.sort_by_key(|a| (a.created_at, a.id));
        articles.truncate(limit);
        Ok(articles)
    }

    async fn get_article(&self, id: ArticleId) -> Result<Option<Article>> {
        Ok(self.state.lock().await.articles.get(&id).cloned())
    }

    async fn mark_article_processed(&self, id: ArticleId) -> Result<()> {
        if let Some(a) = self.state.lock().await.articles.get_mut(&id) {
            a.processed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn update_published_date(&self, id: ArticleId, date: DateTime<Utc>) -> Result<()> {
        if let Some(a) = self.state.lock().await.articles.get_mut(&id) {
            a.published_date = Some(date);
        }
        Ok(())
    }

    async fn upsert_reference_article(&self, reference: &ReferenceArticle) -> Result<ArticleId> {
        let mut state = self.state.lock().await;
        if let Some(existing) = state.articles.values().find(|a| a.url == reference.url) {
            return Ok(existing.id);
        }
        state.next_article_id += 1;
        let id = state.next_article_id;
        state.articles.insert(
            id,
            Article {
                id,
                url: reference.url.clone(),
                title: reference.title.clone(),
                publisher: None,
                raw_text: None,
                trust_score: 0.5,
                published_date: reference.published_date,
                processed_at: None,
                is_reference: true,
                created_at: Utc::now(),
            },
        );
        Ok(id)
    }

    async fn apply_trust_score(&self, domain: &str, score: f64) -> Result<u64> {
        let domain = domain.to_lowercase();
        let mut touched = 0;
        for article in self.state.lock().await.articles.values_mut() {
            if domain_of(&article.url).is_some_and(|host| host_matches(&host, &domain)) {
                article.trust_score = score;
                touched += 1;
            }
        }
        Ok(touched)
    }

    async fn insert_fact(&self, fact: &NewFact) -> Result<FactId> {
        let mut state = self.state.lock().await;
        if !state.articles.contains_key(&fact.article_id) {
            return Err(VerityError::Store(format!(
                "article {} does not exist",
                fact.article_id
            )));
        }
        state.next_fact_id += 1;
        let id = state.next_fact_id;
        state.facts.insert(
            id,
            Fact {
                id,
                article_id: fact.article_id,
                subject: fact.subject.clone(),
                predicate: fact.predicate.clone(),
                object: fact.object.clone(),
                confidence: fact.confidence,
                embedding: Some(fact.embedding.clone()),
                is_original: true,
                provenance_id: None,
                external_source_url: None,
                checked_at: None,
                created_at: Utc::now(),
            },
        );
        Ok(id)
    }

    async fn get_fact(&self, id: FactId) -> Result<Option<Fact>> {
        Ok(self.state.lock().await.facts.get(&id).cloned())
    }

    async fn nearest_fact(
        &self,
        embedding: &[f32],
        max_distance: f64,
    ) -> Result<Option<(FactId, f64)>> {
        let state = self.state.lock().await;
        let best = state
            .facts
            .values()
            .filter_map(|f| {
                let e = f.embedding.as_ref()?;
                Some((f.id, cosine_distance(embedding, e)))
            })
            .filter(|(_, d)| *d < max_distance)
            .min_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        Ok(best)
    }

    async fn neighbors(&self, fact: &Fact, max_distance: f64, limit: usize) -> Result<Vec<Neighbor>> {
        let Some(embedding) = fact.embedding.as_ref() else {
            return Ok(Vec::new());
        };
        let state = self.state.lock().await;
        let mut found: Vec<Neighbor> = state
            .facts
            .values()
            .filter(|f| f.id != fact.id)
            .filter_map(|f| {
                let d = cosine_distance(embedding, f.embedding.as_ref()?);
                (d < max_distance).then(|| Neighbor {
                    fact: state.sourced(f),
                    distance: d,
                })
            })
            .collect();
        found.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then(a.fact.fact.id.cmp(&b.fact.fact.id))
        });
        found.truncate(limit);
        Ok(found)
    }

    async fn unresolved_facts(&self, limit: usize) -> Result<Vec<SourcedFact>> {
        let state = self.state.lock().await;
        let mut facts: Vec<&Fact> = state
            .facts
            .values()
            .filter(|f| f.checked_at.is_none() && f.embedding.is_some())
            .collect();
        facts.sort_by_key(|f| (f.created_at, f.id));
        Ok(facts.into_iter().take(limit).map(|f| state.sourced(f)).collect())
    }

    async fn record_resolution(&self, id: FactId, resolution: &Resolution) -> Result<()> {
        let mut state = self.state.lock().await;
        let fact = state
            .facts
            .get_mut(&id)
            .ok_or_else(|| VerityError::NotFound(format!("fact {id}")))?;
        fact.is_original = resolution.is_original();
        fact.provenance_id = resolution.provenance_id();
        fact.external_source_url = resolution.external_source_url().map(String::from);
        fact.checked_at = Some(Utc::now());
        Ok(())
    }

    async fn baseline_facts(
        &self,
        min_trust: f64,
        matured_before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Fact>> {
        let state = self.state.lock().await;
        let mut facts: Vec<(f64, &Fact)> = state
            .facts
            .values()
            .filter(|f| f.is_publishable() && f.embedding.is_some())
            .filter(|f| f.created_at < matured_before)
            .map(|f| (state.trust_of(f), f))
            .filter(|(trust, _)| *trust >= min_trust)
            .collect();
        facts.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.id.cmp(&b.1.id)));
        Ok(facts.into_iter().take(limit).map(|(_, f)| f.clone()).collect())
    }

    async fn candidate_facts(&self, window: CandidateWindow) -> Result<Vec<Fact>> {
        let state = self.state.lock().await;
        Ok(state
            .facts
            .values()
            .filter(|f| f.embedding.is_some())
            .filter(|f| match window {
                CandidateWindow::Since { since } => f.is_original && f.created_at >= since,
                CandidateWindow::Backfill => f.is_publishable(),
            })
            .cloned()
            .collect())
    }

    async fn upsert_contradiction(&self, edge: &ContradictionEdge) -> Result<()> {
        let key = edge.key();
        if key.0 == key.1 {
            return Err(VerityError::DataIntegrity(format!(
                "fact {} cannot contradict itself",
                key.0
            )));
        }
        self.state
            .lock()
            .await
            .contradictions
            .insert(key, edge.clone());
        Ok(())
    }

    async fn contradictions(&self) -> Result<Vec<ContradictionEdge>> {
        Ok(self
            .state
            .lock()
            .await
            .contradictions
            .values()
            .cloned()
            .collect())
    }

    async fn checked_facts(&self) -> Result<Vec<Fact>> {
        Ok(self
            .state
            .lock()
            .await
            .facts
            .values()
            .filter(|f| f.checked_at.is_some())
            .cloned()
            .collect())
    }

    async fn publishable_articles(&self) -> Result<Vec<Article>> {
        let state = self.state.lock().await;
        Ok(state
            .articles
            .values()
            .filter(|a| {
                a.is_reference || (a.processed_at.is_some() && state.classified.contains(&a.id))
            })
            .map(|a| Article {
                raw_text: None,
                ..a.clone()
            })
            .collect())
    }

    async fn similar_pairs(&self, max_distance: f64) -> Result<Vec<SimilarPair>> {
        let state = self.state.lock().await;
        let published: Vec<(&FactId, &Vec<f32>)> = state
            .facts
            .iter()
            .filter(|(_, f)| f.is_publishable())
            .filter_map(|(id, f)| Some((id, f.embedding.as_ref()?)))
            .collect();

        let mut pairs = Vec::new();
        for (i, (a_id, a_emb)) in published.iter().enumerate() {
            for (b_id, b_emb) in &published[i + 1..] {
                let distance = cosine_distance(a_emb, b_emb);
                if distance < max_distance {
                    pairs.push(SimilarPair {
                        fact_id_1: **a_id,
                        fact_id_2: **b_id,
                        distance,
                    });
                }
            }
        }
        Ok(pairs)
    }

    async fn last_sync(&self) -> Result<Option<SyncState>> {
        Ok(self.state.lock().await.sync.clone())
    }

    async fn record_sync_digest(&self, digest: &str) -> Result<()> {
        self.state.lock().await.sync = Some(SyncState {
            digest: digest.to_string(),
            synced_at: Utc::now(),
        });
        Ok(())
    }

    async fn archivable_articles(
        &self,
        processed_before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Article>> {
        let state = self.state.lock().await;
        Ok(state
            .articles
            .values()
            .filter(|a| {
                !a.is_reference
                    && a.raw_text.is_some()
                    && a.processed_at.is_some_and(|p| p < processed_before)
            })
            .take(limit)
            .cloned()
            .collect())
    }

    async fn articles_with_facts(&self, ids: &[ArticleId]) -> Result<Vec<ArticleId>> {
        let state = self.state.lock().await;
        let owners: BTreeSet<ArticleId> = state.facts.values().map(|f| f.article_id).collect();
        let mut hit: Vec<ArticleId> = ids.iter().copied().filter(|id| owners.contains(id)).collect();
        hit.sort_unstable();
        hit.dedup();
        Ok(hit)
    }

    async fn archive_articles(&self, articles: &[Article]) -> Result<u64> {
        let mut state = self.state.lock().await;
        let mut inserted = 0;
        for article in articles {
            let url_taken = state.articles.values().any(|a| a.url == article.url);
            if state.articles.contains_key(&article.id) || url_taken {
                continue;
            }
            state.next_article_id = state.next_article_id.max(article.id);
            state.articles.insert(article.id, article.clone());
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn delete_articles(&self, ids: &[ArticleId]) -> Result<u64> {
        let mut state = self.state.lock().await;
        let mut deleted = 0;
        for id in ids {
            if state.facts.values().any(|f| f.article_id == *id) {
                return Err(VerityError::Store(format!(
                    "article {id} still owns facts"
                )));
            }
            if state.articles.remove(id).is_some() {
                state.classified.remove(id);
                state.queue.remove(id);
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn clear_raw_text(&self, ids: &[ArticleId]) -> Result<u64> {
        let mut state = self.state.lock().await;
        let mut cleared = 0;
        for id in ids {
            if let Some(a) = state.articles.get_mut(id) {
                if a.raw_text.take().is_some() {
                    cleared += 1;
                }
            }
        }
        Ok(cleared)
    }

    async fn queue_summary(&self) -> Result<QueueSummary> {
        let state = self.state.lock().await;
        let mut summary = QueueSummary::default();
        for status in state.queue.values() {
            summary.add(*status, 1);
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(axis: usize) -> Vec<f32> {
        let mut v = vec![0.0; 384];
        v[axis] = 1.0;
        v
    }

    fn new_fact(article_id: ArticleId, embedding: Vec<f32>) -> NewFact {
        NewFact {
            article_id,
            subject: "Japan".into(),
            predicate: "was hit by".into(),
            object: "an earthquake".into(),
            confidence: 0.9,
            embedding,
        }
    }

    #[tokio::test]
    async fn reference_articles_are_reused_by_url() {
        let store = MemoryFactStore::new();
        let reference = ReferenceArticle {
            url: "https://archive.example/quake".into(),
            title: Some("Quake".into()),
            published_date: None,
        };
        let a = store.upsert_reference_article(&reference).await.unwrap();
        let b = store.upsert_reference_article(&reference).await.unwrap();
        assert_eq!(a, b);
        assert!(store.get_article(a).await.unwrap().unwrap().is_reference);
    }

    #[tokio::test]
    async fn unprocessed_articles_include_bodyless_but_not_references() {
        let store = MemoryFactStore::new();
        let bodyless = store.add_article("https://a.example/1", None, 0.5, None).await;
        let processed = store.add_article("https://a.example/2", Some("t"), 0.5, None).await;
        store.mark_article_processed(processed).await.unwrap();
        store
            .upsert_reference_article(&ReferenceArticle {
                url: "https://archive.example/x".into(),
                title: None,
                published_date: None,
            })
            .await
            .unwrap();

        let queued: Vec<_> = store
            .unprocessed_articles(10)
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.id)
            .collect();
        assert_eq!(queued, vec![bodyless]);
    }

    #[tokio::test]
    async fn nearest_fact_respects_threshold() {
        let store = MemoryFactStore::new();
        let article = store.add_article("https://a.example/1", Some("t"), 0.9, None).await;
        store.insert_fact(&new_fact(article, unit(0))).await.unwrap();

        assert!(store.nearest_fact(&unit(0), 0.05).await.unwrap().is_some());
        assert!(store.nearest_fact(&unit(1), 0.05).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn trust_score_matches_domain_and_subdomains() {
        let store = MemoryFactStore::new();
        store.add_article("https://www.reuters.com/a", None, 0.5, None).await;
        store.add_article("https://uk.reuters.com/b", None, 0.5, None).await;
        store.add_article("https://notreuters.com/c", None, 0.5, None).await;

        let touched = store.apply_trust_score("reuters.com", 0.9).await.unwrap();
        assert_eq!(touched, 2);
    }

    #[tokio::test]
    async fn resolution_stamps_checked_at() {
        let store = MemoryFactStore::new();
        let article = store.add_article("https://a.example/1", Some("t"), 0.9, None).await;
        let id = store.insert_fact(&new_fact(article, unit(0))).await.unwrap();
        assert_eq!(store.unresolved_facts(10).await.unwrap().len(), 1);

        store.record_resolution(id, &Resolution::Original).await.unwrap();
        assert!(store.unresolved_facts(10).await.unwrap().is_empty());
        assert!(store.get_fact(id).await.unwrap().unwrap().is_publishable());
    }
}
