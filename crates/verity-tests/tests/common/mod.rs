#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};

use verity_core::{
    AppConfig, ArticleId, Capabilities, Collaborators, ContentFetcher, Embedder,
    EntailmentScorer, EntailmentScores, EntityMention, EntityRecognizer, FactCandidate,
    FactExtractor, FactId, FactStore, FetchedContent, GraphStore, NewFact, PipelineContext, Resolution, Result, SearchHit, Thresholds,
    VerityError, WebSearch, EMBEDDING_DIM,
};
use verity_graph::MemoryGraph;
use verity_store::MemoryFactStore;

// ---------------------------------------------------------------------------
// Vectors
// ---------------------------------------------------------------------------

pub fn axis(i: usize) -> Vec<f32> {
    let mut v = vec![0.0; EMBEDDING_DIM];
    v[i] = 1.0;
    v
}

/// Unit vector at cosine distance `distance` from `axis(from)`, leaning toward `axis(toward)`.
pub fn near(from: usize, toward: usize, distance: f64) -> Vec<f32> {
    let cos = 1.0 - distance;
    let sin = (1.0 - cos * cos).max(0.0).sqrt();
    let mut v = vec![0.0; EMBEDDING_DIM];
    v[from] = cos as f32;
    v[toward] = sin as f32;
    v
}

/// Unit vector in the plane of axes 0 and 1, `degrees` away from axis 0.
pub fn at_angle(degrees: f64) -> Vec<f32> {
    let rad = degrees.to_radians();
    let mut v = vec![0.0; EMBEDDING_DIM];
    v[0] = rad.cos() as f32;
    v[1] = rad.sin() as f32;
    v
}

pub fn day(d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, d, 9, 0, 0).unwrap()
}

// ---------------------------------------------------------------------------
// Scripted collaborators
// ---------------------------------------------------------------------------

/// Returns a fixed candidate list per article text; unknown text yields nothing.
#[derive(Default)]
pub struct ScriptedExtractor {
    answers: Mutex<HashMap<String, Vec<FactCandidate>>>,
    failing: Mutex<HashSet<String>>,
    pub calls: AtomicUsize,
}

impl ScriptedExtractor {
    pub fn answer(&self, text: &str, candidates: Vec<FactCandidate>) {
        self.answers.lock().unwrap().insert(text.to_string(), candidates);
    }

    pub fn fail_on(&self, text: &str) {
        self.failing.lock().unwrap().insert(text.to_string());
    }
}

#[async_trait]
impl FactExtractor for ScriptedExtractor {
    async fn extract(&self, text: &str) -> Result<Vec<FactCandidate>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.lock().unwrap().contains(text) {
            return Err(VerityError::collaborator("extraction", "status 400: bad request"));
        }
        Ok(self.answers.lock().unwrap().get(text).cloned().unwrap_or_default())
    }
}

/// Pinned vectors per statement. Anything else gets a fresh orthogonal axis.
pub struct KeyedEmbedder {
    pinned: Mutex<HashMap<String, Vec<f32>>>,
    next_axis: AtomicUsize,
    pub calls: AtomicUsize,
}

impl Default for KeyedEmbedder {
    fn default() -> Self {
        Self {
            pinned: Mutex::new(HashMap::new()),
            next_axis: AtomicUsize::new(100),
            calls: AtomicUsize::new(0),
        }
    }
}

impl KeyedEmbedder {
    pub fn pin(&self, statement: &str, vector: Vec<f32>) {
        self.pinned.lock().unwrap().insert(statement.to_string(), vector);
    }
}

#[async_trait]
impl Embedder for KeyedEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut pinned = self.pinned.lock().unwrap();
        if let Some(v) = pinned.get(text) {
            return Ok(v.clone());
        }
        let v = axis(self.next_axis.fetch_add(1, Ordering::SeqCst) % EMBEDDING_DIM);
        pinned.insert(text.to_string(), v.clone());
        Ok(v)
    }
}

#[derive(Debug, Clone)]
pub enum PageScript {
    Page(FetchedContent),
    Empty,
    Down,
}

/// Fresh page content per URL. Unlisted URLs yield nothing.
#[derive(Default)]
pub struct ScriptedFetcher {
    pages: Mutex<HashMap<String, PageScript>>,
    pub calls: AtomicUsize,
}

impl ScriptedFetcher {
    pub fn page(&self, url: &str, text: &str, published: Option<DateTime<Utc>>) {
        self.script(
            url,
            PageScript::Page(FetchedContent {
                text: text.to_string(),
                published_date: published,
            }),
        );
    }

    pub fn script(&self, url: &str, script: PageScript) {
        self.pages.lock().unwrap().insert(url.to_string(), script);
    }
}

#[async_trait]
impl ContentFetcher for ScriptedFetcher {
    async fn fetch(&self, url: &str) -> Result<Option<FetchedContent>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.pages.lock().unwrap().get(url).cloned() {
            Some(PageScript::Page(content)) => Ok(Some(content)),
            Some(PageScript::Down) => Err(VerityError::transient("content", "status 503")),
            Some(PageScript::Empty) | None => Ok(None),
        }
    }
}

#[derive(Debug, Clone)]
pub enum SearchScript {
    Hits(Vec<SearchHit>),
    Transient,
    Malformed,
    Rejected,
}

pub struct ScriptedSearch {
    script: Mutex<SearchScript>,
    pub calls: AtomicUsize,
}

impl ScriptedSearch {
    pub fn new(script: SearchScript) -> Self {
        Self {
            script: Mutex::new(script),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set(&self, script: SearchScript) {
        *self.script.lock().unwrap() = script;
    }
}

pub fn hit(url: &str, date: Option<&str>) -> SearchHit {
    SearchHit {
        url: url.to_string(),
        title: Some("Archived report".to_string()),
        date: date.map(String::from),
        snippet: None,
    }
}

#[async_trait]
impl WebSearch for ScriptedSearch {
    async fn search(&self, _query: &str, _before: NaiveDate) -> Result<Vec<SearchHit>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.script.lock().unwrap().clone() {
            SearchScript::Hits(hits) => Ok(hits),
            SearchScript::Transient => Err(VerityError::transient("search", "status 429: slow down")),
            SearchScript::Malformed => Err(VerityError::malformed("search", "no organic results")),
            SearchScript::Rejected => Err(VerityError::collaborator("search", "status 400: bad query")),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum PairScript {
    Score(f64),
    Transient,
    Permanent,
}

/// Contradiction score per (premise, hypothesis); unlisted pairs score 0.05.
#[derive(Default)]
pub struct ScriptedEntailment {
    pairs: Mutex<HashMap<(String, String), PairScript>>,
    pub calls: AtomicUsize,
}

impl ScriptedEntailment {
    pub fn script(&self, premise: &str, hypothesis: &str, script: PairScript) {
        self.pairs
            .lock()
            .unwrap()
            .insert((premise.to_string(), hypothesis.to_string()), script);
    }
}

#[async_trait]
impl EntailmentScorer for ScriptedEntailment {
    async fn score(&self, premise: &str, hypothesis: &str) -> Result<EntailmentScores> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let script = self
            .pairs
            .lock()
            .unwrap()
            .get(&(premise.to_string(), hypothesis.to_string()))
            .copied()
            .unwrap_or(PairScript::Score(0.05));
        match script {
            PairScript::Score(contradiction) => Ok(EntailmentScores {
                entailment: (1.0 - contradiction) / 2.0,
                neutral: (1.0 - contradiction) / 2.0,
                contradiction,
            }),
            PairScript::Transient => Err(VerityError::transient("entailment", "status 503")),
            PairScript::Permanent => Err(VerityError::collaborator("entailment", "status 401")),
        }
    }
}

/// Tags the first word of every statement as an entity.
#[derive(Default)]
pub struct FirstWordEntities {
    pub failing: AtomicBool,
    pub calls: AtomicUsize,
}

#[async_trait]
impl EntityRecognizer for FirstWordEntities {
    async fn recognize(&self, text: &str) -> Result<Vec<EntityMention>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(VerityError::transient("entities", "status 503"));
        }
        let word = text.split_whitespace().next().unwrap_or_default();
        Ok(vec![EntityMention {
            text: word.to_string(),
            entity_type: "LOC".to_string(),
            start: 0,
            end: word.len(),
        }])
    }
}

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

pub fn test_config() -> AppConfig {
    let mut config = AppConfig::from_env();
    config.thresholds = Thresholds {
        retry_base_delay_ms: 0,
        ..Thresholds::default()
    };
    config
}

/// In-memory world with every collaborator scripted.
pub struct World {
    pub store: Arc<MemoryFactStore>,
    pub graph: Arc<MemoryGraph>,
    pub extractor: Arc<ScriptedExtractor>,
    pub embedder: Arc<KeyedEmbedder>,
    pub fetcher: Arc<ScriptedFetcher>,
    pub search: Arc<ScriptedSearch>,
    pub entailment: Arc<ScriptedEntailment>,
    pub entities: Arc<FirstWordEntities>,
    pub config: AppConfig,
}

impl World {
    pub fn new() -> Self {
        Self {
            store: Arc::new(MemoryFactStore::new()),
            graph: Arc::new(MemoryGraph::new()),
            extractor: Arc::new(ScriptedExtractor::default()),
            embedder: Arc::new(KeyedEmbedder::default()),
            fetcher: Arc::new(ScriptedFetcher::default()),
            search: Arc::new(ScriptedSearch::new(SearchScript::Hits(Vec::new()))),
            entailment: Arc::new(ScriptedEntailment::default()),
            entities: Arc::new(FirstWordEntities::default()),
            config: test_config(),
        }
    }

    /// Everything wired in.
    pub fn context(&self) -> PipelineContext {
        self.context_with(Capabilities::all())
    }

    /// Only the collaborators `capabilities` allows.
    pub fn context_with(&self, capabilities: Capabilities) -> PipelineContext {
        let collaborators = Collaborators {
            extractor: Some(self.extractor.clone() as Arc<dyn FactExtractor>),
            embedder: Some(self.embedder.clone() as Arc<dyn Embedder>),
            fetcher: Some(self.fetcher.clone() as Arc<dyn ContentFetcher>),
            entities: Some(self.entities.clone() as Arc<dyn EntityRecognizer>),
            search: Some(self.search.clone() as Arc<dyn WebSearch>),
            entailment: Some(self.entailment.clone() as Arc<dyn EntailmentScorer>),
        };
        PipelineContext::new(
            self.config.clone(),
            capabilities,
            self.store.clone() as Arc<dyn FactStore>,
            Some(self.graph.clone() as Arc<dyn GraphStore>),
            collaborators,
        )
    }

    /// Insert a fact directly, bypassing extraction.
    pub async fn fact(&self, article_id: ArticleId, subject: &str, embedding: Vec<f32>) -> FactId {
        self.store
            .insert_fact(&NewFact {
                article_id,
                subject: subject.to_string(),
                predicate: "reported".to_string(),
                object: "an earthquake".to_string(),
                confidence: 0.9,
                embedding,
            })
            .await
            .expect("insert fact")
    }

    /// Insert a fact and mark it as a checked original.
    pub async fn original(&self, article_id: ArticleId, subject: &str, embedding: Vec<f32>) -> FactId {
        let id = self.fact(article_id, subject, embedding).await;
        self.store
            .record_resolution(id, &Resolution::Original)
            .await
            .expect("record resolution");
        id
    }
}
