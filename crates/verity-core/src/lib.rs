pub mod api_types;
pub mod article;
pub mod capability;
pub mod collaborator;
pub mod config;
pub mod context;
pub mod error;
pub mod fact;
pub mod graph;
pub mod retry;
pub mod store;
pub mod vector;

pub use article::{
    domain_of, host_matches, Article, ArticleId, ProcessingQueueEntry, QueueStatus, QueueSummary,
    ReferenceArticle,
};
pub use capability::{Capabilities, Capability};
pub use collaborator::{
    ContentFetcher, Embedder, EntailmentScorer, EntailmentScores, EntityMention,
    EntityRecognizer, FactExtractor, FetchedContent, SearchHit, WebSearch,
};
pub use config::{AppConfig, Thresholds};
pub use context::{Collaborators, PipelineContext};
pub use error::{Result, VerityError};
pub use fact::{
    ContradictionEdge, Fact, FactCandidate, FactId, NewFact, Resolution, SourcedFact,
};
pub use graph::{Assertion, GraphCounts, GraphStore, Mention};
pub use retry::{Backoff, RetryPolicy};
pub use store::{CandidateWindow, FactStore, Neighbor, SimilarPair, SyncState};
pub use vector::{cosine_distance, validate_embedding, EMBEDDING_DIM};
