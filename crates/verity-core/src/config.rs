use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VerityError};
use crate::retry::RetryPolicy;

pub const DEFAULT_EMBEDDING_URL: &str = "https://router.huggingface.co/hf-inference/models/sentence-transformers/all-MiniLM-L6-v2/pipeline/feature-extraction";
pub const DEFAULT_ENTAILMENT_URL: &str = "https://router.huggingface.co/hf-inference/models/ynie/roberta-large-snli_mnli_fever_anli_R1_R2_R3-nli";
pub const DEFAULT_EXTRACTION_MODEL: &str = "claude-haiku-4-5-20251001";

/// Tunables for the fact pipeline. Distances are pgvector cosine distances.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Thresholds {
    /// Below this a new candidate is a duplicate of a stored fact (>95% similar).
    pub dedup_distance: f64,
    /// Neighbors closer than this are considered the same claim for provenance.
    pub provenance_distance: f64,
    pub provenance_neighbor_limit: usize,
    pub contradiction_score: f64,
    pub baseline_min_trust: f64,
    pub maturation_days: i64,
    pub recency_hours: i64,
    /// Pairs closer than this restate each other; not worth an entailment call.
    pub prune_min_distance: f64,
    /// Pairs farther than this talk about different things.
    pub prune_max_distance: f64,
    pub extraction_batch: usize,
    pub provenance_batch: usize,
    pub baseline_limit: usize,
    pub archive_retention_days: i64,
    pub archive_batch: usize,
    /// Attempts per collaborator call, first call included.
    pub retry_attempts: u32,
    /// First backoff delay; doubles after each failed attempt.
    pub retry_base_delay_ms: u64,
}

impl Thresholds {
    pub fn collaborator_retry(&self) -> RetryPolicy {
        RetryPolicy::exponential(
            self.retry_attempts,
            Duration::from_millis(self.retry_base_delay_ms),
        )
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            dedup_distance: 0.05,
            provenance_distance: 0.15,
            provenance_neighbor_limit: 10,
            contradiction_score: 0.7,
            baseline_min_trust: 0.8,
            maturation_days: 7,
            recency_hours: 24,
            prune_min_distance: 0.05,
            prune_max_distance: 0.6,
            extraction_batch: 10,
            provenance_batch: 50,
            baseline_limit: 500,
            archive_retention_days: 90,
            archive_batch: 1000,
            retry_attempts: 3,
            retry_base_delay_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub archive_database_url: Option<String>,
    pub neo4j_uri: Option<String>,
    pub neo4j_user: String,
    pub neo4j_password: String,
    pub anthropic_api_key: Option<String>,
    pub extraction_model: String,
    pub hf_token: Option<String>,
    pub embedding_url: String,
    pub entailment_url: String,
    pub ner_url: Option<String>,
    pub serper_api_key: Option<String>,
    pub content_service_url: Option<String>,
    pub trusted_sources_path: PathBuf,
    pub orchestrator_host: String,
    pub orchestrator_port: u16,
    pub stage_bin: Option<PathBuf>,
    pub ingest_tasks: Vec<String>,
    pub tick_secs: u64,
    pub thresholds: Thresholds,
}

impl AppConfig {
    /// Load `.env` if present, then read the process environment.
    pub fn from_env() -> Self {
        if let Err(e) = dotenvy::dotenv() {
            tracing::debug!(error = %e, "No .env file loaded, using process environment");
        }

        let mut thresholds = Thresholds::default();
        if let Some(hours) = env_parse("CONTRADICTION_WINDOW_HOURS") {
            thresholds.recency_hours = hours;
        }
        if let Some(batch) = env_parse("EXTRACTION_BATCH_SIZE") {
            thresholds.extraction_batch = batch;
        }
        if let Some(batch) = env_parse("PROVENANCE_BATCH_SIZE") {
            thresholds.provenance_batch = batch;
        }

        Self {
            database_url: env_opt("DATABASE_URL"),
            archive_database_url: env_opt("ARCHIVE_DATABASE_URL"),
            neo4j_uri: env_opt("NEO4J_URI"),
            neo4j_user: std::env::var("NEO4J_USER").unwrap_or_else(|_| "neo4j".into()),
            neo4j_password: std::env::var("NEO4J_PASSWORD").unwrap_or_default(),
            anthropic_api_key: env_opt("ANTHROPIC_API_KEY"),
            extraction_model: std::env::var("EXTRACTION_MODEL")
                .unwrap_or_else(|_| DEFAULT_EXTRACTION_MODEL.into()),
            hf_token: env_opt("HF_TOKEN"),
            embedding_url: std::env::var("EMBEDDING_URL")
                .unwrap_or_else(|_| DEFAULT_EMBEDDING_URL.into()),
            entailment_url: std::env::var("ENTAILMENT_URL")
                .unwrap_or_else(|_| DEFAULT_ENTAILMENT_URL.into()),
            ner_url: env_opt("NER_URL"),
            serper_api_key: env_opt("SERPER_API_KEY"),
            content_service_url: env_opt("CONTENT_SERVICE_URL"),
            trusted_sources_path: std::env::var("TRUSTED_SOURCES_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data/trusted_sources.json")),
            orchestrator_host: std::env::var("ORCHESTRATOR_HOST")
                .unwrap_or_else(|_| "0.0.0.0".into()),
            orchestrator_port: env_parse("ORCHESTRATOR_PORT").unwrap_or(8090),
            stage_bin: env_opt("VERITY_STAGE_BIN").map(PathBuf::from),
            ingest_tasks: std::env::var("VERITY_INGEST_TASKS")
                .map(|v| {
                    v.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            tick_secs: env_parse("VERITY_TICK_SECS").unwrap_or(30),
            thresholds,
        }
    }

    /// The relational store is the one dependency no stage can run without.
    pub fn require_database_url(&self) -> Result<&str> {
        self.database_url
            .as_deref()
            .ok_or_else(|| VerityError::Config("DATABASE_URL is not set".into()))
    }

    /// Names of the variables a fully featured deployment expects but are unset.
    pub fn missing_env(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.database_url.is_none() {
            missing.push("DATABASE_URL");
        }
        if self.neo4j_uri.is_none() {
            missing.push("NEO4J_URI");
        }
        if self.neo4j_password.is_empty() {
            missing.push("NEO4J_PASSWORD");
        }
        if self.anthropic_api_key.is_none() {
            missing.push("ANTHROPIC_API_KEY");
        }
        if self.hf_token.is_none() {
            missing.push("HF_TOKEN");
        }
        missing
    }
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
