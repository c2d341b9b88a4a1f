use std::sync::Arc;

use tracing::{info, warn};

use verity_core::{
    AppConfig, Capabilities, Collaborators, ContentFetcher, Embedder, EntailmentScorer,
    EntityRecognizer, FactExtractor, GraphStore, PipelineContext, Result, WebSearch,
};
use verity_evidence::{HfEntailment, SerperSearch};
use verity_extraction::{
    AnthropicFactExtractor, HfEmbedder, HfEntityRecognizer, HttpContentFetcher,
};
use verity_graph::Neo4jGraphStore;
use verity_store::PgFactStore;

/// HTTP collaborators for whatever the configuration has credentials for.
pub fn collaborators(config: &AppConfig) -> Collaborators {
    Collaborators {
        extractor: AnthropicFactExtractor::new(config).map(|c| Arc::new(c) as Arc<dyn FactExtractor>),
        embedder: HfEmbedder::new(config).map(|c| Arc::new(c) as Arc<dyn Embedder>),
        fetcher: HttpContentFetcher::new(config).map(|c| Arc::new(c) as Arc<dyn ContentFetcher>),
        entities: HfEntityRecognizer::new(config).map(|c| Arc::new(c) as Arc<dyn EntityRecognizer>),
        search: SerperSearch::new(config).map(|c| Arc::new(c) as Arc<dyn WebSearch>),
        entailment: HfEntailment::new(config).map(|c| Arc::new(c) as Arc<dyn EntailmentScorer>),
    }
}

/// Neo4j if configured and reachable. An unreachable graph degrades the
/// run instead of failing it.
pub async fn connect_graph(config: &AppConfig) -> Option<Arc<dyn GraphStore>> {
    let uri = config.neo4j_uri.as_deref()?;
    let store = Neo4jGraphStore::new(uri, &config.neo4j_user, &config.neo4j_password).await;
    if store.is_connected() {
        Some(Arc::new(store))
    } else {
        warn!(uri = %uri, "Graph store unreachable, continuing without it");
        None
    }
}

/// Build the context every stage runs against. Fails only when the
/// relational store is missing or unreachable.
pub async fn build_context(config: AppConfig) -> Result<PipelineContext> {
    let store = PgFactStore::connect(config.require_database_url()?).await?;
    store.migrate().await?;

    let graph = connect_graph(&config).await;
    let capabilities = Capabilities::resolve(&config);
    let collaborators = collaborators(&config);
    let ctx = PipelineContext::new(config, capabilities, Arc::new(store), graph, collaborators);

    let missing = ctx.capabilities.missing();
    if !missing.is_empty() {
        info!(degraded = ?missing, "Running with reduced capabilities");
    }
    Ok(ctx)
}

/// The archive database, when one is configured.
pub async fn connect_archive(config: &AppConfig) -> Result<Option<PgFactStore>> {
    let Some(url) = config.archive_database_url.as_deref() else {
        return Ok(None);
    };
    let archive = PgFactStore::connect(url).await?;
    archive.migrate().await?;
    Ok(Some(archive))
}
