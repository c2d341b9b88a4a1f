use std::sync::Arc;

use crate::capability::{Capabilities, Capability};
use crate::collaborator::{
    ContentFetcher, Embedder, EntailmentScorer, EntityRecognizer, FactExtractor, WebSearch,
};
use crate::config::AppConfig;
use crate::error::{Result, VerityError};
use crate::graph::GraphStore;
use crate::store::FactStore;

/// Optional collaborators. A `None` here and the matching capability flag
/// being off mean the same thing.
#[derive(Clone, Default)]
pub struct Collaborators {
    pub extractor: Option<Arc<dyn FactExtractor>>,
    pub embedder: Option<Arc<dyn Embedder>>,
    pub fetcher: Option<Arc<dyn ContentFetcher>>,
    pub entities: Option<Arc<dyn EntityRecognizer>>,
    pub search: Option<Arc<dyn WebSearch>>,
    pub entailment: Option<Arc<dyn EntailmentScorer>>,
}

/// Everything a stage needs, built once per process and passed by reference.
#[derive(Clone)]
pub struct PipelineContext {
    pub config: AppConfig,
    pub capabilities: Capabilities,
    pub store: Arc<dyn FactStore>,
    pub graph: Option<Arc<dyn GraphStore>>,
    pub collaborators: Collaborators,
}

impl PipelineContext {
    /// Capabilities are narrowed to what was actually wired in.
    pub fn new(
        config: AppConfig,
        capabilities: Capabilities,
        store: Arc<dyn FactStore>,
        graph: Option<Arc<dyn GraphStore>>,
        collaborators: Collaborators,
    ) -> Self {
        let mut caps = capabilities;
        let wired = [
            (Capability::Extraction, collaborators.extractor.is_some()),
            (Capability::Embedding, collaborators.embedder.is_some()),
            (Capability::ContentFetch, collaborators.fetcher.is_some()),
            (Capability::Entities, collaborators.entities.is_some()),
            (Capability::Search, collaborators.search.is_some()),
            (Capability::Entailment, collaborators.entailment.is_some()),
            (Capability::Graph, graph.is_some()),
        ];
        for (capability, present) in wired {
            if !present {
                caps = caps.without(capability);
            }
        }

        Self {
            config,
            capabilities: caps,
            store,
            graph,
            collaborators,
        }
    }

    pub fn has(&self, capability: Capability) -> bool {
        self.capabilities.has(capability)
    }

    pub fn extractor(&self) -> Result<&Arc<dyn FactExtractor>> {
        self.collaborators
            .extractor
            .as_ref()
            .ok_or_else(|| missing(Capability::Extraction))
    }

    pub fn embedder(&self) -> Result<&Arc<dyn Embedder>> {
        self.collaborators
            .embedder
            .as_ref()
            .ok_or_else(|| missing(Capability::Embedding))
    }

    pub fn entailment(&self) -> Result<&Arc<dyn EntailmentScorer>> {
        self.collaborators
            .entailment
            .as_ref()
            .ok_or_else(|| missing(Capability::Entailment))
    }

    /// Fetcher, only if the capability is on.
    pub fn fetcher(&self) -> Option<&Arc<dyn ContentFetcher>> {
        self.collaborators
            .fetcher
            .as_ref()
            .filter(|_| self.has(Capability::ContentFetch))
    }

    pub fn search(&self) -> Option<&Arc<dyn WebSearch>> {
        self.collaborators
            .search
            .as_ref()
            .filter(|_| self.has(Capability::Search))
    }

    pub fn entities(&self) -> Option<&Arc<dyn EntityRecognizer>> {
        self.collaborators
            .entities
            .as_ref()
            .filter(|_| self.has(Capability::Entities))
    }

    pub fn graph(&self) -> Option<&Arc<dyn GraphStore>> {
        self.graph.as_ref().filter(|_| self.has(Capability::Graph))
    }
}

fn missing(capability: Capability) -> VerityError {
    VerityError::Config(format!("{} collaborator is not configured", capability.as_str()))
}
