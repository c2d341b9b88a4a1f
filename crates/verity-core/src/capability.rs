use serde::{Deserialize, Serialize};

use crate::config::AppConfig;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Extraction,
    Embedding,
    ContentFetch,
    Entities,
    Search,
    Entailment,
    Graph,
    Archive,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Extraction => "extraction",
            Capability::Embedding => "embedding",
            Capability::ContentFetch => "content_fetch",
            Capability::Entities => "entities",
            Capability::Search => "search",
            Capability::Entailment => "entailment",
            Capability::Graph => "graph",
            Capability::Archive => "archive",
        }
    }
}

/// Which optional collaborators this deployment has. Resolved once at startup
/// and handed to every stage; stages never probe for collaborators themselves.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Capabilities {
    pub extraction: bool,
    pub embedding: bool,
    pub content_fetch: bool,
    pub entities: bool,
    pub search: bool,
    pub entailment: bool,
    pub graph: bool,
    pub archive: bool,
}

impl Capabilities {
    pub fn resolve(config: &AppConfig) -> Self {
        Self {
            extraction: config.anthropic_api_key.is_some(),
            embedding: config.hf_token.is_some(),
            content_fetch: config.content_service_url.is_some(),
            entities: config.ner_url.is_some() && config.hf_token.is_some(),
            search: config.serper_api_key.is_some(),
            entailment: config.hf_token.is_some(),
            graph: config.neo4j_uri.is_some(),
            archive: config.archive_database_url.is_some(),
        }
    }

    /// Everything enabled; used by tests wiring in-memory collaborators.
    pub fn all() -> Self {
        Self {
            extraction: true,
            embedding: true,
            content_fetch: true,
            entities: true,
            search: true,
            entailment: true,
            graph: true,
            archive: true,
        }
    }

    pub fn has(&self, capability: Capability) -> bool {
        match capability {
            Capability::Extraction => self.extraction,
            Capability::Embedding => self.embedding,
            Capability::ContentFetch => self.content_fetch,
            Capability::Entities => self.entities,
            Capability::Search => self.search,
            Capability::Entailment => self.entailment,
            Capability::Graph => self.graph,
            Capability::Archive => self.archive,
        }
    }

    pub fn without(mut self, capability: Capability) -> Self {
        match capability {
            Capability::Extraction => self.extraction = false,
            Capability::Embedding => self.embedding = false,
            Capability::ContentFetch => self.content_fetch = false,
            Capability::Entities => self.entities = false,
            Capability::Search => self.search = false,
            Capability::Entailment => self.entailment = false,
            Capability::Graph => self.graph = false,
            Capability::Archive => self.archive = false,
        }
        self
    }

    pub fn missing(&self) -> Vec<Capability> {
        [
            Capability::Extraction,
            Capability::Embedding,
            Capability::ContentFetch,
            Capability::Entities,
            Capability::Search,
            Capability::Entailment,
            Capability::Graph,
            Capability::Archive,
        ]
        .into_iter()
        .filter(|c| !self.has(*c))
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn without_clears_one_flag() {
        let caps = Capabilities::all().without(Capability::Search);
        assert!(!caps.has(Capability::Search));
        assert!(caps.has(Capability::Graph));
        assert_eq!(caps.missing(), vec![Capability::Search]);
    }
}
