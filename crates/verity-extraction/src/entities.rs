use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use verity_core::collaborator::{EntityMention, EntityRecognizer};
use verity_core::config::AppConfig;
use verity_core::error::{Result, VerityError};

const COLLABORATOR: &str = "entities";
const MIN_SCORE: f64 = 0.5;

/// Named-entity recognition through a Hugging Face token-classification endpoint.
pub struct HfEntityRecognizer {
    client: reqwest::Client,
    url: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct TokenGroup {
    #[serde(alias = "entity")]
    entity_group: String,
    word: String,
    #[serde(default)]
    score: f64,
    #[serde(default)]
    start: usize,
    #[serde(default)]
    end: usize,
}

impl HfEntityRecognizer {
    pub fn new(config: &AppConfig) -> Option<Self> {
        Some(Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            url: config.ner_url.clone()?,
            token: config.hf_token.clone()?,
        })
    }

    /// Low-confidence groups are dropped and the rest deduplicated by
    /// lowercase text and type.
    fn to_mentions(groups: Vec<TokenGroup>) -> Vec<EntityMention> {
        let mut seen = std::collections::HashSet::new();
        groups
            .into_iter()
            .filter(|g| g.score >= MIN_SCORE)
            .filter_map(|g| {
                let text = g.word.trim().to_string();
                let entity_type = g
                    .entity_group
                    .strip_prefix("B-")
                    .or_else(|| g.entity_group.strip_prefix("I-"))
                    .unwrap_or(&g.entity_group)
                    .to_string();
                if text.is_empty() || !seen.insert((text.to_lowercase(), entity_type.clone())) {
                    return None;
                }
                Some(EntityMention {
                    text,
                    entity_type,
                    start: g.start,
                    end: g.end,
                })
            })
            .collect()
    }
}

#[async_trait]
impl EntityRecognizer for HfEntityRecognizer {
    async fn recognize(&self, text: &str) -> Result<Vec<EntityMention>> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.token)
            .json(&json!({
                "inputs": text,
                "parameters": { "aggregation_strategy": "simple" },
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VerityError::from_status(COLLABORATOR, status, &body));
        }

        let groups: Vec<TokenGroup> = response
            .json()
            .await
            .map_err(|e| VerityError::malformed(COLLABORATOR, e.to_string()))?;
        Ok(Self::to_mentions(groups))
    }
}
