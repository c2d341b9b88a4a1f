use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use verity_core::collaborator::Embedder;
use verity_core::config::AppConfig;
use verity_core::error::{Result, VerityError};
use verity_core::vector::{validate_embedding, EMBEDDING_DIM};

const COLLABORATOR: &str = "embedding";

/// Sentence embeddings (all-MiniLM-L6-v2, 384 dims) from the Hugging Face
/// feature-extraction endpoint.
pub struct HfEmbedder {
    client: reqwest::Client,
    url: String,
    token: String,
}

#[derive(Debug, Serialize)]
struct FeatureRequest<'a> {
    inputs: &'a str,
    options: FeatureOptions,
}

#[derive(Debug, Serialize)]
struct FeatureOptions {
    wait_for_model: bool,
}

impl HfEmbedder {
    pub fn new(config: &AppConfig) -> Option<Self> {
        let token = config.hf_token.clone()?;
        Some(Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            url: config.embedding_url.clone(),
            token,
        })
    }

    /// The endpoint answers either a pooled vector or one vector per token;
    /// token vectors are mean-pooled.
    fn parse_vector(body: &Value) -> Result<Vec<f32>> {
        let rows = match body {
            Value::Array(items) if items.iter().all(Value::is_number) => {
                return Ok(to_floats(items));
            }
            Value::Array(items) if items.len() == 1 && items[0].is_array() => {
                return Self::parse_vector(&items[0]);
            }
            Value::Array(items) => items,
            _ => {
                return Err(VerityError::malformed(
                    COLLABORATOR,
                    "expected a JSON array of floats",
                ))
            }
        };

        let vectors: Vec<Vec<f32>> = rows
            .iter()
            .filter_map(|row| row.as_array().map(|r| to_floats(r)))
            .collect();
        let Some(dim) = vectors.first().map(Vec::len) else {
            return Err(VerityError::malformed(COLLABORATOR, "empty embedding"));
        };
        if vectors.iter().any(|v| v.len() != dim) {
            return Err(VerityError::malformed(COLLABORATOR, "ragged token vectors"));
        }

        let mut pooled = vec![0.0f32; dim];
        for v in &vectors {
            for (acc, x) in pooled.iter_mut().zip(v) {
                *acc += x;
            }
        }
        let n = vectors.len() as f32;
        pooled.iter_mut().for_each(|x| *x /= n);
        Ok(pooled)
    }
}

fn to_floats(items: &[Value]) -> Vec<f32> {
    items
        .iter()
        .map(|v| v.as_f64().map(|f| f as f32).unwrap_or(f32::NAN))
        .collect()
}

#[async_trait]
impl Embedder for HfEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.token)
            .json(&FeatureRequest {
                inputs: text,
                options: FeatureOptions {
                    wait_for_model: true,
                },
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VerityError::from_status(COLLABORATOR, status, &body));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| VerityError::malformed(COLLABORATOR, e.to_string()))?;
        let vector = Self::parse_vector(&body)?;
        validate_embedding(&vector, EMBEDDING_DIM)?;

        tracing::debug!(dims = vector.len(), text_len = text.len(), "Embedded text");
        Ok(vector)
    }
}
