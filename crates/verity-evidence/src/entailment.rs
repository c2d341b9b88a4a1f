use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use verity_core::collaborator::{EntailmentScorer, EntailmentScores};
use verity_core::config::AppConfig;
use verity_core::error::{Result, VerityError};

const COLLABORATOR: &str = "entailment";

/// MNLI-style sequence classifier behind a Hugging Face inference endpoint.
/// Premise and hypothesis are joined with the RoBERTa pair separator.
pub struct HfEntailment {
    client: reqwest::Client,
    url: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct LabelScore {
    label: String,
    score: f64,
}

impl HfEntailment {
    pub fn new(config: &AppConfig) -> Option<Self> {
        let token = config.hf_token.clone()?;
        Some(Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            url: config.entailment_url.clone(),
            token,
        })
    }

    fn input(premise: &str, hypothesis: &str) -> String {
        format!("{premise} </s></s> {hypothesis}")
    }

    /// Accepts `[{label, score}]` and the batched `[[{label, score}]]`.
    /// Labels are matched case-insensitively; `LABEL_n` follows the head order
    /// of the default SNLI/MNLI/ANLI model (entailment, neutral, contradiction).
    fn parse_scores(body: Value) -> Result<EntailmentScores> {
        let items = match body {
            Value::Array(mut outer) if matches!(outer.first(), Some(Value::Array(_))) => {
                outer.swap_remove(0)
            }
            other => other,
        };
        let labels: Vec<LabelScore> = serde_json::from_value(items)
            .map_err(|e| VerityError::malformed(COLLABORATOR, e.to_string()))?;

        let mut scores = EntailmentScores::default();
        let mut saw_contradiction = false;
        for item in labels {
            match item.label.to_lowercase().as_str() {
                "contradiction" | "label_2" => {
                    scores.contradiction = item.score;
                    saw_contradiction = true;
                }
                "neutral" | "label_1" => scores.neutral = item.score,
                "entailment" | "label_0" => scores.entailment = item.score,
                _ => {}
            }
        }
        if !saw_contradiction {
            return Err(VerityError::malformed(COLLABORATOR, "no contradiction label in response"));
        }
        Ok(scores)
    }
}

#[async_trait]
impl EntailmentScorer for HfEntailment {
    async fn score(&self, premise: &str, hypothesis: &str) -> Result<EntailmentScores> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.token)
            .json(&json!({ "inputs": Self::input(premise, hypothesis) }))
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
        Self::parse_scores(body)
    }
}
