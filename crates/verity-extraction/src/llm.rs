use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use verity_core::collaborator::FactExtractor;
use verity_core::config::AppConfig;
use verity_core::error::{Result, VerityError};
use verity_core::fact::FactCandidate;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const MAX_TOKENS: u32 = 4096;
/// Longer articles are truncated before they are sent.
const MAX_INPUT_CHARS: usize = 80_000;
const COLLABORATOR: &str = "extraction";

/// Atomic fact extraction through the Anthropic Messages API.
pub struct AnthropicFactExtractor {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

// ── Anthropic Messages API request/response types ──────────────────────────

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    system: String,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: Option<String>,
}

// ── LLM output schema ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LlmOutput {
    Wrapped {
        #[serde(default)]
        facts: Vec<FactCandidate>,
    },
    Bare(Vec<FactCandidate>),
}

impl AnthropicFactExtractor {
    pub fn new(config: &AppConfig) -> Option<Self> {
        let api_key = config.anthropic_api_key.clone()?;
        Some(Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(60))
                .build()
                .unwrap_or_default(),
            api_key,
            model: config.extraction_model.clone(),
        })
    }

    fn build_system_prompt() -> String {
        r#"You are a precise knowledge graph extractor for a news fact-checking pipeline.

Extract strictly factual, atomic statements from the article text.

Rules:
1. ATOMIC: each fact is one standalone subject-predicate-object statement.
2. RESOLVE PRONOUNS: "He" -> "Donald Trump", "the company" -> "Apple Inc.".
3. DISAMBIGUATE ENTITIES: "Paris" -> "Paris, France" for the city, "Paris Hilton" for the person.
4. ACCURACY: only extract what the text explicitly states.

Return ONLY valid JSON (no markdown fences, no commentary) matching this schema:

{
  "facts": [
    {
      "subject": "Entity name (disambiguated)",
      "predicate": "action or relation",
      "object": "target or detail (disambiguated)",
      "confidence": 0.0 to 1.0
    }
  ]
}

If nothing factual can be extracted, return {"facts": []}."#
            .to_string()
    }

    fn build_user_prompt(text: &str) -> String {
        let truncated = match text.char_indices().nth(MAX_INPUT_CHARS) {
            Some((idx, _)) => &text[..idx],
            None => text,
        };
        format!("Article text:\n{truncated}")
    }

    async fn call_anthropic(&self, text: &str) -> Result<String> {
        let request = AnthropicRequest {
            model: self.model.clone(),
            max_tokens: MAX_TOKENS,
            temperature: 0.0,
            system: Self::build_system_prompt(),
            messages: vec![Message {
                role: "user".to_string(),
                content: Self::build_user_prompt(text),
            }],
        };

        tracing::debug!(
            model = %self.model,
            content_len = text.len(),
            "Sending extraction request to Anthropic API"
        );

        let response = self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read body>".to_string());
            return Err(VerityError::from_status(COLLABORATOR, status, &body));
        }

        let api_response: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| VerityError::malformed(COLLABORATOR, e.to_string()))?;

        let text = api_response
            .content
            .iter()
            .find_map(|block| {
                if block.block_type == "text" {
                    block.text.clone()
                } else {
                    None
                }
            })
            .unwrap_or_default();

        tracing::debug!(
            stop_reason = ?api_response.stop_reason,
            response_len = text.len(),
            "Received extraction response from Anthropic API"
        );

        Ok(text)
    }

    /// Parse model output. Anything unparseable is zero facts, not an error.
    fn parse_llm_response(raw: &str) -> Vec<FactCandidate> {
        // Strip markdown code fences the model may add despite instructions
        let cleaned = raw.trim();
        let cleaned = if cleaned.starts_with("```") {
            let start = cleaned.find(['{', '[']).unwrap_or(0);
            let end = cleaned
                .rfind(['}', ']'])
                .map(|i| i + 1)
                .unwrap_or(cleaned.len());
            if start < end {
                &cleaned[start..end]
            } else {
                cleaned
            }
        } else {
            cleaned
        };

        if cleaned.is_empty() {
            return Vec::new();
        }

        let facts = match serde_json::from_str::<LlmOutput>(cleaned) {
            Ok(LlmOutput::Wrapped { facts }) | Ok(LlmOutput::Bare(facts)) => facts,
            Err(e) => {
                tracing::warn!(error = %e, raw_len = cleaned.len(), "Unparseable extraction output, treating as no facts");
                return Vec::new();
            }
        };

        facts
            .into_iter()
            .map(|mut f| {
                f.confidence = f.confidence.clamp(0.0, 1.0);
                f
            })
            .collect()
    }
}

#[async_trait]
impl FactExtractor for AnthropicFactExtractor {
    async fn extract(&self, text: &str) -> Result<Vec<FactCandidate>> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        let raw = self.call_anthropic(text).await?;
        let facts = Self::parse_llm_response(&raw);
        tracing::info!(facts = facts.len(), "Extraction complete");
        Ok(facts)
    }
}
