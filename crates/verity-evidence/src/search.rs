use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use verity_core::collaborator::{SearchHit, WebSearch};
use verity_core::config::AppConfig;
use verity_core::error::{Result, VerityError};

const COLLABORATOR: &str = "search";
const SERPER_URL: &str = "https://google.serper.dev/search";

/// Google results via serper.dev, restricted with a `before:` operator.
pub struct SerperSearch {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
}

#[derive(Debug, Deserialize)]
struct OrganicResult {
    link: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    snippet: Option<String>,
}

impl SerperSearch {
    pub fn new(config: &AppConfig) -> Option<Self> {
        Some(Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            api_key: config.serper_api_key.clone()?,
            endpoint: SERPER_URL.to_string(),
        })
    }

    /// Point at a different endpoint, e.g. a local stub.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Exact-phrase query bounded by date.
    fn query(statement: &str, before: NaiveDate) -> String {
        let phrase = statement.replace('"', "");
        format!("\"{phrase}\" before:{}", before.format("%Y-%m-%d"))
    }

    /// A body without an `organic` array is malformed; an empty array is simply no hits.
    fn parse_hits(body: &Value) -> Result<Vec<SearchHit>> {
        let organic = body
            .get("organic")
            .and_then(Value::as_array)
            .ok_or_else(|| VerityError::malformed(COLLABORATOR, "response has no organic results array"))?;

        Ok(organic
            .iter()
            .filter_map(|item| serde_json::from_value::<OrganicResult>(item.clone()).ok())
            .filter(|r| !r.link.trim().is_empty())
            .map(|r| SearchHit {
                url: r.link,
                title: r.title,
                date: r.date,
                snippet: r.snippet,
            })
            .collect())
    }
}

#[async_trait]
impl WebSearch for SerperSearch {
    async fn search(&self, query: &str, before: NaiveDate) -> Result<Vec<SearchHit>> {
        let q = Self::query(query, before);
        let response = self
            .client
            .post(&self.endpoint)
            .header("X-API-KEY", &self.api_key)
            .json(&json!({ "q": q }))
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
        let hits = Self::parse_hits(&body)?;
        debug!(before = %before, hits = hits.len(), "Search completed");
        Ok(hits)
    }
}
