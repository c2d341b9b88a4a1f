use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use verity_core::collaborator::{ContentFetcher, FetchedContent};
use verity_core::config::AppConfig;
use verity_core::error::{Result, VerityError};

const COLLABORATOR: &str = "content";

/// Client for the article-extraction service: POST `{url}` and get back the
/// cleaned body text plus whatever publication date the page declares.
pub struct HttpContentFetcher {
    client: reqwest::Client,
    endpoint: String,
}

#[derive(Debug, Serialize)]
struct FetchRequest<'a> {
    url: &'a str,
}

#[derive(Debug, Deserialize)]
struct FetchResponse {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    date: Option<String>,
}

impl HttpContentFetcher {
    pub fn new(config: &AppConfig) -> Option<Self> {
        Some(Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            endpoint: config.content_service_url.clone()?,
        })
    }
}

/// Accepts RFC 3339 timestamps and bare `YYYY-MM-DD` dates.
fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[async_trait]
impl ContentFetcher for HttpContentFetcher {
    async fn fetch(&self, url: &str) -> Result<Option<FetchedContent>> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&FetchRequest { url })
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND || status == reqwest::StatusCode::NO_CONTENT {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VerityError::from_status(COLLABORATOR, status, &body));
        }

        let body: FetchResponse = response
            .json()
            .await
            .map_err(|e| VerityError::malformed(COLLABORATOR, e.to_string()))?;

        let Some(text) = body.text.filter(|t| !t.trim().is_empty()) else {
            tracing::debug!(url = %url, "Content service returned no text");
            return Ok(None);
        };
        let published_date = body.date.as_deref().and_then(parse_date);
        tracing::debug!(url = %url, chars = text.len(), dated = published_date.is_some(), "Fetched article content");

        Ok(Some(FetchedContent {
            text,
            published_date,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_service_dates() {
        assert!(parse_date("2025-01-07").is_some());
        assert!(parse_date("2025-01-07T08:30:00+09:00").is_some());
        assert!(parse_date("last Tuesday").is_none());
    }
}
