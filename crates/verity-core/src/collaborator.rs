use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::fact::FactCandidate;

/// Turns article text into atomic triples. An empty or unparseable answer
/// must come back as `Ok(vec![])`, not as an error.
#[async_trait]
pub trait FactExtractor: Send + Sync {
    async fn extract(&self, text: &str) -> Result<Vec<FactCandidate>>;
}

/// Sentence encoder. Failure is an error, never a placeholder vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityMention {
    pub text: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    pub start: usize,
    pub end: usize,
}

#[async_trait]
pub trait EntityRecognizer: Send + Sync {
    async fn recognize(&self, text: &str) -> Result<Vec<EntityMention>>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub url: String,
    pub title: Option<String>,
    /// Free-form date string as the search engine reports it.
    pub date: Option<String>,
    pub snippet: Option<String>,
}

impl SearchHit {
    /// Best-effort parse of the reported date; relative dates ("3 days ago") yield `None`.
    pub fn published_date(&self) -> Option<DateTime<Utc>> {
        let raw = self.date.as_deref()?.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        ["%Y-%m-%d", "%b %d, %Y", "%B %d, %Y", "%d %b %Y"]
            .iter()
            .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|naive| naive.and_utc())
    }
}

/// Ranked web search limited to pages indexed before `before`.
#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, query: &str, before: NaiveDate) -> Result<Vec<SearchHit>>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EntailmentScores {
    pub entailment: f64,
    pub neutral: f64,
    pub contradiction: f64,
}

#[async_trait]
pub trait EntailmentScorer: Send + Sync {
    async fn score(&self, premise: &str, hypothesis: &str) -> Result<EntailmentScores>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchedContent {
    pub text: String,
    pub published_date: Option<DateTime<Utc>>,
}

/// Fresh full text for a URL. `Ok(None)` when the page yields nothing usable.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Option<FetchedContent>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(date: Option<&str>) -> SearchHit {
        SearchHit {
            url: "https://example.org/a".into(),
            title: None,
            date: date.map(String::from),
            snippet: None,
        }
    }

    #[test]
    fn parses_common_search_dates() {
        let d = hit(Some("Mar 3, 2025")).published_date().unwrap();
        assert_eq!(d.date_naive(), NaiveDate::from_ymd_opt(2025, 3, 3).unwrap());

        let d = hit(Some("2024-11-20")).published_date().unwrap();
        assert_eq!(d.date_naive(), NaiveDate::from_ymd_opt(2024, 11, 20).unwrap());

        assert!(hit(Some("2 days ago")).published_date().is_none());
        assert!(hit(None).published_date().is_none());
    }
}
