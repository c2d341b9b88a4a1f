use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type ArticleId = i64;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Article {
    pub id: ArticleId,
    pub url: String,
    pub title: Option<String>,
    pub publisher: Option<String>,
    pub raw_text: Option<String>,
    pub trust_score: f64,
    pub published_date: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,
    pub is_reference: bool,
    pub created_at: DateTime<Utc>,
}

impl Article {
    /// Host of the article URL with any leading `www.` removed.
    pub fn domain(&self) -> Option<String> {
        domain_of(&self.url)
    }
}

pub fn domain_of(raw_url: &str) -> Option<String> {
    let parsed = url::Url::parse(raw_url).ok()?;
    let host = parsed.host_str()?;
    Some(host.trim_start_matches("www.").to_lowercase())
}

/// True when `host` is `domain` or one of its subdomains.
pub fn host_matches(host: &str, domain: &str) -> bool {
    host == domain
        || host
            .strip_suffix(domain)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

/// An external page found by the provenance search, stored as an article so the
/// graph can point at it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReferenceArticle {
    pub url: String,
    pub title: Option<String>,
    pub published_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueueStatus {
    Pending,
    Scraped,
    Classified,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Pending => "PENDING",
            QueueStatus::Scraped => "SCRAPED",
            QueueStatus::Classified => "CLASSIFIED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Some(QueueStatus::Pending),
            "SCRAPED" => Some(QueueStatus::Scraped),
            "CLASSIFIED" => Some(QueueStatus::Classified),
            _ => None,
        }
    }
}

/// Upstream work-queue row. Written by ingestion, scraping and classification;
/// this workspace only reads it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessingQueueEntry {
    pub article_id: ArticleId,
    pub status: QueueStatus,
    pub attempts: i32,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct QueueSummary {
    pub pending: u64,
    pub scraped: u64,
    pub classified: u64,
}

impl QueueSummary {
    pub fn add(&mut self, status: QueueStatus, count: u64) {
        match status {
            QueueStatus::Pending => self.pending += count,
            QueueStatus::Scraped => self.scraped += count,
            QueueStatus::Classified => self.classified += count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_strips_www() {
        assert_eq!(domain_of("https://www.Reuters.com/world/x"), Some("reuters.com".into()));
        assert_eq!(domain_of("http://apnews.com"), Some("apnews.com".into()));
        assert_eq!(domain_of("not a url"), None);
    }

    #[test]
    fn subdomains_match_their_parent() {
        assert!(host_matches("bbc.co.uk", "bbc.co.uk"));
        assert!(host_matches("news.bbc.co.uk", "bbc.co.uk"));
        assert!(!host_matches("notbbc.co.uk", "bbc.co.uk"));
    }

    #[test]
    fn queue_status_parse() {
        assert_eq!(QueueStatus::parse("scraped"), Some(QueueStatus::Scraped));
        assert_eq!(QueueStatus::parse("CLASSIFIED").map(|s| s.as_str()), Some("CLASSIFIED"));
        assert_eq!(QueueStatus::parse("done"), None);
    }
}
