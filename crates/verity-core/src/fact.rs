use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::article::ArticleId;

pub type FactId = i64;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Fact {
    pub id: FactId,
    pub article_id: ArticleId,
    pub subject: String,
    pub predicate: String,
    pub object: String,
    pub confidence: f64,
    pub embedding: Option<Vec<f32>>,
    pub is_original: bool,
    pub provenance_id: Option<FactId>,
    pub external_source_url: Option<String>,
    pub checked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Fact {
    pub fn statement(&self) -> String {
        statement(&self.subject, &self.predicate, &self.object)
    }

    /// Publication gate 1.
    pub fn is_publishable(&self) -> bool {
        self.is_original && self.checked_at.is_some()
    }

    /// `(created_at, id)` ordering used to decide which of two facts came first.
    pub fn precedes(&self, other: &Fact) -> bool {
        (self.created_at, self.id) < (other.created_at, other.id)
    }
}

pub fn statement(subject: &str, predicate: &str, object: &str) -> String {
    format!("{} {} {}", subject.trim(), predicate.trim(), object.trim())
}

/// A raw (subject, predicate, object) tuple as returned by the extraction collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FactCandidate {
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub predicate: String,
    #[serde(default)]
    pub object: String,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

fn default_confidence() -> f64 {
    0.5
}

impl FactCandidate {
    pub fn new(subject: &str, predicate: &str, object: &str, confidence: f64) -> Self {
        Self {
            subject: subject.to_string(),
            predicate: predicate.to_string(),
            object: object.to_string(),
            confidence,
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.subject.trim().is_empty()
            && !self.predicate.trim().is_empty()
            && !self.object.trim().is_empty()
    }

    pub fn statement(&self) -> String {
        statement(&self.subject, &self.predicate, &self.object)
    }
}

/// Row to insert into `extracted_facts`. Embedding is mandatory: candidates
/// without a valid vector never reach the store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewFact {
    pub article_id: ArticleId,
    pub subject: String,
    pub predicate: String,
    pub object: String,
    pub confidence: f64,
    pub embedding: Vec<f32>,
}

/// A fact joined with the fields of its source article that the provenance
/// and contradiction stages need.
#[derive(Debug, Clone, PartialEq)]
pub struct SourcedFact {
    pub fact: Fact,
    pub published_date: Option<DateTime<Utc>>,
    pub trust_score: f64,
}

impl SourcedFact {
    /// Date used for originality comparisons. Falls back to the fact's
    /// insertion time when the article carries no publication date.
    pub fn effective_date(&self) -> DateTime<Utc> {
        self.published_date.unwrap_or(self.fact.created_at)
    }
}

/// Final state written by the provenance resolver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Resolution {
    Original,
    EchoOf { root: FactId },
    External { url: String },
}

impl Resolution {
    pub fn is_original(&self) -> bool {
        matches!(self, Resolution::Original)
    }

    pub fn provenance_id(&self) -> Option<FactId> {
        match self {
            Resolution::EchoOf { root } => Some(*root),
            _ => None,
        }
    }

    pub fn external_source_url(&self) -> Option<&str> {
        match self {
            Resolution::External { url } => Some(url),
            _ => None,
        }
    }
}

/// Undirected conflict between two facts, always stored with `fact_id_1 < fact_id_2`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContradictionEdge {
    pub fact_id_1: FactId,
    pub fact_id_2: FactId,
    pub score: f64,
    pub detected_at: DateTime<Utc>,
    pub method: String,
}

impl ContradictionEdge {
    pub fn new(a: FactId, b: FactId, score: f64, method: &str) -> Self {
        let (fact_id_1, fact_id_2) = if a <= b { (a, b) } else { (b, a) };
        Self {
            fact_id_1,
            fact_id_2,
            score,
            detected_at: Utc::now(),
            method: method.to_string(),
        }
    }

    pub fn key(&self) -> (FactId, FactId) {
        (self.fact_id_1, self.fact_id_2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contradiction_edge_is_canonically_ordered() {
        let e = ContradictionEdge::new(9, 4, 0.81, "nli");
        assert_eq!(e.key(), (4, 9));
        let e = ContradictionEdge::new(4, 9, 0.81, "nli");
        assert_eq!(e.key(), (4, 9));
    }

    #[test]
    fn candidate_completeness() {
        assert!(FactCandidate::new("Japan", "hit by", "earthquake", 0.9).is_complete());
        assert!(!FactCandidate::new("Japan", "  ", "earthquake", 0.9).is_complete());
    }

    #[test]
    fn resolution_fields() {
        assert_eq!(Resolution::EchoOf { root: 3 }.provenance_id(), Some(3));
        assert!(Resolution::Original.is_original());
        let ext = Resolution::External { url: "https://a.example/x".into() };
        assert_eq!(ext.external_source_url(), Some("https://a.example/x"));
        assert_eq!(ext.provenance_id(), None);
    }
}
