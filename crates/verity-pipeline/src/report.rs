use serde::{Deserialize, Serialize};

use verity_core::{Capability, ContradictionEdge};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DigestReport {
    pub articles: u64,
    pub inserted: u64,
    pub duplicates: u64,
    /// Candidates discarded for an incomplete triple or an unusable embedding.
    pub dropped: u64,
    /// Articles whose extraction failed outright. They are still marked processed.
    pub failures: u64,
    pub degraded: Vec<Capability>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceReport {
    pub examined: u64,
    pub original: u64,
    pub echoes: u64,
    pub external: u64,
    /// Left unchecked for the next run.
    pub deferred: u64,
    /// Resolved as original after the external check failed permanently.
    pub search_failures: u64,
    pub failures: u64,
    pub degraded: Vec<Capability>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContradictionReport {
    pub baseline: u64,
    pub candidates: u64,
    pub pruned: u64,
    pub checked: u64,
    pub found: u64,
    /// Pairs the entailment collaborator could not score. Not the same as "no contradiction".
    pub failed_checks: u64,
    pub graph_synced: bool,
    pub degraded: Vec<Capability>,
    #[serde(skip)]
    pub edges: Vec<ContradictionEdge>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncOutcome {
    Published { digest: String },
    Unchanged { digest: String },
    /// A quality gate let nothing through. Always a misconfiguration once the pipeline has run.
    GateBlocked { reason: String },
    /// No graph store is wired in.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishReport {
    #[serde(flatten)]
    pub outcome: SyncOutcome,
    pub facts: u64,
    pub articles: u64,
    pub assertions: u64,
    pub contradictions: u64,
    pub similarities: u64,
    pub mentions: u64,
    /// Facts whose entity lookup failed; they are retried on the next run.
    pub entity_failures: u64,
    pub degraded: Vec<Capability>,
}

impl PublishReport {
    pub fn empty(outcome: SyncOutcome) -> Self {
        Self {
            outcome,
            facts: 0,
            articles: 0,
            assertions: 0,
            contradictions: 0,
            similarities: 0,
            mentions: 0,
            entity_failures: 0,
            degraded: Vec::new(),
        }
    }

    pub fn is_gate_blocked(&self) -> bool {
        matches!(self.outcome, SyncOutcome::GateBlocked { .. })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrustReport {
    pub sources: u64,
    pub skipped: u64,
    pub articles_updated: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArchiveReport {
    pub selected: u64,
    pub archived: u64,
    pub deleted: u64,
    pub text_cleared: u64,
    pub degraded: Vec<Capability>,
}

/// One line of stdout per stage process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum StageReport {
    Digest(DigestReport),
    Provenance(ProvenanceReport),
    Contradictions(ContradictionReport),
    Publish(PublishReport),
    Trust(TrustReport),
    Archive(ArchiveReport),
}

impl StageReport {
    /// 0 on success, 2 when publication was blocked by a quality gate.
    pub fn exit_code(&self) -> u8 {
        match self {
            StageReport::Publish(report) if report.is_gate_blocked() => 2,
            _ => 0,
        }
    }
}
