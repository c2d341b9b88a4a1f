pub mod archive;
pub mod bootstrap;
pub mod contradiction;
pub mod digest;
pub mod provenance;
pub mod publish;
pub mod report;
pub mod trust;

pub use archive::run_archive;
pub use contradiction::{run_contradictions, DetectionMode};
pub use digest::run_digest;
pub use provenance::{resolve_fact, run_provenance, Verdict};
pub use publish::{run_publish, GatedPayload};
pub use report::{
    ArchiveReport, ContradictionReport, DigestReport, ProvenanceReport, PublishReport,
    StageReport, SyncOutcome, TrustReport,
};
pub use trust::run_trust;
