use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use verity_core::{domain_of, PipelineContext, Result, VerityError};

use crate::report::TrustReport;

#[derive(Debug, Deserialize)]
pub struct TrustedSources {
    pub trusted_sources: Vec<TrustedSource>,
}

/// One entry of the curated list. Scores are on a 0 to 10 scale.
#[derive(Debug, Clone, Deserialize)]
pub struct TrustedSource {
    pub url: String,
    pub trust_score: f64,
}

impl TrustedSource {
    /// Bare hosts such as `reuters.com` are accepted as well as full URLs.
    pub fn domain(&self) -> Option<String> {
        let raw = self.url.trim();
        if raw.contains("://") {
            domain_of(raw)
        } else {
            domain_of(&format!("https://{raw}"))
        }
    }

    pub fn normalized_score(&self) -> Option<f64> {
        self.trust_score
            .is_finite()
            .then(|| (self.trust_score / 10.0).clamp(0.0, 1.0))
    }
}

pub async fn load_trusted_sources(path: &Path) -> Result<TrustedSources> {
    let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
        VerityError::Config(format!("cannot read trusted sources {}: {e}", path.display()))
    })?;
    Ok(serde_json::from_str(&raw)?)
}

/// Apply the curated trust list to every matching article.
#[instrument(skip(ctx))]
pub async fn run_trust(ctx: &PipelineContext) -> Result<TrustReport> {
    let sources = load_trusted_sources(&ctx.config.trusted_sources_path).await?;
    let mut report = TrustReport::default();

    for source in &sources.trusted_sources {
        let (Some(domain), Some(score)) = (source.domain(), source.normalized_score()) else {
            report.skipped += 1;
            warn!(url = %source.url, "Unusable trusted-source entry");
            continue;
        };
        report.sources += 1;
        let touched = ctx.store.apply_trust_score(&domain, score).await?;
        report.articles_updated += touched;
        debug!(domain = %domain, score, touched, "Trust score applied");
    }

    info!(
        sources = report.sources,
        skipped = report.skipped,
        articles_updated = report.articles_updated,
        "Trust scoring complete"
    );
    Ok(report)
}
