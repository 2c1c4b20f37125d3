use std::sync::Arc;
use tracing::{info, warn};

use super::services::{ReasoningService, ReasoningTask};
use super::types::{AnalysisStep, MetaAnalysis};
use super::validator::parse_meta_analysis;
use crate::error::AnalysisResult;
use crate::prompts;

/// Scores a completed run as a whole.
pub struct MetaAnalysisSynthesizer {
    reasoner: Arc<dyn ReasoningService>,
}

impl MetaAnalysisSynthesizer {
    pub fn new(reasoner: Arc<dyn ReasoningService>) -> Self {
        Self { reasoner }
    }

    /// A malformed or out-of-range response fails the whole run.
    pub async fn synthesize(
        &self,
        steps: &[AnalysisStep],
        final_response: &str,
    ) -> AnalysisResult<MetaAnalysis> {
        let raw = self
            .reasoner
            .complete(
                ReasoningTask::MetaAnalysis,
                &prompts::meta_analysis_prompt(steps, final_response),
            )
            .await?;

        let meta = parse_meta_analysis(&raw).map_err(|e| {
            warn!(error = %e, "Meta-analysis response rejected");
            e
        })?;

        info!(
            coherence = meta.coherence_score,
            consistency = meta.consistency_score,
            quality = meta.quality_score,
            critical_path = meta.critical_path.len(),
            "Meta-analysis complete"
        );
        Ok(meta)
    }
}
