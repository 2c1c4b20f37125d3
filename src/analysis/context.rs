//! Running summary plus searchable findings for one analysis session.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use super::index::KeywordIndex;
use super::services::{ReasoningService, ReasoningTask, SemanticIndex};
use super::types::SegmentOutput;
use crate::error::AnalysisResult;
use crate::prompts;

/// Findings returned alongside the running summary by [`ContextAccumulator::query`].
pub const CONTEXT_TOP_K: usize = 5;

/// Serializable state of a [`ContextAccumulator`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub running_summary: String,
    /// Every finding folded so far, in fold order.
    pub findings: Vec<String>,
}

/// Accumulates segment outputs over a session.
///
/// Exactly one writer folds into an accumulator; the pipeline enforces this by
/// owning it on a single task.
pub struct ContextAccumulator {
    reasoner: Arc<dyn ReasoningService>,
    index: Box<dyn SemanticIndex>,
    running_summary: String,
    findings: Vec<String>,
}

impl ContextAccumulator {
    /// Empty accumulator over an in-process [`KeywordIndex`].
    pub fn new(reasoner: Arc<dyn ReasoningService>) -> Self {
        Self::with_index(reasoner, Box::new(KeywordIndex::new()))
    }

    /// Empty accumulator over the given index.
    pub fn with_index(reasoner: Arc<dyn ReasoningService>, index: Box<dyn SemanticIndex>) -> Self {
        Self {
            reasoner,
            index,
            running_summary: String::new(),
            findings: Vec::new(),
        }
    }

    /// Fold one segment output into the summary and the findings index.
    ///
    /// The summary call runs first. If it fails nothing is modified.
    pub async fn fold(&mut self, output: &SegmentOutput) -> AnalysisResult<()> {
        let prompt = prompts::running_summary_prompt(&self.running_summary, output);
        let updated = self
            .reasoner
            .complete(ReasoningTask::RunningSummary, &prompt)
            .await?;

        self.index.insert(output.key_findings.clone()).await?;
        self.findings.extend(output.key_findings.iter().cloned());
        self.running_summary = updated.trim().to_string();

        debug!(
            findings = self.findings.len(),
            summary_len = self.running_summary.len(),
            "Folded segment into context"
        );
        Ok(())
    }

    /// Running summary followed by the findings most similar to `text`.
    pub async fn query(&self, text: &str) -> AnalysisResult<String> {
        let relevant = self.index.retrieve(text, CONTEXT_TOP_K).await?;
        let findings = if relevant.is_empty() {
            "(none)".to_string()
        } else {
            relevant
                .iter()
                .map(|f| format!("- {}", f))
                .collect::<Vec<_>>()
                .join("\n")
        };

        Ok(format!(
            "Running summary: {}\n\nRelevant past findings:\n{}",
            self.running_summary, findings
        ))
    }

    pub fn running_summary(&self) -> &str {
        &self.running_summary
    }

    pub fn findings(&self) -> &[String] {
        &self.findings
    }

    /// Capture the current state for persistence.
    pub fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            running_summary: self.running_summary.clone(),
            findings: self.findings.clone(),
        }
    }

    /// Rebuild an accumulator from a snapshot, re-indexing its findings.
    pub async fn restore(
        reasoner: Arc<dyn ReasoningService>,
        mut index: Box<dyn SemanticIndex>,
        snapshot: ContextSnapshot,
    ) -> AnalysisResult<Self> {
        index.insert(snapshot.findings.clone()).await?;
        Ok(Self {
            reasoner,
            index,
            running_summary: snapshot.running_summary,
            findings: snapshot.findings,
        })
    }

    /// Ask for an end-of-session summary of insights, decisions and open questions.
    pub async fn session_summary(&self) -> AnalysisResult<String> {
        let prompt = prompts::session_summary_prompt(&self.running_summary, &self.findings);
        let summary = self
            .reasoner
            .complete(ReasoningTask::SessionSummary, &prompt)
            .await?;
        Ok(summary.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AnalysisError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingReasoner {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl ReasoningService for CountingReasoner {
        async fn complete(&self, _task: ReasoningTask, _prompt: &str) -> AnalysisResult<String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail {
                return Err(AnalysisError::UpstreamUnavailable {
                    message: "pipe down".to_string(),
                });
            }
            Ok(format!("summary v{}", n))
        }
    }

    fn output(findings: &[&str]) -> SegmentOutput {
        SegmentOutput {
            key_findings: findings.iter().map(|f| f.to_string()).collect(),
            relevant_data: Default::default(),
            next_steps: vec![],
            confidence_score: 0.6,
            critical_assumptions: vec![],
            required_data: vec![],
            external_review_required: false,
        }
    }

    fn reasoner(fail: bool) -> Arc<CountingReasoner> {
        Arc::new(CountingReasoner {
            calls: AtomicUsize::new(0),
            fail,
        })
    }

    #[tokio::test]
    async fn test_fold_accumulates_findings_and_summary() {
        let mut acc = ContextAccumulator::new(reasoner(false));
        acc.fold(&output(&["Freight share rising", "Carrier count falling"]))
            .await
            .unwrap();
        acc.fold(&output(&["Churn flat"])).await.unwrap();

        assert_eq!(acc.findings().len(), 3);
        assert_eq!(acc.running_summary(), "summary v2");
    }

    #[tokio::test]
    async fn test_failed_fold_leaves_state_untouched() {
        let mut acc = ContextAccumulator::new(reasoner(true));
        let err = acc.fold(&output(&["anything"])).await.unwrap_err();

        assert!(matches!(err, AnalysisError::UpstreamUnavailable { .. }));
        assert!(acc.findings().is_empty());
        assert_eq!(acc.running_summary(), "");
    }

    #[tokio::test]
    async fn test_query_includes_summary_and_relevant_findings() {
        let mut acc = ContextAccumulator::new(reasoner(false));
        acc.fold(&output(&["Freight share rising", "Churn flat"]))
            .await
            .unwrap();

        let context = acc.query("freight exposure").await.unwrap();
        assert!(context.starts_with("Running summary: summary v1"));
        assert!(context.contains("- Freight share rising"));
        assert!(!context.contains("Churn flat"));
    }

    #[tokio::test]
    async fn test_snapshot_restore() {
        let mut acc = ContextAccumulator::new(reasoner(false));
        acc.fold(&output(&["Pricing tiers confuse buyers"])).await.unwrap();
        let snapshot = acc.snapshot();

        let restored =
            ContextAccumulator::restore(reasoner(false), Box::new(KeywordIndex::new()), snapshot.clone())
                .await
                .unwrap();
        assert_eq!(restored.snapshot(), snapshot);
        assert!(restored
            .query("pricing")
            .await
            .unwrap()
            .contains("Pricing tiers confuse buyers"));
    }
}
