use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info};

use super::ServiceCore;
use crate::analysis::{AnalysisOutcome, AnalysisPipeline, CancelToken};
use crate::config::PipelineConfig;
use crate::error::{AnalysisError, AnalysisResult};
use crate::storage::{AnalysisRecord, Segment, Storage};

/// Input for `analysis_run`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeParams {
    pub problem_id: String,
    /// The question to analyze against the problem.
    pub query: String,
}

/// Result of one analysis over a stored problem
#[derive(Debug, Clone, Serialize)]
pub struct AnalyzeResult {
    pub analysis_id: String,
    pub problem_id: String,
    /// Segments written for the kept steps, in step order.
    pub segment_ids: Vec<String>,
    #[serde(flatten)]
    pub outcome: AnalysisOutcome,
}

/// Runs the pipeline for stored problems and records what it found.
#[derive(Clone)]
pub struct AnalysisService {
    core: ServiceCore,
    pipeline: AnalysisPipeline,
}

impl AnalysisService {
    pub fn new(core: ServiceCore, config: PipelineConfig) -> Self {
        let pipeline = AnalysisPipeline::new(core.reasoner().clone(), config);
        Self { core, pipeline }
    }

    /// Analyze `params.query` and persist the steps, critical path and outcome.
    ///
    /// Nothing is written unless the pipeline finishes, and the writes land
    /// in one transaction.
    pub async fn process(
        &self,
        params: AnalyzeParams,
        cancel: CancelToken,
    ) -> AnalysisResult<AnalyzeResult> {
        let start = Instant::now();
        let storage = self.core.storage();

        let problem = storage
            .get_problem(&params.problem_id)
            .await?
            .ok_or_else(|| AnalysisError::NotFound {
                entity: "Problem",
                id: params.problem_id.clone(),
            })?;
        let reviews: Vec<(String, String)> = storage
            .list_literature_reviews(&problem.id)
            .await?
            .into_iter()
            .map(|r| (r.title, r.content))
            .collect();

        debug!(
            problem_id = %problem.id,
            reviews = reviews.len(),
            "Processing analysis request"
        );

        let outcome = self
            .pipeline
            .run(&problem.description, &reviews, &params.query, cancel)
            .await?;

        let segments: Vec<Segment> = outcome
            .steps
            .iter()
            .map(|step| Segment::from_step(&problem.id, step))
            .collect();
        let segment_ids = segments.iter().map(|s| s.id.clone()).collect();

        let record = AnalysisRecord::new(&problem.id, &params.query, outcome);
        storage.record_analysis(&record, &segments).await?;

        info!(
            problem_id = %problem.id,
            analysis_id = %record.id,
            steps = record.outcome.steps.len(),
            skipped = record.outcome.skipped.len(),
            latency_ms = start.elapsed().as_millis(),
            "Analysis persisted"
        );

        Ok(AnalyzeResult {
            analysis_id: record.id,
            problem_id: record.problem_id,
            segment_ids,
            outcome: record.outcome,
        })
    }

    /// Saved analyses of a problem, newest first.
    pub async fn results(&self, problem_id: &str) -> AnalysisResult<Vec<AnalysisRecord>> {
        let storage = self.core.storage();
        if storage.get_problem(problem_id).await?.is_none() {
            return Err(AnalysisError::NotFound {
                entity: "Problem",
                id: problem_id.to_string(),
            });
        }
        Ok(storage.list_analyses(problem_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{ReasoningTask, PROBLEM_CONTEXT_TOOL};
    use crate::services::test_support::{core_with, CannedReasoner};
    use crate::storage::{LiteratureReview, Problem};

    const SEGMENT_JSON: &str = r#"{
        "key_findings": ["Freight is 30% of cost"],
        "relevant_data": {"freight_share": 0.3},
        "next_steps": ["Renegotiate carriers"],
        "confidence_score": 0.8,
        "critical_assumptions": ["Volumes hold"],
        "required_data": ["Carrier invoices"],
        "external_review_required": true
    }"#;

    const META_JSON: &str = r#"{
        "coherence_score": 0.9,
        "consistency_score": 0.8,
        "quality_score": 0.85,
        "improvement_suggestions": ["Quantify volume risk"],
        "critical_path": ["What drives freight cost?"]
    }"#;

    fn reasoner() -> CannedReasoner {
        CannedReasoner::default()
            .with(
                ReasoningTask::QuestionGeneration,
                format!(
                    r#"{{"items": [{{"sub_question": "What drives freight cost?", "tool_name": "{}"}}]}}"#,
                    PROBLEM_CONTEXT_TOOL
                ),
            )
            .with(ReasoningTask::Answer, "Fuel surcharges and lane mix.")
            .with(ReasoningTask::SegmentOutput, SEGMENT_JSON)
            .with(ReasoningTask::RunningSummary, "Freight dominates cost growth.")
            .with(ReasoningTask::Synthesis, "Cut freight via carrier renegotiation.")
            .with(ReasoningTask::MetaAnalysis, META_JSON)
    }

    #[tokio::test]
    async fn test_process_persists_steps_and_record() {
        let core = core_with(reasoner()).await;
        let problem = Problem::new("Margin", "Gross margin fell", "Acme");
        core.storage().create_problem(&problem).await.unwrap();
        core.storage()
            .create_literature_review(&LiteratureReview::new(
                &problem.id,
                "Freight benchmarks",
                "Peers spend 22% on freight",
            ))
            .await
            .unwrap();

        let service = AnalysisService::new(core.clone(), PipelineConfig::default());
        let result = service
            .process(
                AnalyzeParams {
                    problem_id: problem.id.clone(),
                    query: "How do we restore margin?".to_string(),
                },
                CancelToken::never(),
            )
            .await
            .unwrap();

        assert_eq!(result.outcome.steps.len(), 1);
        assert_eq!(result.segment_ids.len(), 1);
        assert_eq!(result.outcome.final_response, "Cut freight via carrier renegotiation.");

        let segments = core.storage().list_segments(&problem.id).await.unwrap();
        assert_eq!(segments[0].title, "Step: What drives freight cost?...");
        assert!(segments[0].external_review_required);

        let stored = core.storage().get_problem(&problem.id).await.unwrap().unwrap();
        assert_eq!(stored.critical_path, vec!["What drives freight cost?"]);

        let records = service.results(&problem.id).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, result.analysis_id);
    }

    #[tokio::test]
    async fn test_unknown_problem_is_not_found() {
        let core = core_with(reasoner()).await;
        let service = AnalysisService::new(core, PipelineConfig::default());

        let err = service
            .process(
                AnalyzeParams {
                    problem_id: "missing".to_string(),
                    query: "Anything?".to_string(),
                },
                CancelToken::never(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::NotFound { entity: "Problem", .. }));
        assert!(service.results("missing").await.is_err());
    }

    #[tokio::test]
    async fn test_failed_run_writes_nothing() {
        let core = core_with(reasoner().with(ReasoningTask::MetaAnalysis, "not json")).await;
        let problem = Problem::new("Margin", "Gross margin fell", "Acme");
        core.storage().create_problem(&problem).await.unwrap();

        let service = AnalysisService::new(core.clone(), PipelineConfig::default());
        let err = service
            .process(
                AnalyzeParams {
                    problem_id: problem.id.clone(),
                    query: "How do we restore margin?".to_string(),
                },
                CancelToken::never(),
            )
            .await
            .unwrap_err();

        assert_eq!(err.status_code(), 422);
        assert!(core.storage().list_segments(&problem.id).await.unwrap().is_empty());
        assert!(service.results(&problem.id).await.unwrap().is_empty());
    }
}
