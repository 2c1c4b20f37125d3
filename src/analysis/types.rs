//! Value objects produced by a pipeline run.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{AnalysisError, AnalysisResult};

const QUESTION_PREFIX: &str = "Sub question: ";
const RESPONSE_PREFIX: &str = "Response: ";

/// Types whose `[0, 1]` score fields are checked after decoding.
pub trait BoundedScores {
    /// Every score field as `(name, value)`.
    fn bounded_scores(&self) -> Vec<(&'static str, f64)>;
}

/// Validated structured result of analyzing one sub-question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentOutput {
    /// Main insights, in the order the reasoning service listed them.
    pub key_findings: Vec<String>,
    /// Structured data relevant to the segment.
    pub relevant_data: BTreeMap<String, serde_json::Value>,
    /// Suggested follow-up actions.
    pub next_steps: Vec<String>,
    /// Confidence in the segment analysis, within `[0, 1]`.
    pub confidence_score: f64,
    /// Assumptions the analysis depends on.
    pub critical_assumptions: Vec<String>,
    /// Data needed to validate or refine the analysis.
    pub required_data: Vec<String>,
    /// Whether a reviewer outside the team should check this segment.
    pub external_review_required: bool,
}

impl BoundedScores for SegmentOutput {
    fn bounded_scores(&self) -> Vec<(&'static str, f64)> {
        vec![("confidence_score", self.confidence_score)]
    }
}

/// One answered and validated sub-question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisStep {
    /// The sub-question text.
    pub query: String,
    /// The raw answer text.
    pub response: String,
    /// Structured findings derived from the answer.
    pub structured_output: SegmentOutput,
}

/// Cross-step quality assessment of a completed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaAnalysis {
    pub coherence_score: f64,
    pub consistency_score: f64,
    pub quality_score: f64,
    pub improvement_suggestions: Vec<String>,
    /// Steps judged most consequential, in order.
    pub critical_path: Vec<String>,
}

impl BoundedScores for MetaAnalysis {
    fn bounded_scores(&self) -> Vec<(&'static str, f64)> {
        vec![
            ("coherence_score", self.coherence_score),
            ("consistency_score", self.consistency_score),
            ("quality_score", self.quality_score),
        ]
    }
}

/// A sub-question bound to the retrieval tool that should answer it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubQuestion {
    pub sub_question: String,
    pub tool_name: String,
}

/// Name and description of a retrieval tool, shown to the question generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolMetadata {
    pub name: String,
    pub description: String,
}

/// A retrieval tool's answer to one sub-question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubAnswer {
    pub question: String,
    pub response: String,
}

impl SubAnswer {
    /// Create a new question/response pair
    pub fn new(question: impl Into<String>, response: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            response: response.into(),
        }
    }

    /// Parse the legacy `"Sub question: <q>\nResponse: <a>"` node payload.
    ///
    /// Line 0 is the question and line 1 the response; anything after line 1
    /// is ignored.
    pub fn from_node_text(text: &str) -> AnalysisResult<Self> {
        let mut lines = text.lines();
        let (Some(question), Some(response)) = (lines.next(), lines.next()) else {
            return Err(AnalysisError::invalid_argument(format!(
                "node text needs a question line and a response line, got {:?}",
                text.chars().take(80).collect::<String>()
            )));
        };

        Ok(Self {
            question: question
                .strip_prefix(QUESTION_PREFIX)
                .unwrap_or(question)
                .trim()
                .to_string(),
            response: response
                .strip_prefix(RESPONSE_PREFIX)
                .unwrap_or(response)
                .trim()
                .to_string(),
        })
    }

    /// Render in the legacy node payload format.
    pub fn to_node_text(&self) -> String {
        format!(
            "{}{}\n{}{}",
            QUESTION_PREFIX,
            self.question,
            RESPONSE_PREFIX,
            self.response.replace('\n', " ")
        )
    }
}

/// A sub-question excluded from the step list, with the reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedStep {
    pub question: String,
    pub reason: String,
}

/// Terminal state of a pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisOutcome {
    /// Validated steps in sub-question order.
    pub steps: Vec<AnalysisStep>,
    pub final_response: String,
    pub meta_analysis: MetaAnalysis,
    /// Sub-questions that failed validation or had no usable tool.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<SkippedStep>,
    /// Running summary held by the context accumulator at the end of the run.
    pub running_summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_summary: Option<String>,
}
