//! Collaborator seams of the analysis pipeline.
//!
//! The pipeline never talks to a model, a vector store, or a document
//! retriever directly. It goes through these traits, so tests can drive
//! every stage with in-process stubs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::types::{SubAnswer, ToolMetadata};
use crate::error::AnalysisResult;

/// The distinct prompts the pipeline sends to the reasoning service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasoningTask {
    /// Break a query into tool-bound sub-questions.
    QuestionGeneration,
    /// Answer one sub-question from retrieved passages.
    Answer,
    /// Turn an answer into a [`SegmentOutput`](super::SegmentOutput).
    SegmentOutput,
    /// Fold a new segment into the running summary.
    RunningSummary,
    /// Write the final response to the user query.
    Synthesis,
    /// Score the run as a whole.
    MetaAnalysis,
    /// Close a session with insights, decisions and open questions.
    SessionSummary,
}

impl ReasoningTask {
    /// Every task, in pipeline order.
    pub const ALL: [ReasoningTask; 7] = [
        ReasoningTask::QuestionGeneration,
        ReasoningTask::Answer,
        ReasoningTask::SegmentOutput,
        ReasoningTask::RunningSummary,
        ReasoningTask::Synthesis,
        ReasoningTask::MetaAnalysis,
        ReasoningTask::SessionSummary,
    ];

    /// Stable snake_case name used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasoningTask::QuestionGeneration => "question_generation",
            ReasoningTask::Answer => "answer",
            ReasoningTask::SegmentOutput => "segment_output",
            ReasoningTask::RunningSummary => "running_summary",
            ReasoningTask::Synthesis => "synthesis",
            ReasoningTask::MetaAnalysis => "meta_analysis",
            ReasoningTask::SessionSummary => "session_summary",
        }
    }

    /// Whether the completion must be a JSON document.
    pub fn expects_json(&self) -> bool {
        matches!(
            self,
            ReasoningTask::QuestionGeneration
                | ReasoningTask::SegmentOutput
                | ReasoningTask::MetaAnalysis
        )
    }
}

impl fmt::Display for ReasoningTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Prompt in, completion text out.
///
/// Implementations own transport-level retries. Callers treat any error as
/// final for the stage that issued the call.
#[async_trait]
pub trait ReasoningService: Send + Sync {
    /// Run `prompt` for `task` and return the raw completion.
    async fn complete(&self, task: ReasoningTask, prompt: &str) -> AnalysisResult<String>;
}

/// Answers sub-questions routed to it by name.
#[async_trait]
pub trait RetrievalTool: Send + Sync {
    /// Name and description shown to the question generator.
    fn metadata(&self) -> ToolMetadata;

    /// Answer a single sub-question.
    async fn query(&self, question: &str) -> AnalysisResult<SubAnswer>;
}

/// Similarity search over accumulated text.
#[async_trait]
pub trait SemanticIndex: Send + Sync {
    /// Add documents. Either all of them become searchable or none do.
    async fn insert(&mut self, documents: Vec<String>) -> AnalysisResult<()>;

    /// Up to `top_k` stored documents most similar to `query`, best first.
    async fn retrieve(&self, query: &str, top_k: usize) -> AnalysisResult<Vec<String>>;

    /// Number of stored documents.
    fn len(&self) -> usize;

    /// Whether nothing has been stored yet.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
