//! The staged analysis pipeline.
//!
//! decompose → answer (bounded fan-out) → validate → fold → synthesize →
//! meta-analyze. Sub-question tasks run concurrently; a single writer owns the
//! [`ContextAccumulator`] and folds results as they arrive.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::context::ContextAccumulator;
use super::retrieval::DocumentRetriever;
use super::services::{ReasoningService, ReasoningTask, RetrievalTool};
use super::synthesizer::MetaAnalysisSynthesizer;
use super::types::{AnalysisOutcome, AnalysisStep, SkippedStep, SubQuestion, ToolMetadata};
use super::validator::{parse_segment_output, parse_sub_questions};
use crate::config::PipelineConfig;
use crate::error::{AnalysisError, AnalysisResult};
use crate::prompts;

/// Signals cancellation to every [`CancelToken`] cloned from its pair.
#[derive(Debug)]
pub struct CancelHandle {
    sender: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }
}

/// Observes a [`CancelHandle`].
#[derive(Debug, Clone)]
pub struct CancelToken {
    receiver: watch::Receiver<bool>,
}

/// Create a connected handle/token pair.
pub fn cancellation() -> (CancelHandle, CancelToken) {
    let (sender, receiver) = watch::channel(false);
    (CancelHandle { sender }, CancelToken { receiver })
}

impl CancelToken {
    /// A token that is never cancelled.
    pub fn never() -> Self {
        let (_, receiver) = watch::channel(false);
        Self { receiver }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves once cancelled. Pends forever if the handle is dropped first.
    pub async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        loop {
            if *receiver.borrow_and_update() {
                return;
            }
            if receiver.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    fn check(&self, stage: &'static str) -> AnalysisResult<()> {
        if self.is_cancelled() {
            info!(stage, "Analysis cancelled");
            return Err(AnalysisError::Cancelled { stage });
        }
        Ok(())
    }
}

struct AnsweredQuestion {
    position: usize,
    question: String,
    result: AnalysisResult<AnalysisStep>,
}

/// Runs one analysis from query to meta-analysis.
#[derive(Clone)]
pub struct AnalysisPipeline {
    reasoner: Arc<dyn ReasoningService>,
    config: PipelineConfig,
}

impl AnalysisPipeline {
    pub fn new(reasoner: Arc<dyn ReasoningService>, config: PipelineConfig) -> Self {
        Self { reasoner, config }
    }

    /// Analyze `query` against a problem's description and `(title, content)`
    /// literature reviews, answering every sub-question from those documents.
    pub async fn run(
        &self,
        problem_description: &str,
        reviews: &[(String, String)],
        query: &str,
        cancel: CancelToken,
    ) -> AnalysisResult<AnalysisOutcome> {
        let retriever = DocumentRetriever::new(
            problem_description,
            reviews,
            Arc::clone(&self.reasoner),
            self.config.retrieval_top_k,
        );
        self.run_with_tools(problem_description, query, vec![Arc::new(retriever)], cancel)
            .await
    }

    /// Analyze `query` with an explicit set of retrieval tools.
    pub async fn run_with_tools(
        &self,
        problem_description: &str,
        query: &str,
        tools: Vec<Arc<dyn RetrievalTool>>,
        cancel: CancelToken,
    ) -> AnalysisResult<AnalysisOutcome> {
        if query.trim().is_empty() {
            return Err(AnalysisError::invalid_argument("query must not be empty"));
        }

        let start = Instant::now();
        let metadata: Vec<ToolMetadata> = tools.iter().map(|t| t.metadata()).collect();
        let catalog: HashMap<String, Arc<dyn RetrievalTool>> = metadata
            .iter()
            .map(|m| m.name.clone())
            .zip(tools)
            .collect();

        cancel.check("decompose")?;
        debug!(tools = metadata.len(), "Decomposing query");
        let raw = self
            .reasoner
            .complete(
                ReasoningTask::QuestionGeneration,
                &prompts::decomposition_prompt(problem_description, &metadata, query),
            )
            .await?;
        let sub_questions = parse_sub_questions(&raw)?;
        info!(sub_questions = sub_questions.len(), "Query decomposed");

        let mut accumulator = ContextAccumulator::new(Arc::clone(&self.reasoner));
        let (steps, skipped) = self
            .answer_all(sub_questions, &catalog, &mut accumulator, &cancel)
            .await?;

        cancel.check("synthesize")?;
        let context = accumulator.query(query).await?;
        let final_response = self
            .reasoner
            .complete(
                ReasoningTask::Synthesis,
                &prompts::synthesis_prompt(query, &steps, &context),
            )
            .await?;

        cancel.check("meta_analysis")?;
        let meta_analysis = MetaAnalysisSynthesizer::new(Arc::clone(&self.reasoner))
            .synthesize(&steps, &final_response)
            .await?;

        let session_summary = if self.config.session_summary {
            cancel.check("session_summary")?;
            Some(accumulator.session_summary().await?)
        } else {
            None
        };

        info!(
            steps = steps.len(),
            skipped = skipped.len(),
            latency_ms = start.elapsed().as_millis(),
            "Analysis complete"
        );

        Ok(AnalysisOutcome {
            steps,
            final_response: final_response.trim().to_string(),
            meta_analysis,
            skipped,
            running_summary: accumulator.running_summary().to_string(),
            session_summary,
        })
    }

    async fn answer_all(
        &self,
        sub_questions: Vec<SubQuestion>,
        catalog: &HashMap<String, Arc<dyn RetrievalTool>>,
        accumulator: &mut ContextAccumulator,
        cancel: &CancelToken,
    ) -> AnalysisResult<(Vec<AnalysisStep>, Vec<SkippedStep>)> {
        let total = sub_questions.len();
        let (tx, mut rx) = mpsc::channel::<AnsweredQuestion>(total.max(1));
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let mut tasks = JoinSet::new();
        let mut skipped: Vec<(usize, SkippedStep)> = Vec::new();
        // Dispatched sub-questions that have not reported back yet
        let mut pending: BTreeMap<usize, String> = BTreeMap::new();

        for (position, sub_question) in sub_questions.into_iter().enumerate() {
            cancel.check("answer")?;

            let Some(tool) = catalog.get(&sub_question.tool_name).cloned() else {
                warn!(
                    question = %sub_question.sub_question,
                    tool = %sub_question.tool_name,
                    "Sub-question routed to unknown tool, skipping"
                );
                skipped.push((
                    position,
                    SkippedStep {
                        question: sub_question.sub_question,
                        reason: format!("unknown tool '{}'", sub_question.tool_name),
                    },
                ));
                continue;
            };

            pending.insert(position, sub_question.sub_question.clone());
            let tx = tx.clone();
            let semaphore = Arc::clone(&semaphore);
            let reasoner = Arc::clone(&self.reasoner);
            let cancel = cancel.clone();
            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return;
                };
                if cancel.is_cancelled() {
                    return;
                }
                let question = sub_question.sub_question;
                let result = answer_sub_question(tool.as_ref(), reasoner.as_ref(), &question).await;
                let _ = tx
                    .send(AnsweredQuestion {
                        position,
                        question,
                        result,
                    })
                    .await;
            });
        }
        drop(tx);

        let mut answered: Vec<(usize, AnalysisStep)> = Vec::with_capacity(total);
        loop {
            let message = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tasks.abort_all();
                    info!(stage = "answer", "Analysis cancelled");
                    return Err(AnalysisError::Cancelled { stage: "answer" });
                }
                message = rx.recv() => message,
            };
            let Some(message) = message else {
                break;
            };
            pending.remove(&message.position);

            match message.result {
                Ok(step) => {
                    accumulator.fold(&step.structured_output).await?;
                    debug!(position = message.position, "Sub-question folded");
                    answered.push((message.position, step));
                }
                Err(err) if is_step_local(&err) => {
                    warn!(
                        question = %message.question,
                        error = %err,
                        "Sub-question skipped"
                    );
                    skipped.push((
                        message.position,
                        SkippedStep {
                            question: message.question,
                            reason: err.to_string(),
                        },
                    ));
                }
                Err(err) => {
                    tasks.abort_all();
                    error!(question = %message.question, error = %err, "Sub-question failed");
                    return Err(err);
                }
            }
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Sub-question task did not complete");
            }
        }

        for (position, question) in pending {
            warn!(question = %question, "Sub-question produced no answer, skipping");
            skipped.push((
                position,
                SkippedStep {
                    question,
                    reason: "sub-question task did not complete".to_string(),
                },
            ));
        }

        answered.sort_by_key(|(position, _)| *position);
        skipped.sort_by_key(|(position, _)| *position);
        Ok((
            answered.into_iter().map(|(_, step)| step).collect(),
            skipped.into_iter().map(|(_, skip)| skip).collect(),
        ))
    }
}

/// Failures that drop one sub-question instead of the whole run.
fn is_step_local(err: &AnalysisError) -> bool {
    matches!(
        err,
        AnalysisError::MalformedSegmentOutput { .. } | AnalysisError::InvalidArgument { .. }
    )
}

async fn answer_sub_question(
    tool: &dyn RetrievalTool,
    reasoner: &dyn ReasoningService,
    question: &str,
) -> AnalysisResult<AnalysisStep> {
    let answer = tool.query(question).await?;
    let raw = reasoner
        .complete(
            ReasoningTask::SegmentOutput,
            &prompts::segment_output_prompt(&answer),
        )
        .await?;
    let structured_output = parse_segment_output(&raw)?;

    Ok(AnalysisStep {
        query: answer.question,
        response: answer.response,
        structured_output,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cancel_token_never_is_not_cancelled() {
        let token = CancelToken::never();
        assert!(!token.is_cancelled());
        assert!(token.check("decompose").is_ok());
    }

    #[tokio::test]
    async fn test_cancel_handle_signals_clones() {
        let (handle, token) = cancellation();
        let clone = token.clone();
        handle.cancel();
        assert!(token.is_cancelled());
        clone.cancelled().await;
        assert!(matches!(
            clone.check("answer"),
            Err(AnalysisError::Cancelled { stage: "answer" })
        ));
    }

    #[tokio::test]
    async fn test_cancelled_stays_pending_after_handle_drop() {
        let (handle, token) = cancellation();
        drop(handle);
        let waited =
            tokio::time::timeout(std::time::Duration::from_millis(20), token.cancelled()).await;
        assert!(waited.is_err());
    }

    #[test]
    fn test_step_local_errors() {
        assert!(is_step_local(&AnalysisError::invalid_argument("one line")));
        assert!(!is_step_local(&AnalysisError::UpstreamUnavailable {
            message: "down".to_string()
        }));
        assert!(!is_step_local(&AnalysisError::Cancelled { stage: "answer" }));
    }
}
