use async_trait::async_trait;
use tracing::debug;

use super::client::LangbaseClient;
use super::types::{Message, PipeDefinition, PipeRequest};
use crate::analysis::{ReasoningService, ReasoningTask};
use crate::config::PipeConfig;
use crate::error::AnalysisResult;
use crate::prompts;

/// [`ReasoningService`] backed by one Langbase pipe per task.
#[derive(Clone)]
pub struct LangbaseReasoner {
    client: LangbaseClient,
    pipes: PipeConfig,
}

impl LangbaseReasoner {
    pub fn new(client: LangbaseClient, pipes: PipeConfig) -> Self {
        Self { client, pipes }
    }

    /// Pipe name configured for a task.
    pub fn pipe_name(&self, task: ReasoningTask) -> &str {
        pipe_name(&self.pipes, task)
    }

    /// Provision every pipe this reasoner calls.
    pub async fn ensure_pipes(&self) -> AnalysisResult<()> {
        self.client.ensure_pipes(&pipe_definitions(&self.pipes)).await?;
        Ok(())
    }
}

#[async_trait]
impl ReasoningService for LangbaseReasoner {
    async fn complete(&self, task: ReasoningTask, prompt: &str) -> AnalysisResult<String> {
        let pipe = self.pipe_name(task);
        debug!(task = %task, pipe = %pipe, prompt_len = prompt.len(), "Dispatching reasoning task");

        let messages = vec![
            Message::system(prompts::system_prompt(task)),
            Message::user(prompt),
        ];
        let request = PipeRequest::new(pipe, messages);
        let response = self.client.call_pipe(request).await?;
        Ok(response.completion)
    }
}

fn pipe_name(pipes: &PipeConfig, task: ReasoningTask) -> &str {
    match task {
        ReasoningTask::QuestionGeneration => &pipes.question_generation,
        ReasoningTask::Answer => &pipes.answer,
        ReasoningTask::SegmentOutput => &pipes.segment_output,
        ReasoningTask::RunningSummary => &pipes.running_summary,
        ReasoningTask::Synthesis => &pipes.synthesis,
        ReasoningTask::MetaAnalysis => &pipes.meta_analysis,
        ReasoningTask::SessionSummary => &pipes.session_summary,
    }
}

/// Pipe definitions for every reasoning task.
pub fn pipe_definitions(pipes: &PipeConfig) -> Vec<PipeDefinition> {
    ReasoningTask::ALL
        .iter()
        .map(|&task| {
            let (temperature, max_tokens) = match task {
                ReasoningTask::QuestionGeneration => (0.7, 1500),
                ReasoningTask::Answer => (0.3, 1000),
                ReasoningTask::SegmentOutput | ReasoningTask::MetaAnalysis => (0.2, 1500),
                ReasoningTask::RunningSummary => (0.3, 800),
                ReasoningTask::Synthesis | ReasoningTask::SessionSummary => (0.5, 2000),
            };
            PipeDefinition {
                name: pipe_name(pipes, task).to_string(),
                description: format!("Consulting analysis: {}", task.as_str().replace('_', " ")),
                system_prompt: prompts::system_prompt(task),
                json_output: task.expects_json(),
                temperature,
                max_tokens,
            }
        })
        .collect()
}
