use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use super::index::KeywordIndex;
use super::services::{ReasoningService, ReasoningTask, RetrievalTool};
use super::types::{SubAnswer, ToolMetadata};
use crate::error::AnalysisResult;
use crate::prompts;

/// Name the question generator uses to route sub-questions to the problem's documents.
pub const PROBLEM_CONTEXT_TOOL: &str = "problem_context";

/// Answers sub-questions from a problem's description and literature reviews.
pub struct DocumentRetriever {
    index: KeywordIndex,
    reasoner: Arc<dyn ReasoningService>,
    top_k: usize,
}

impl DocumentRetriever {
    /// Index the problem description followed by each review as one document.
    pub fn new(
        problem_description: &str,
        reviews: &[(String, String)],
        reasoner: Arc<dyn ReasoningService>,
        top_k: usize,
    ) -> Self {
        let documents = std::iter::once(problem_description.to_string()).chain(
            reviews
                .iter()
                .map(|(title, content)| format!("Literature Review: {}\n\n{}", title, content)),
        );

        Self {
            index: KeywordIndex::from_documents(documents),
            reasoner,
            top_k: top_k.max(1),
        }
    }

    /// Passages handed to the answer prompt.
    ///
    /// Falls back to the leading documents when nothing shares a term with
    /// the question, so the problem description is always available.
    fn passages(&self, question: &str) -> Vec<String> {
        let hits = self.index.search(question, self.top_k);
        if hits.is_empty() {
            return self
                .index
                .documents()
                .take(self.top_k)
                .map(str::to_string)
                .collect();
        }
        hits.into_iter().map(str::to_string).collect()
    }
}

#[async_trait]
impl RetrievalTool for DocumentRetriever {
    fn metadata(&self) -> ToolMetadata {
        ToolMetadata {
            name: PROBLEM_CONTEXT_TOOL.to_string(),
            description: "Provides information about the problem and its literature reviews"
                .to_string(),
        }
    }

    async fn query(&self, question: &str) -> AnalysisResult<SubAnswer> {
        let passages = self.passages(question);
        debug!(passages = passages.len(), "Answering sub-question from problem documents");

        let response = self
            .reasoner
            .complete(ReasoningTask::Answer, &prompts::answer_prompt(question, &passages))
            .await?;

        Ok(SubAnswer::new(question, response.trim()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct EchoReasoner {
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ReasoningService for EchoReasoner {
        async fn complete(&self, task: ReasoningTask, prompt: &str) -> AnalysisResult<String> {
            assert_eq!(task, ReasoningTask::Answer);
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok("  Carrier rates rose 12%.  ".to_string())
        }
    }

    fn retriever(reasoner: Arc<EchoReasoner>) -> DocumentRetriever {
        DocumentRetriever::new(
            "Gross margin fell four points in two quarters",
            &[(
                "Freight market 2024".to_string(),
                "Carrier rates rose twelve percent year over year".to_string(),
            )],
            reasoner,
            1,
        )
    }

    #[tokio::test]
    async fn test_query_uses_best_passage() {
        let reasoner = Arc::new(EchoReasoner {
            prompts: Mutex::new(Vec::new()),
        });
        let tool = retriever(reasoner.clone());

        let answer = tool.query("How much did carrier rates rise?").await.unwrap();
        assert_eq!(answer.question, "How much did carrier rates rise?");
        assert_eq!(answer.response, "Carrier rates rose 12%.");

        let prompts = reasoner.prompts.lock().unwrap();
        assert!(prompts[0].contains("Literature Review: Freight market 2024"));
        assert!(!prompts[0].contains("Gross margin"));
    }

    #[tokio::test]
    async fn test_query_falls_back_to_problem_description() {
        let reasoner = Arc::new(EchoReasoner {
            prompts: Mutex::new(Vec::new()),
        });
        let tool = retriever(reasoner.clone());

        tool.query("Unrelated wording entirely").await.unwrap();
        let prompts = reasoner.prompts.lock().unwrap();
        assert!(prompts[0].contains("Gross margin fell"));
    }

    #[test]
    fn test_metadata_name() {
        let reasoner = Arc::new(EchoReasoner {
            prompts: Mutex::new(Vec::new()),
        });
        assert_eq!(retriever(reasoner).metadata().name, PROBLEM_CONTEXT_TOOL);
    }
}
