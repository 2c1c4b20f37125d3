//! Centralized prompt definitions for the analysis pipeline
//!
//! System prompts are provisioned onto the Langbase pipes at startup. The
//! `*_prompt` builders render the per-call user message for each stage.

use crate::analysis::{AnalysisStep, ReasoningTask, SegmentOutput, SubAnswer, ToolMetadata};

/// System prompt for breaking a query into tool-bound sub-questions.
pub const QUESTION_GENERATION_PROMPT: &str = r#"You are a management consultant who decomposes complex business problems into focused sub-questions.

Your response MUST be valid JSON in this exact format:
{
  "items": [
    {"sub_question": "a single focused question", "tool_name": "name of the tool that can answer it"}
  ]
}

Guidelines:
- Generate between 2 and 6 sub-questions
- Every sub-question must be answerable on its own
- Only use tool names from the provided tool list
- Order sub-questions so earlier answers inform later ones

Always respond with valid JSON only, no other text."#;

/// System prompt for answering one sub-question from retrieved passages.
pub const ANSWER_PROMPT: &str = r#"You are a research analyst. Answer the question using only the provided context passages.

Guidelines:
- Be specific and quantitative where the context allows
- Say plainly when the context does not contain the answer
- Keep the answer under 200 words"#;

/// System prompt for turning an answer into a structured segment.
pub const SEGMENT_OUTPUT_PROMPT: &str = r#"You are an analysis assistant that converts a question and its answer into a structured segment analysis.

Your response MUST be valid JSON in this exact format:
{
  "key_findings": ["main insights"],
  "relevant_data": {"metric name": "value"},
  "next_steps": ["suggested follow-up actions"],
  "confidence_score": 0.8,
  "critical_assumptions": ["assumptions the analysis depends on"],
  "required_data": ["data needed to validate the analysis"],
  "external_review_required": false
}

Guidelines:
- Every field is required
- confidence_score must be between 0.0 and 1.0
- Set external_review_required when conclusions rest on unverified data

Always respond with valid JSON only, no other text."#;

/// System prompt for folding a new segment into the running summary.
pub const RUNNING_SUMMARY_PROMPT: &str = r#"You maintain a concise running summary of an ongoing problem analysis.

Given the current summary and new information, provide an updated summary that:
- Keeps every finding that still matters
- Integrates the new information without repeating it verbatim
- Stays under 250 words

Respond with the updated summary text only."#;

/// System prompt for the final response to the user query.
pub const SYNTHESIS_PROMPT: &str = r#"You are a senior consultant writing the answer to a client question.

Combine the sub-question answers and the analysis context into one coherent response.
Lead with the recommendation, then the supporting evidence, then the open risks."#;

/// System prompt for scoring a completed run.
pub const META_ANALYSIS_PROMPT: &str = r#"You are a reviewer assessing the quality of a multi-step problem analysis.

Your response MUST be valid JSON in this exact format:
{
  "coherence_score": 0.8,
  "consistency_score": 0.8,
  "quality_score": 0.8,
  "improvement_suggestions": ["how the analysis could be improved"],
  "critical_path": ["the steps that matter most, in order"]
}

Guidelines:
- coherence_score: how well the steps fit together
- consistency_score: whether the steps contradict each other
- quality_score: overall rigor of the analysis
- All scores must be between 0.0 and 1.0

Always respond with valid JSON only, no other text."#;

/// System prompt for the optional end-of-session summary.
pub const SESSION_SUMMARY_PROMPT: &str = r#"You close out a working session on a business problem.

Summarize the session with three short sections:
1. Key insights
2. Major decisions
3. Open questions"#;

/// Get the system prompt provisioned for a reasoning task.
pub fn system_prompt(task: ReasoningTask) -> &'static str {
    match task {
        ReasoningTask::QuestionGeneration => QUESTION_GENERATION_PROMPT,
        ReasoningTask::Answer => ANSWER_PROMPT,
        ReasoningTask::SegmentOutput => SEGMENT_OUTPUT_PROMPT,
        ReasoningTask::RunningSummary => RUNNING_SUMMARY_PROMPT,
        ReasoningTask::Synthesis => SYNTHESIS_PROMPT,
        ReasoningTask::MetaAnalysis => META_ANALYSIS_PROMPT,
        ReasoningTask::SessionSummary => SESSION_SUMMARY_PROMPT,
    }
}

/// User message asking for sub-questions over the available tools.
pub fn decomposition_prompt(problem_description: &str, tools: &[ToolMetadata], query: &str) -> String {
    let tool_list = tools
        .iter()
        .map(|tool| format!("- {}: {}", tool.name, tool.description))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Problem:\n{}\n\nAvailable tools:\n{}\n\nUser question:\n{}",
        problem_description, tool_list, query
    )
}

/// User message asking a sub-question against retrieved passages.
pub fn answer_prompt(question: &str, passages: &[String]) -> String {
    if passages.is_empty() {
        return format!("Context: (no matching passages)\n\nQuestion: {}", question);
    }
    format!(
        "Context:\n{}\n\nQuestion: {}",
        passages.join("\n---\n"),
        question
    )
}

/// User message asking for a structured segment from a sub-answer.
pub fn segment_output_prompt(answer: &SubAnswer) -> String {
    format!(
        "Analyze this segment of the problem:\n\n{}",
        answer.to_node_text()
    )
}

/// User message folding a segment into the running summary.
pub fn running_summary_prompt(current_summary: &str, output: &SegmentOutput) -> String {
    let new_information = serde_json::to_string(output).unwrap_or_else(|_| output.key_findings.join("; "));
    let current = if current_summary.is_empty() {
        "(none yet)"
    } else {
        current_summary
    };
    format!(
        "Current summary: {}\n\nNew information: {}\n\nProvide an updated summary.",
        current, new_information
    )
}

/// User message asking for the final response.
pub fn synthesis_prompt(query: &str, steps: &[AnalysisStep], context: &str) -> String {
    let answers = steps
        .iter()
        .map(|step| format!("Q: {}\nA: {}", step.query, step.response))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "Question: {}\n\nSub-question answers:\n{}\n\nAnalysis context:\n{}",
        query, answers, context
    )
}

/// User message asking for the meta-analysis of a run.
pub fn meta_analysis_prompt(steps: &[AnalysisStep], final_response: &str) -> String {
    let steps_json = serde_json::to_string_pretty(steps).unwrap_or_else(|_| "[]".to_string());
    format!(
        "Analysis steps:\n{}\n\nFinal response:\n{}",
        steps_json, final_response
    )
}

/// User message asking for the end-of-session summary.
pub fn session_summary_prompt(running_summary: &str, findings: &[String]) -> String {
    format!(
        "Running summary:\n{}\n\nAll findings:\n{}",
        running_summary,
        findings
            .iter()
            .map(|f| format!("- {}", f))
            .collect::<Vec<_>>()
            .join("\n")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_prompts_demand_json() {
        for task in ReasoningTask::ALL {
            let prompt = system_prompt(task);
            assert!(!prompt.is_empty());
            if task.expects_json() {
                assert!(prompt.contains("valid JSON"), "{} prompt", task);
            }
        }
    }

    #[test]
    fn test_segment_prompt_lists_every_field() {
        for field in [
            "key_findings",
            "relevant_data",
            "next_steps",
            "confidence_score",
            "critical_assumptions",
            "required_data",
            "external_review_required",
        ] {
            assert!(SEGMENT_OUTPUT_PROMPT.contains(field), "missing {}", field);
        }
    }

    #[test]
    fn test_decomposition_prompt_lists_tools() {
        let tools = vec![ToolMetadata {
            name: "problem_context".to_string(),
            description: "Problem description and literature".to_string(),
        }];
        let prompt = decomposition_prompt("Margins are falling", &tools, "Why?");
        assert!(prompt.contains("- problem_context: Problem description and literature"));
        assert!(prompt.contains("Margins are falling"));
        assert!(prompt.ends_with("Why?"));
    }

    #[test]
    fn test_segment_prompt_uses_node_text() {
        let prompt = segment_output_prompt(&SubAnswer::new("Q1", "A1"));
        assert!(prompt.contains("Sub question: Q1\nResponse: A1"));
    }

    #[test]
    fn test_answer_prompt_without_passages() {
        let prompt = answer_prompt("What?", &[]);
        assert!(prompt.contains("no matching passages"));
    }

    #[test]
    fn test_running_summary_prompt_marks_empty_summary() {
        let output = SegmentOutput {
            key_findings: vec!["Costs up".to_string()],
            relevant_data: Default::default(),
            next_steps: vec![],
            confidence_score: 0.5,
            critical_assumptions: vec![],
            required_data: vec![],
            external_review_required: false,
        };
        let prompt = running_summary_prompt("", &output);
        assert!(prompt.starts_with("Current summary: (none yet)"));
        assert!(prompt.contains("Costs up"));
    }
}
