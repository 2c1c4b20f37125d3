use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Instant;
use tracing::{info, warn};

use super::SharedState;
use crate::error::{McpError, McpResult};
use crate::services::{
    AnalyzeParams, AssumptionCreateParams, MilestoneCreateParams, MilestoneUpdateParams,
    ProblemCreateParams, RelationshipCreateParams, ReviewCreateParams, ReviewUpdateParams,
    SegmentCreateParams, SegmentUpdateParams, SimulationParams,
};

/// Arguments of tools that address a single problem
#[derive(Debug, Deserialize)]
struct ProblemIdParams {
    problem_id: String,
}

/// Arguments of `problem_list`
#[derive(Debug, Deserialize)]
struct ProblemListParams {
    #[serde(default)]
    skip: u32,
    #[serde(default = "default_limit")]
    limit: u32,
}

fn default_limit() -> u32 {
    100
}

#[derive(Debug, Deserialize)]
struct ReviewIdParams {
    review_id: String,
}

/// Route tool calls to appropriate handlers
pub async fn handle_tool_call(
    state: &SharedState,
    tool_name: &str,
    arguments: Option<Value>,
) -> McpResult<Value> {
    info!(tool = %tool_name, "Routing tool call");
    let start = Instant::now();

    let result = match tool_name {
        // Problems
        "problem_create" => handle_problem_create(state, arguments).await,
        "problem_get" => handle_problem_get(state, arguments).await,
        "problem_list" => handle_problem_list(state, arguments).await,
        // Segments and relationships
        "segment_create" => handle_segment_create(state, arguments).await,
        "segment_list" => handle_segment_list(state, arguments).await,
        "segment_update" => handle_segment_update(state, arguments).await,
        "segment_tree" => handle_segment_tree(state, arguments).await,
        "relationship_create" => handle_relationship_create(state, arguments).await,
        // Literature reviews
        "literature_review_create" => handle_review_create(state, arguments).await,
        "literature_review_list" => handle_review_list(state, arguments).await,
        "literature_review_update" => handle_review_update(state, arguments).await,
        "literature_review_delete" => handle_review_delete(state, arguments).await,
        // Assumptions and milestones
        "assumption_create" => handle_assumption_create(state, arguments).await,
        "assumption_list" => handle_assumption_list(state, arguments).await,
        "milestone_create" => handle_milestone_create(state, arguments).await,
        "milestone_list" => handle_milestone_list(state, arguments).await,
        "milestone_update" => handle_milestone_update(state, arguments).await,
        // Analysis and simulation
        "analysis_run" => handle_analysis_run(state, arguments).await,
        "analysis_results" => handle_analysis_results(state, arguments).await,
        "simulation_run" => handle_simulation_run(state, arguments).await,
        _ => Err(McpError::UnknownTool {
            tool_name: tool_name.to_string(),
        }),
    };

    match &result {
        Ok(_) => info!(
            tool = %tool_name,
            latency_ms = start.elapsed().as_millis(),
            "Tool call succeeded"
        ),
        Err(e) => warn!(
            tool = %tool_name,
            error = %e,
            latency_ms = start.elapsed().as_millis(),
            "Tool call failed"
        ),
    }
    result
}

async fn handle_problem_create(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler("problem_create", arguments, |params: ProblemCreateParams| {
        state.records.create_problem(params)
    })
    .await
}

async fn handle_problem_get(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler("problem_get", arguments, |params: ProblemIdParams| async move {
        state.records.get_problem(&params.problem_id).await
    })
    .await
}

async fn handle_problem_list(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    // All fields are optional, so a call without arguments is valid
    let arguments = arguments.or_else(|| Some(Value::Object(Default::default())));
    execute_handler("problem_list", arguments, |params: ProblemListParams| async move {
        state.records.list_problems(params.skip, params.limit).await
    })
    .await
}

async fn handle_segment_create(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler("segment_create", arguments, |params: SegmentCreateParams| {
        state.records.create_segment(params)
    })
    .await
}

async fn handle_segment_list(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler("segment_list", arguments, |params: ProblemIdParams| async move {
        state.records.list_segments(&params.problem_id).await
    })
    .await
}

async fn handle_segment_update(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler("segment_update", arguments, |params: SegmentUpdateParams| {
        state.records.update_segment(params)
    })
    .await
}

async fn handle_segment_tree(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler("segment_tree", arguments, |params: ProblemIdParams| async move {
        state.records.segment_tree(&params.problem_id).await
    })
    .await
}

async fn handle_relationship_create(
    state: &SharedState,
    arguments: Option<Value>,
) -> McpResult<Value> {
    execute_handler(
        "relationship_create",
        arguments,
        |params: RelationshipCreateParams| state.records.create_relationship(params),
    )
    .await
}

async fn handle_review_create(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler("literature_review_create", arguments, |params: ReviewCreateParams| {
        state.records.create_review(params)
    })
    .await
}

async fn handle_review_list(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler("literature_review_list", arguments, |params: ProblemIdParams| async move {
        state.records.list_reviews(&params.problem_id).await
    })
    .await
}

async fn handle_review_update(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler("literature_review_update", arguments, |params: ReviewUpdateParams| {
        state.records.update_review(params)
    })
    .await
}

async fn handle_review_delete(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    #[derive(Serialize)]
    struct Deleted {
        review_id: String,
        deleted: bool,
    }

    execute_handler("literature_review_delete", arguments, |params: ReviewIdParams| async move {
        state.records.delete_review(&params.review_id).await?;
        Ok::<_, crate::error::AnalysisError>(Deleted {
            review_id: params.review_id,
            deleted: true,
        })
    })
    .await
}

async fn handle_assumption_create(
    state: &SharedState,
    arguments: Option<Value>,
) -> McpResult<Value> {
    execute_handler("assumption_create", arguments, |params: AssumptionCreateParams| {
        state.records.create_assumption(params)
    })
    .await
}

async fn handle_assumption_list(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler("assumption_list", arguments, |params: ProblemIdParams| async move {
        state.records.list_assumptions(&params.problem_id).await
    })
    .await
}

async fn handle_milestone_create(
    state: &SharedState,
    arguments: Option<Value>,
) -> McpResult<Value> {
    execute_handler("milestone_create", arguments, |params: MilestoneCreateParams| {
        state.records.create_milestone(params)
    })
    .await
}

async fn handle_milestone_list(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler("milestone_list", arguments, |params: ProblemIdParams| async move {
        state.records.list_milestones(&params.problem_id).await
    })
    .await
}

async fn handle_milestone_update(
    state: &SharedState,
    arguments: Option<Value>,
) -> McpResult<Value> {
    execute_handler("milestone_update", arguments, |params: MilestoneUpdateParams| {
        state.records.update_milestone(params)
    })
    .await
}

async fn handle_analysis_run(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler("analysis_run", arguments, |params: AnalyzeParams| {
        state.analysis.process(params, state.shutdown.clone())
    })
    .await
}

async fn handle_analysis_results(
    state: &SharedState,
    arguments: Option<Value>,
) -> McpResult<Value> {
    execute_handler("analysis_results", arguments, |params: ProblemIdParams| async move {
        state.analysis.results(&params.problem_id).await
    })
    .await
}

async fn handle_simulation_run(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    let arguments = arguments.or_else(|| Some(Value::Object(Default::default())));
    execute_handler("simulation_run", arguments, |params: SimulationParams| {
        state.simulation.process(params)
    })
    .await
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Helper to parse arguments with consistent error handling
fn parse_arguments<T: serde::de::DeserializeOwned>(
    tool_name: &str,
    arguments: Option<Value>,
) -> McpResult<T> {
    match arguments {
        Some(args) => serde_json::from_value(args).map_err(|e| McpError::InvalidParameters {
            tool_name: tool_name.to_string(),
            message: e.to_string(),
        }),
        None => Err(McpError::InvalidParameters {
            tool_name: tool_name.to_string(),
            message: "Missing arguments".to_string(),
        }),
    }
}

/// Parse arguments, run a service operation, and serialize its result.
///
/// Service errors keep their status code on the way to [`McpError`].
async fn execute_handler<P, R, E, F, Fut>(
    tool_name: &str,
    arguments: Option<Value>,
    operation: F,
) -> McpResult<Value>
where
    P: serde::de::DeserializeOwned,
    R: Serialize,
    E: Into<McpError>,
    F: FnOnce(P) -> Fut,
    Fut: std::future::Future<Output = Result<R, E>>,
{
    let params: P = parse_arguments(tool_name, arguments)?;
    let result = operation(params).await.map_err(Into::into)?;
    serde_json::to_value(result).map_err(McpError::Json)
}
