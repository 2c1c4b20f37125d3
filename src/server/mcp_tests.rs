//! Unit tests for MCP protocol implementation.
//!
//! Tests JSON-RPC 2.0 request/response handling, tool definitions,
//! and dispatch of tool calls through [`McpServer::handle_line`].

use super::*;
use crate::analysis::ReasoningTask;
use crate::server::test_state::create_test_state;
use crate::services::test_support::CannedReasoner;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::collections::HashSet;

// ============================================================================
// JsonRpcResponse tests
// ============================================================================

#[test]
fn test_jsonrpc_response_success_with_id() {
    let response = JsonRpcResponse::success(Some(json!(1)), json!({"result": "ok"}));

    assert_eq!(response.jsonrpc, "2.0");
    assert_eq!(response.id, json!(1));
    assert!(response.error.is_none());
    assert_eq!(response.result.unwrap()["result"], "ok");
}

#[test]
fn test_jsonrpc_response_success_without_id() {
    let response = JsonRpcResponse::success(None, json!({"data": "value"}));
    assert_eq!(response.id, Value::Null);
}

#[test]
fn test_jsonrpc_response_error() {
    let response = JsonRpcResponse::error(Some(json!("req-1")), -32601, "Method not found");
    let serialized = serde_json::to_string(&response).unwrap();

    assert!(serialized.contains("\"error\""));
    assert!(serialized.contains("-32601"));
    assert!(!serialized.contains("\"result\""));
}

#[test]
fn test_jsonrpc_notification_no_id() {
    let request: JsonRpcRequest =
        serde_json::from_str(r#"{"jsonrpc":"2.0","method":"initialized"}"#).unwrap();
    assert!(request.id.is_none());
    assert!(request.params.is_none());
}

#[test]
fn test_tool_call_params_without_arguments() {
    let params: ToolCallParams = serde_json::from_value(json!({"name": "problem_list"})).unwrap();
    assert_eq!(params.name, "problem_list");
    assert!(params.arguments.is_none());
}

// ============================================================================
// Tool definitions
// ============================================================================

#[test]
fn test_tool_names() {
    let names: Vec<String> = tool_definitions().into_iter().map(|t| t.name).collect();
    assert_eq!(
        names,
        vec![
            "problem_create",
            "problem_get",
            "problem_list",
            "segment_create",
            "segment_list",
            "segment_update",
            "segment_tree",
            "relationship_create",
            "literature_review_create",
            "literature_review_list",
            "literature_review_update",
            "literature_review_delete",
            "assumption_create",
            "assumption_list",
            "milestone_create",
            "milestone_list",
            "milestone_update",
            "analysis_run",
            "analysis_results",
            "simulation_run",
        ]
    );
}

#[test]
fn test_tool_names_are_unique() {
    let tools = tool_definitions();
    let names: HashSet<_> = tools.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names.len(), tools.len());
}

#[test]
fn test_all_tools_have_object_schemas() {
    for tool in tool_definitions() {
        let schema = &tool.input_schema;
        assert_eq!(schema["type"], "object", "{}", tool.name);
        assert_eq!(schema["additionalProperties"], false, "{}", tool.name);

        let properties = schema["properties"].as_object().unwrap();
        for required in schema["required"].as_array().unwrap() {
            let field = required.as_str().unwrap();
            assert!(
                properties.contains_key(field),
                "{} requires undeclared field {}",
                tool.name,
                field
            );
        }
    }
}

#[test]
fn test_assumption_tool_lists_distributions() {
    let tool = tool_definitions()
        .into_iter()
        .find(|t| t.name == "assumption_create")
        .unwrap();
    assert_eq!(
        tool.input_schema["properties"]["distribution"]["enum"],
        json!(["uniform", "normal", "triangular"])
    );
}

#[test]
fn test_tool_serialization_format() {
    let value = serde_json::to_value(&tool_definitions()[0]).unwrap();
    assert!(value.get("inputSchema").is_some());
    assert!(value.get("input_schema").is_none());
}

#[test]
fn test_tool_call_result_serialization() {
    let ok = serde_json::to_value(ToolCallResult::text("{}".to_string(), false)).unwrap();
    assert!(ok.get("isError").is_none());
    assert_eq!(ok["content"][0]["type"], "text");

    let failed = serde_json::to_value(ToolCallResult::text("Error: x".to_string(), true)).unwrap();
    assert_eq!(failed["isError"], true);
}

#[test]
fn test_tool_error_text() {
    let err = McpError::from(crate::error::AnalysisError::NotFound {
        entity: "Problem",
        id: "p9".to_string(),
    });
    assert_eq!(tool_error_text(&err), "Error: Problem not found: p9 (status 404)");

    let err = McpError::UnknownTool {
        tool_name: "nope".to_string(),
    };
    assert_eq!(tool_error_text(&err), "Error: Unknown tool: nope");
}

// ============================================================================
// Request dispatch
// ============================================================================

async fn server() -> McpServer {
    McpServer::new(create_test_state(CannedReasoner::default()).await)
}

async fn call(server: &McpServer, id: u64, name: &str, arguments: Value) -> Value {
    let line = json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "tools/call",
        "params": { "name": name, "arguments": arguments }
    })
    .to_string();
    let response = server.handle_line(&line).await.unwrap();
    assert_eq!(response.id, json!(id));
    response.result.unwrap()
}

fn payload(result: &Value) -> Value {
    serde_json::from_str(result["content"][0]["text"].as_str().unwrap()).unwrap()
}

#[tokio::test]
async fn test_initialize_and_ping() {
    let server = server().await;

    let response = server
        .handle_line(r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#)
        .await
        .unwrap();
    let result = response.result.unwrap();
    assert_eq!(result["protocolVersion"], PROTOCOL_VERSION);
    assert_eq!(result["serverInfo"]["name"], "consulting-analysis");

    let response = server
        .handle_line(r#"{"jsonrpc":"2.0","id":2,"method":"ping"}"#)
        .await
        .unwrap();
    assert_eq!(response.result.unwrap(), json!({}));
}

#[tokio::test]
async fn test_notifications_and_blank_lines_get_no_response() {
    let server = server().await;
    assert!(server
        .handle_line(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
        .await
        .is_none());
    assert!(server
        .handle_line(r#"{"jsonrpc":"2.0","method":"something/else"}"#)
        .await
        .is_none());
    assert!(server.handle_line("   \n").await.is_none());
}

#[tokio::test]
async fn test_parse_error_and_unknown_method() {
    let server = server().await;

    let response = server.handle_line("{not json").await.unwrap();
    assert_eq!(response.error.unwrap().code, -32700);

    let response = server
        .handle_line(r#"{"jsonrpc":"2.0","id":3,"method":"resources/list"}"#)
        .await
        .unwrap();
    assert_eq!(response.error.unwrap().code, -32601);
}

#[tokio::test]
async fn test_tools_list_response() {
    let server = server().await;
    let response = server
        .handle_line(r#"{"jsonrpc":"2.0","id":4,"method":"tools/list"}"#)
        .await
        .unwrap();
    let tools = response.result.unwrap()["tools"].as_array().unwrap().len();
    assert_eq!(tools, tool_definitions().len());
}

#[tokio::test]
async fn test_tools_call_missing_params() {
    let server = server().await;
    let response = server
        .handle_line(r#"{"jsonrpc":"2.0","id":5,"method":"tools/call"}"#)
        .await
        .unwrap();
    assert_eq!(response.error.unwrap().code, -32602);
}

#[tokio::test]
async fn test_problem_round_trip_over_tools() {
    let server = server().await;

    let created = call(
        &server,
        1,
        "problem_create",
        json!({"title": "Churn", "description": "Subscribers leave after month 3", "client": "Acme"}),
    )
    .await;
    assert!(created.get("isError").is_none());
    let problem_id = payload(&created)["id"].as_str().unwrap().to_string();

    let fetched = call(&server, 2, "problem_get", json!({"problem_id": problem_id})).await;
    assert_eq!(payload(&fetched)["title"], "Churn");

    let listed = call(&server, 3, "problem_list", Value::Null).await;
    assert_eq!(payload(&listed).as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_core_error_carries_status() {
    let server = server().await;

    let result = call(&server, 1, "problem_get", json!({"problem_id": "ghost"})).await;
    assert_eq!(result["isError"], true);
    assert_eq!(
        result["content"][0]["text"],
        "Error: Problem not found: ghost (status 404)"
    );

    let result = call(&server, 2, "no_such_tool", json!({})).await;
    assert_eq!(result["isError"], true);
    assert_eq!(result["content"][0]["text"], "Error: Unknown tool: no_such_tool");
}

#[tokio::test]
async fn test_simulation_over_tools() {
    let server = server().await;

    let problem = payload(
        &call(
            &server,
            1,
            "problem_create",
            json!({"title": "Launch", "description": "Entry into DACH", "client": "Acme"}),
        )
        .await,
    );
    let problem_id = problem["id"].as_str().unwrap();

    let result = call(
        &server,
        2,
        "assumption_create",
        json!({
            "problem_id": problem_id,
            "description": "Market size",
            "min_value": 10.0,
            "max_value": 20.0,
            "impact_area": "revenue"
        }),
    )
    .await;
    let assumption_id = payload(&result)["id"].as_str().unwrap().to_string();

    let result = call(
        &server,
        3,
        "simulation_run",
        json!({"assumptions": [assumption_id], "iterations": 50}),
    )
    .await;
    let simulation = payload(&result);
    assert_eq!(simulation["iterations"], 50);
    assert_eq!(simulation["results"].as_array().unwrap().len(), 50);
    let mean = simulation["summary"]["revenue"]["mean"].as_f64().unwrap();
    assert!((10.0..=20.0).contains(&mean));

    let result = call(
        &server,
        4,
        "assumption_create",
        json!({
            "problem_id": problem_id,
            "description": "Churn",
            "min_value": 0.1,
            "max_value": 0.2,
            "distribution": "exponential",
            "impact_area": "retention"
        }),
    )
    .await;
    assert_eq!(
        result["content"][0]["text"],
        "Error: Unsupported distribution: exponential (status 400)"
    );
}

#[tokio::test]
async fn test_analysis_run_upstream_failure_is_tool_error() {
    // Only decomposition is scripted; the first answer fails upstream
    let reasoner = CannedReasoner::default().with(
        ReasoningTask::QuestionGeneration,
        r#"{"items": [{"sub_question": "Who churns?", "tool_name": "problem_context"}]}"#,
    );
    let server = McpServer::new(create_test_state(reasoner).await);

    let problem = payload(
        &call(
            &server,
            1,
            "problem_create",
            json!({"title": "Churn", "description": "Subscribers leave", "client": "Acme"}),
        )
        .await,
    );

    let result = call(
        &server,
        2,
        "analysis_run",
        json!({"problem_id": problem["id"], "query": "Why do subscribers leave?"}),
    )
    .await;
    assert_eq!(result["isError"], true);
    assert!(result["content"][0]["text"]
        .as_str()
        .unwrap()
        .ends_with("(status 502)"));
}
