//! MCP protocol implementation for JSON-RPC 2.0 communication.
//!
//! This module provides the core MCP server implementation including:
//! - JSON-RPC 2.0 request/response handling
//! - Tool definitions and schemas
//! - Stdio-based server communication

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, error, info};

use super::{handle_tool_call, SharedState};
use crate::error::McpError;

#[cfg(test)]
#[path = "mcp_tests.rs"]
mod mcp_tests;

/// MCP protocol revision this server speaks.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// JSON-RPC 2.0 request structure.
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    /// JSON-RPC version (must be "2.0").
    pub jsonrpc: String,
    /// Request identifier (None for notifications).
    pub id: Option<Value>,
    /// The method name to invoke.
    pub method: String,
    /// Optional parameters for the method.
    #[serde(default)]
    pub params: Option<Value>,
}

/// JSON-RPC 2.0 response structure.
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    /// JSON-RPC version (always "2.0").
    pub jsonrpc: String,
    /// Request identifier; null when the request could not be parsed.
    pub id: Value,
    /// The result on success (mutually exclusive with error).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// The error on failure (mutually exclusive with result).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// MCP server information returned during initialization.
#[derive(Debug, Serialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

/// MCP server capabilities advertised to clients.
#[derive(Debug, Serialize)]
pub struct Capabilities {
    pub tools: ToolCapabilities,
}

/// Tool-specific capabilities.
#[derive(Debug, Serialize)]
pub struct ToolCapabilities {
    #[serde(rename = "listChanged")]
    pub list_changed: bool,
}

/// Result of the MCP initialize handshake.
#[derive(Debug, Serialize)]
pub struct InitializeResult {
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    pub capabilities: Capabilities,
    #[serde(rename = "serverInfo")]
    pub server_info: ServerInfo,
}

/// MCP tool definition with JSON Schema.
#[derive(Debug, Clone, Serialize)]
pub struct Tool {
    /// Unique tool name (used in tool calls).
    pub name: String,
    pub description: String,
    /// JSON Schema for the tool's input parameters.
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Parameters for a tools/call request.
#[derive(Debug, Deserialize)]
pub struct ToolCallParams {
    pub name: String,
    #[serde(default)]
    pub arguments: Option<Value>,
}

/// Content item within a tool result.
#[derive(Debug, Serialize)]
pub struct ToolResultContent {
    #[serde(rename = "type")]
    pub content_type: String,
    pub text: String,
}

/// Result of a tool invocation.
#[derive(Debug, Serialize)]
pub struct ToolCallResult {
    pub content: Vec<ToolResultContent>,
    /// Set when the tool failed; the text then starts with `Error: `.
    #[serde(rename = "isError", skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

impl JsonRpcResponse {
    /// Create a success response
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: id.unwrap_or(Value::Null),
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response
    pub fn error(id: Option<Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: id.unwrap_or(Value::Null),
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }
}

impl ToolCallResult {
    fn text(text: String, is_error: bool) -> Self {
        Self {
            content: vec![ToolResultContent {
                content_type: "text".to_string(),
                text,
            }],
            is_error: is_error.then_some(true),
        }
    }
}

/// Text shown to the client for a failed tool call.
///
/// Execution failures carry their own `<message> (status <code>)` text.
fn tool_error_text(err: &McpError) -> String {
    match err {
        McpError::ExecutionFailed { message } => format!("Error: {}", message),
        other => format!("Error: {}", other),
    }
}

/// MCP Server running over stdio.
pub struct McpServer {
    state: SharedState,
}

impl McpServer {
    /// Create a new MCP server
    pub fn new(state: SharedState) -> Self {
        Self { state }
    }

    /// Run the server using async stdio until stdin closes.
    pub async fn run(&self) -> std::io::Result<()> {
        info!("Consulting analysis MCP server starting...");

        let stdin = tokio::io::stdin();
        let mut stdout = tokio::io::stdout();
        let mut reader = BufReader::new(stdin);
        let mut line = String::new();

        loop {
            line.clear();
            let bytes_read = reader.read_line(&mut line).await?;

            if bytes_read == 0 {
                info!("EOF received, shutting down");
                break;
            }

            if let Some(response) = self.handle_line(&line).await {
                let response_json = serde_json::to_string(&response)?;
                debug!(response = %response_json, "Sending response");

                stdout.write_all(response_json.as_bytes()).await?;
                stdout.write_all(b"\n").await?;
                stdout.flush().await?;
            }
        }

        Ok(())
    }

    /// Handle one line of input.
    ///
    /// Returns `None` for blank lines and notifications.
    pub async fn handle_line(&self, line: &str) -> Option<JsonRpcResponse> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }

        debug!(request = %trimmed, "Received request");

        match serde_json::from_str::<JsonRpcRequest>(trimmed) {
            Ok(request) => self.handle_request(request).await,
            Err(e) => {
                error!(error = %e, "Failed to parse request");
                Some(JsonRpcResponse::error(
                    None,
                    -32700,
                    format!("Parse error: {}", e),
                ))
            }
        }
    }

    async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let is_notification = request.id.is_none();

        match request.method.as_str() {
            "initialize" => Some(self.handle_initialize(request.id)),
            "initialized" | "notifications/initialized" | "notifications/cancelled" => {
                debug!(method = %request.method, "Received notification");
                None
            }
            "tools/list" => Some(self.handle_tools_list(request.id)),
            "tools/call" => Some(self.handle_tool_call(request.id, request.params).await),
            "ping" => Some(JsonRpcResponse::success(
                request.id,
                Value::Object(Default::default()),
            )),
            method => {
                if is_notification {
                    debug!(method = %method, "Unknown notification, ignoring");
                    None
                } else {
                    error!(method = %method, "Unknown method");
                    Some(JsonRpcResponse::error(
                        request.id,
                        -32601,
                        format!("Method not found: {}", method),
                    ))
                }
            }
        }
    }

    fn handle_initialize(&self, id: Option<Value>) -> JsonRpcResponse {
        info!("Handling initialize request");

        let result = InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: Capabilities {
                tools: ToolCapabilities {
                    list_changed: false,
                },
            },
            server_info: ServerInfo {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        };

        match serde_json::to_value(result) {
            Ok(val) => JsonRpcResponse::success(id, val),
            Err(e) => {
                error!(error = %e, "Failed to serialize initialize result");
                JsonRpcResponse::error(id, -32603, format!("Internal error: {}", e))
            }
        }
    }

    fn handle_tools_list(&self, id: Option<Value>) -> JsonRpcResponse {
        info!("Handling tools/list request");
        JsonRpcResponse::success(id, json!({ "tools": tool_definitions() }))
    }

    async fn handle_tool_call(&self, id: Option<Value>, params: Option<Value>) -> JsonRpcResponse {
        let params: ToolCallParams = match params {
            Some(p) => match serde_json::from_value(p) {
                Ok(p) => p,
                Err(e) => {
                    return JsonRpcResponse::error(id, -32602, format!("Invalid params: {}", e));
                }
            },
            None => {
                return JsonRpcResponse::error(id, -32602, "Missing params");
            }
        };

        let tool_result =
            match handle_tool_call(&self.state, &params.name, params.arguments).await {
                Ok(result) => match serde_json::to_string_pretty(&result) {
                    Ok(text) => ToolCallResult::text(text, false),
                    Err(e) => {
                        error!(error = %e, "Failed to serialize tool result");
                        ToolCallResult::text(format!("Error: serialization failed: {}", e), true)
                    }
                },
                Err(e) => ToolCallResult::text(tool_error_text(&e), true),
            };

        match serde_json::to_value(tool_result) {
            Ok(val) => JsonRpcResponse::success(id, val),
            Err(e) => {
                error!(error = %e, "Failed to serialize tool call result");
                JsonRpcResponse::error(id, -32603, format!("Internal error: {}", e))
            }
        }
    }
}

/// Every tool this server exposes, in listing order.
pub fn tool_definitions() -> Vec<Tool> {
    vec![
        problem_create_tool(),
        problem_get_tool(),
        problem_list_tool(),
        segment_create_tool(),
        segment_list_tool(),
        segment_update_tool(),
        segment_tree_tool(),
        relationship_create_tool(),
        literature_review_create_tool(),
        literature_review_list_tool(),
        literature_review_update_tool(),
        literature_review_delete_tool(),
        assumption_create_tool(),
        assumption_list_tool(),
        milestone_create_tool(),
        milestone_list_tool(),
        milestone_update_tool(),
        analysis_run_tool(),
        analysis_results_tool(),
        simulation_run_tool(),
    ]
}

fn tool(name: &str, description: &str, properties: Value, required: &[&str]) -> Tool {
    Tool {
        name: name.to_string(),
        description: description.to_string(),
        input_schema: json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false
        }),
    }
}

fn problem_id_property() -> Value {
    json!({
        "type": "string",
        "description": "ID of the problem"
    })
}

fn problem_scoped_tool(name: &str, description: &str) -> Tool {
    tool(
        name,
        description,
        json!({ "problem_id": problem_id_property() }),
        &["problem_id"],
    )
}

fn problem_create_tool() -> Tool {
    tool(
        "problem_create",
        "Register a client problem to decompose and analyze.",
        json!({
            "title": { "type": "string", "description": "Short problem title" },
            "description": { "type": "string", "description": "Full problem statement" },
            "client": { "type": "string", "description": "Client the problem belongs to" },
            "status": { "type": "string", "description": "Initial status (default: Open)" }
        }),
        &["title", "description", "client"],
    )
}

fn problem_get_tool() -> Tool {
    problem_scoped_tool("problem_get", "Fetch a problem, including its critical path.")
}

fn problem_list_tool() -> Tool {
    tool(
        "problem_list",
        "List problems, newest first.",
        json!({
            "skip": { "type": "integer", "minimum": 0, "description": "Problems to skip" },
            "limit": { "type": "integer", "minimum": 1, "description": "Maximum problems to return (default: 100)" }
        }),
        &[],
    )
}

fn segment_create_tool() -> Tool {
    tool(
        "segment_create",
        "Add a segment to a problem's decomposition tree.",
        json!({
            "problem_id": problem_id_property(),
            "title": { "type": "string" },
            "description": { "type": "string" },
            "parent_id": { "type": "string", "description": "Parent segment; omit for a root" },
            "potential_solution": { "type": "string" },
            "status": { "type": "string", "description": "Segment status (default: Pending)" },
            "critical_assumptions": { "type": "array", "items": { "type": "string" } },
            "required_data": { "type": "array", "items": { "type": "string" } },
            "external_review_required": { "type": "boolean" }
        }),
        &["problem_id", "title", "description"],
    )
}

fn segment_list_tool() -> Tool {
    problem_scoped_tool("segment_list", "List every segment of a problem.")
}

fn segment_update_tool() -> Tool {
    tool(
        "segment_update",
        "Update a segment. Omitted fields are unchanged; re-parenting is checked for cycles.",
        json!({
            "segment_id": { "type": "string" },
            "title": { "type": "string" },
            "description": { "type": "string" },
            "analysis": { "type": "string" },
            "potential_solution": { "type": "string" },
            "status": { "type": "string" },
            "parent_id": { "type": "string", "description": "New parent segment" },
            "detach": { "type": "boolean", "description": "Make the segment a root" },
            "progress": { "type": "number", "minimum": 0, "maximum": 1 },
            "external_review_required": { "type": "boolean" },
            "external_review_status": { "type": "string" }
        }),
        &["segment_id"],
    )
}

fn segment_tree_tool() -> Tool {
    problem_scoped_tool(
        "segment_tree",
        "Return a problem's segments as a nested tree, roots first.",
    )
}

fn relationship_create_tool() -> Tool {
    tool(
        "relationship_create",
        "Link two segments of the same problem with a typed, directed relationship.",
        json!({
            "from_segment_id": { "type": "string" },
            "to_segment_id": { "type": "string" },
            "relationship_type": { "type": "string", "description": "e.g. depends_on, contradicts" },
            "description": { "type": "string" }
        }),
        &["from_segment_id", "to_segment_id", "relationship_type"],
    )
}

fn literature_review_create_tool() -> Tool {
    tool(
        "literature_review_create",
        "Attach background reading to a problem. Reviews are searched during analysis.",
        json!({
            "problem_id": problem_id_property(),
            "title": { "type": "string" },
            "content": { "type": "string" },
            "source": { "type": "string", "description": "Citation or URL" }
        }),
        &["problem_id", "title", "content"],
    )
}

fn literature_review_list_tool() -> Tool {
    problem_scoped_tool("literature_review_list", "List a problem's literature reviews.")
}

fn literature_review_update_tool() -> Tool {
    tool(
        "literature_review_update",
        "Update a literature review. Omitted fields are unchanged.",
        json!({
            "review_id": { "type": "string" },
            "title": { "type": "string" },
            "content": { "type": "string" },
            "source": { "type": "string" }
        }),
        &["review_id"],
    )
}

fn literature_review_delete_tool() -> Tool {
    tool(
        "literature_review_delete",
        "Delete a literature review.",
        json!({ "review_id": { "type": "string" } }),
        &["review_id"],
    )
}

fn assumption_create_tool() -> Tool {
    tool(
        "assumption_create",
        "Record an uncertain numeric input for Monte Carlo simulation.",
        json!({
            "problem_id": problem_id_property(),
            "description": { "type": "string" },
            "min_value": { "type": "number" },
            "max_value": { "type": "number" },
            "distribution": {
                "type": "string",
                "enum": ["uniform", "normal", "triangular"],
                "description": "Sampling distribution (default: uniform)"
            },
            "impact_area": { "type": "string", "description": "Key the sampled value is reported under" }
        }),
        &["problem_id", "description", "min_value", "max_value", "impact_area"],
    )
}

fn assumption_list_tool() -> Tool {
    problem_scoped_tool("assumption_list", "List a problem's assumptions.")
}

fn milestone_create_tool() -> Tool {
    tool(
        "milestone_create",
        "Add a dated deliverable to a problem.",
        json!({
            "problem_id": problem_id_property(),
            "title": { "type": "string" },
            "due_date": { "type": "string", "format": "date-time", "description": "RFC 3339 timestamp" }
        }),
        &["problem_id", "title", "due_date"],
    )
}

fn milestone_list_tool() -> Tool {
    problem_scoped_tool("milestone_list", "List a problem's milestones by due date.")
}

fn milestone_update_tool() -> Tool {
    tool(
        "milestone_update",
        "Update a milestone. Omitted fields are unchanged.",
        json!({
            "milestone_id": { "type": "string" },
            "title": { "type": "string" },
            "due_date": { "type": "string", "format": "date-time" },
            "completed": { "type": "boolean" }
        }),
        &["milestone_id"],
    )
}

fn analysis_run_tool() -> Tool {
    tool(
        "analysis_run",
        "Decompose a question about a problem into sub-questions, answer each from the problem \
         description and literature reviews, synthesize a final response, and score the run. \
         Each kept step is stored as a segment.",
        json!({
            "problem_id": problem_id_property(),
            "query": { "type": "string", "description": "The question to analyze" }
        }),
        &["problem_id", "query"],
    )
}

fn analysis_results_tool() -> Tool {
    problem_scoped_tool(
        "analysis_results",
        "List saved analysis outcomes for a problem, newest first.",
    )
}

fn simulation_run_tool() -> Tool {
    tool(
        "simulation_run",
        "Run a Monte Carlo simulation over assumptions and summarize each impact area \
         (mean, median, std_dev, 5th and 95th percentiles).",
        json!({
            "problem_id": { "type": "string", "description": "Use this problem's assumptions, or check that the listed ones belong to it" },
            "assumptions": { "type": "array", "items": { "type": "string" }, "description": "Assumption IDs to sample" },
            "iterations": { "type": "integer", "minimum": 1, "description": "Number of trials (default from configuration)" }
        }),
        &[],
    )
}
