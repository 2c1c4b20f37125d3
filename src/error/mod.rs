use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Langbase error: {0}")]
    Langbase(#[from] LangbaseError),

    #[error("Analysis error: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("MCP protocol error: {0}")]
    Mcp(#[from] McpError),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Storage layer errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database connection failed: {message}")]
    Connection { message: String },

    #[error("Query failed: {message}")]
    Query { message: String },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Migration failed: {message}")]
    Migration { message: String },

    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// Langbase API errors
#[derive(Debug, Error)]
pub enum LangbaseError {
    #[error("Langbase unavailable: {message} (retries: {retries})")]
    Unavailable { message: String, retries: u32 },

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Why a reasoning-service response could not be turned into a typed value.
#[derive(Debug, Error)]
pub enum ParseFailure {
    #[error("no JSON found: {0}")]
    NoJson(String),

    #[error("JSON decode failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{field} = {value} is outside [0, 1]")]
    OutOfRange { field: &'static str, value: f64 },
}

/// Errors raised by the analysis pipeline and the simulation engine.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Unsupported distribution: {name}")]
    InvalidDistribution { name: String },

    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("Malformed segment output: {cause}")]
    MalformedSegmentOutput {
        #[source]
        cause: ParseFailure,
        raw: String,
    },

    #[error("Malformed meta-analysis: {cause}")]
    MalformedMetaAnalysis {
        #[source]
        cause: ParseFailure,
        raw: String,
    },

    #[error("Malformed sub-question list: {cause}")]
    MalformedSubQuestions {
        #[source]
        cause: ParseFailure,
        raw: String,
    },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Upstream service unavailable: {message}")]
    UpstreamUnavailable { message: String },

    #[error("Analysis cancelled during {stage}")]
    Cancelled { stage: &'static str },
}

impl AnalysisError {
    /// HTTP-style status code reported at the invocation boundary.
    pub fn status_code(&self) -> u16 {
        match self {
            AnalysisError::InvalidDistribution { .. } | AnalysisError::InvalidArgument { .. } => {
                400
            }
            AnalysisError::NotFound { .. } => 404,
            AnalysisError::MalformedSegmentOutput { .. }
            | AnalysisError::MalformedMetaAnalysis { .. }
            | AnalysisError::MalformedSubQuestions { .. } => 422,
            AnalysisError::Cancelled { .. } => 499,
            AnalysisError::UpstreamUnavailable { .. } => 502,
        }
    }

    /// Raw reasoning-service text attached to a parse failure, if any.
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            AnalysisError::MalformedSegmentOutput { raw, .. }
            | AnalysisError::MalformedMetaAnalysis { raw, .. }
            | AnalysisError::MalformedSubQuestions { raw, .. } => Some(raw),
            _ => None,
        }
    }

    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        AnalysisError::InvalidArgument {
            message: message.into(),
        }
    }
}

impl From<LangbaseError> for AnalysisError {
    fn from(err: LangbaseError) -> Self {
        AnalysisError::UpstreamUnavailable {
            message: err.to_string(),
        }
    }
}

impl From<StorageError> for AnalysisError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { entity, id } => AnalysisError::NotFound { entity, id },
            other => AnalysisError::UpstreamUnavailable {
                message: other.to_string(),
            },
        }
    }
}

/// MCP protocol errors
#[derive(Debug, Error)]
pub enum McpError {
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Unknown tool: {tool_name}")]
    UnknownTool { tool_name: String },

    #[error("Invalid parameters for {tool_name}: {message}")]
    InvalidParameters { tool_name: String, message: String },

    #[error("Tool execution failed: {message}")]
    ExecutionFailed { message: String },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<AppError> for McpError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::Analysis(inner) => inner.into(),
            other => McpError::ExecutionFailed {
                message: other.to_string(),
            },
        }
    }
}

impl From<AnalysisError> for McpError {
    fn from(err: AnalysisError) -> Self {
        McpError::ExecutionFailed {
            message: format!("{} (status {})", err, err.status_code()),
        }
    }
}

impl From<StorageError> for McpError {
    fn from(err: StorageError) -> Self {
        AnalysisError::from(err).into()
    }
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type alias for Langbase operations
pub type LangbaseResult<T> = Result<T, LangbaseError>;

/// Result type alias for MCP operations
pub type McpResult<T> = Result<T, McpError>;

/// Result type alias for pipeline and simulation operations
pub type AnalysisResult<T> = Result<T, AnalysisError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_app_error_display() {
        let err = AppError::Config {
            message: "missing key".to_string(),
        };
        assert_eq!(err.to_string(), "Configuration error: missing key");

        let err = AppError::Internal {
            message: "unexpected".to_string(),
        };
        assert_eq!(err.to_string(), "Internal error: unexpected");
    }

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::Connection {
            message: "failed to connect".to_string(),
        };
        assert_eq!(err.to_string(), "Database connection failed: failed to connect");

        let err = StorageError::NotFound {
            entity: "Problem",
            id: "p-123".to_string(),
        };
        assert_eq!(err.to_string(), "Problem not found: p-123");

        let err = StorageError::Migration {
            message: "version mismatch".to_string(),
        };
        assert_eq!(err.to_string(), "Migration failed: version mismatch");
    }

    #[test]
    fn test_langbase_error_display() {
        let err = LangbaseError::Unavailable {
            message: "server down".to_string(),
            retries: 3,
        };
        assert_eq!(err.to_string(), "Langbase unavailable: server down (retries: 3)");

        let err = LangbaseError::Api {
            status: 401,
            message: "unauthorized".to_string(),
        };
        assert_eq!(err.to_string(), "API error: 401 - unauthorized");

        let err = LangbaseError::Timeout { timeout_ms: 5000 };
        assert_eq!(err.to_string(), "Request timeout after 5000ms");
    }

    #[test]
    fn test_analysis_error_status_codes() {
        assert_eq!(
            AnalysisError::InvalidDistribution {
                name: "exponential".to_string()
            }
            .status_code(),
            400
        );
        assert_eq!(AnalysisError::invalid_argument("iterations").status_code(), 400);
        assert_eq!(
            AnalysisError::NotFound {
                entity: "Assumption",
                id: "a1".to_string()
            }
            .status_code(),
            404
        );
        assert_eq!(
            AnalysisError::MalformedMetaAnalysis {
                cause: ParseFailure::OutOfRange {
                    field: "consistency_score",
                    value: 2.0
                },
                raw: "{}".to_string()
            }
            .status_code(),
            422
        );
        assert_eq!(AnalysisError::Cancelled { stage: "answer" }.status_code(), 499);
        assert_eq!(
            AnalysisError::UpstreamUnavailable {
                message: "down".to_string()
            }
            .status_code(),
            502
        );
    }

    #[test]
    fn test_malformed_output_keeps_source_and_raw_text() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err = AnalysisError::MalformedSegmentOutput {
            cause: ParseFailure::Json(json_err),
            raw: "{not json".to_string(),
        };

        assert!(err.source().is_some());
        assert_eq!(err.raw_response(), Some("{not json"));
        assert!(err.to_string().starts_with("Malformed segment output: JSON decode failed"));
    }

    #[test]
    fn test_out_of_range_display() {
        let cause = ParseFailure::OutOfRange {
            field: "confidence_score",
            value: 1.5,
        };
        assert_eq!(cause.to_string(), "confidence_score = 1.5 is outside [0, 1]");
    }

    #[test]
    fn test_langbase_error_becomes_upstream_unavailable() {
        let err: AnalysisError = LangbaseError::Timeout { timeout_ms: 1000 }.into();
        assert!(matches!(err, AnalysisError::UpstreamUnavailable { .. }));
        assert!(err.to_string().contains("1000ms"));
    }

    #[test]
    fn test_storage_not_found_maps_to_analysis_not_found() {
        let err: AnalysisError = StorageError::NotFound {
            entity: "Problem",
            id: "missing".to_string(),
        }
        .into();
        assert!(matches!(err, AnalysisError::NotFound { entity: "Problem", .. }));
    }

    #[test]
    fn test_analysis_error_to_mcp_error_includes_status() {
        let err: McpError = AnalysisError::InvalidDistribution {
            name: "exponential".to_string(),
        }
        .into();
        assert!(matches!(err, McpError::ExecutionFailed { .. }));
        assert_eq!(
            err.to_string(),
            "Tool execution failed: Unsupported distribution: exponential (status 400)"
        );
    }

    #[test]
    fn test_app_error_conversion_to_mcp_error() {
        let app_err = AppError::Config {
            message: "test error".to_string(),
        };
        let mcp_err: McpError = app_err.into();
        assert!(matches!(mcp_err, McpError::ExecutionFailed { .. }));
        assert!(mcp_err.to_string().contains("Configuration error"));

        let app_err = AppError::Analysis(AnalysisError::Cancelled { stage: "synthesize" });
        let mcp_err: McpError = app_err.into();
        assert!(mcp_err.to_string().contains("status 499"));
    }

    #[test]
    fn test_mcp_error_conversion_to_app_error() {
        let mcp_err = McpError::UnknownTool {
            tool_name: "test".to_string(),
        };
        let app_err: AppError = mcp_err.into();
        assert!(matches!(app_err, AppError::Mcp(_)));
    }
}
