use std::env;
use std::path::PathBuf;

use crate::error::AppError;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub langbase: LangbaseConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub request: RequestConfig,
    pub pipes: PipeConfig,
    pub pipeline: PipelineConfig,
    pub simulation: SimulationConfig,
}

/// Langbase API configuration
#[derive(Debug, Clone)]
pub struct LangbaseConfig {
    pub api_key: String,
    pub base_url: String,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub max_connections: u32,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// HTTP request configuration.
///
/// This is the only retry policy in the system: analysis stages never retry
/// a reasoning call on their own.
#[derive(Debug, Clone)]
pub struct RequestConfig {
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

/// Langbase pipe names, one per reasoning task
#[derive(Debug, Clone)]
pub struct PipeConfig {
    pub question_generation: String,
    pub answer: String,
    pub segment_output: String,
    pub running_summary: String,
    pub synthesis: String,
    pub meta_analysis: String,
    pub session_summary: String,
}

/// Analysis pipeline tuning
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Upper bound on sub-questions answered at the same time.
    pub max_concurrency: usize,
    /// Passages handed to the answer pipe per sub-question.
    pub retrieval_top_k: usize,
    /// Ask for a closing session summary after the run.
    pub session_summary: bool,
}

/// Monte Carlo engine defaults
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub default_iterations: usize,
    pub seed: Option<u64>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let langbase = LangbaseConfig {
            api_key: env::var("LANGBASE_API_KEY").map_err(|_| AppError::Config {
                message: "LANGBASE_API_KEY is required".to_string(),
            })?,
            base_url: env::var("LANGBASE_BASE_URL")
                .unwrap_or_else(|_| "https://api.langbase.com".to_string()),
        };

        let database = DatabaseConfig {
            path: PathBuf::from(
                env::var("DATABASE_PATH").unwrap_or_else(|_| "./data/analysis.db".to_string()),
            ),
            max_connections: parse_var("DATABASE_MAX_CONNECTIONS").unwrap_or(5),
        };

        let logging = LoggingConfig::from_env();

        let request = RequestConfig {
            timeout_ms: parse_var("REQUEST_TIMEOUT_MS").unwrap_or(30000),
            max_retries: parse_var("MAX_RETRIES").unwrap_or(3),
            retry_delay_ms: parse_var("RETRY_DELAY_MS").unwrap_or(1000),
        };

        let defaults = PipeConfig::default();
        let pipes = PipeConfig {
            question_generation: env::var("PIPE_QUESTION_GENERATION")
                .unwrap_or(defaults.question_generation),
            answer: env::var("PIPE_ANSWER").unwrap_or(defaults.answer),
            segment_output: env::var("PIPE_SEGMENT_OUTPUT").unwrap_or(defaults.segment_output),
            running_summary: env::var("PIPE_RUNNING_SUMMARY").unwrap_or(defaults.running_summary),
            synthesis: env::var("PIPE_SYNTHESIS").unwrap_or(defaults.synthesis),
            meta_analysis: env::var("PIPE_META_ANALYSIS").unwrap_or(defaults.meta_analysis),
            session_summary: env::var("PIPE_SESSION_SUMMARY").unwrap_or(defaults.session_summary),
        };

        let max_concurrency: usize = parse_var("PIPELINE_MAX_CONCURRENCY").unwrap_or(4);
        if max_concurrency == 0 {
            return Err(AppError::Config {
                message: "PIPELINE_MAX_CONCURRENCY must be at least 1".to_string(),
            });
        }

        let pipeline = PipelineConfig {
            max_concurrency,
            retrieval_top_k: parse_var("PIPELINE_RETRIEVAL_TOP_K").unwrap_or(3),
            session_summary: parse_var("PIPELINE_SESSION_SUMMARY").unwrap_or(false),
        };

        let simulation = SimulationConfig::from_env()?;

        Ok(Config {
            langbase,
            database,
            logging,
            request,
            pipes,
            pipeline,
            simulation,
        })
    }
}

impl LoggingConfig {
    /// Logging settings alone, for commands that need no API access.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        Self {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        }
    }
}

impl SimulationConfig {
    /// Simulation settings alone, for commands that need no API access.
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            default_iterations: parse_var("SIMULATION_DEFAULT_ITERATIONS").unwrap_or(1000),
            seed: match env::var("SIMULATION_SEED") {
                Ok(raw) => Some(raw.trim().parse().map_err(|_| AppError::Config {
                    message: format!("SIMULATION_SEED must be an unsigned integer, got '{}'", raw),
                })?),
                Err(_) => None,
            },
        })
    }
}

fn parse_var<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30000,
            max_retries: 3,
            retry_delay_ms: 1000,
        }
    }
}

impl Default for PipeConfig {
    fn default() -> Self {
        Self {
            question_generation: "question-generation-v1".to_string(),
            answer: "sub-question-answer-v1".to_string(),
            segment_output: "segment-output-v1".to_string(),
            running_summary: "running-summary-v1".to_string(),
            synthesis: "response-synthesis-v1".to_string(),
            meta_analysis: "meta-analysis-v1".to_string(),
            session_summary: "session-summary-v1".to_string(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            retrieval_top_k: 3,
            session_summary: false,
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            default_iterations: 1000,
            seed: None,
        }
    }
}
