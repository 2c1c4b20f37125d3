//! Server module for MCP protocol handling.
//!
//! This module provides:
//! - MCP server implementation over stdio
//! - Tool call handlers and routing
//! - Shared application state

mod handlers;
mod mcp;

pub use handlers::*;
pub use mcp::*;

use std::sync::Arc;

use crate::analysis::{CancelToken, ReasoningService};
use crate::config::Config;
use crate::services::{AnalysisService, RecordService, ServiceCore, SimulationService};
use crate::storage::SqliteStorage;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// SQLite storage backend.
    pub storage: SqliteStorage,
    /// Record CRUD with graph validation.
    pub records: RecordService,
    /// Pipeline runs over stored problems.
    pub analysis: AnalysisService,
    /// Monte Carlo runs over stored assumptions.
    pub simulation: SimulationService,
    /// Cancelled when the process is asked to stop; aborts running analyses.
    pub shutdown: CancelToken,
}

impl AppState {
    /// Create new application state
    pub fn new(
        config: Config,
        storage: SqliteStorage,
        reasoner: Arc<dyn ReasoningService>,
        shutdown: CancelToken,
    ) -> Self {
        tracing::info!(
            max_concurrency = config.pipeline.max_concurrency,
            retrieval_top_k = config.pipeline.retrieval_top_k,
            default_iterations = config.simulation.default_iterations,
            seeded = config.simulation.seed.is_some(),
            "AppState initializing"
        );

        let core = ServiceCore::new(storage.clone(), reasoner);
        let records = RecordService::new(storage.clone());
        let analysis = AnalysisService::new(core, config.pipeline.clone());
        let simulation = SimulationService::new(storage.clone(), &config.simulation);

        Self {
            config,
            storage,
            records,
            analysis,
            simulation,
            shutdown,
        }
    }
}

/// Shared application state handle
pub type SharedState = Arc<AppState>;
