//! # Consulting Analysis Server
//!
//! A Model Context Protocol (MCP) server for structured problem decomposition.
//! Client problems are broken into segments, questions about them are answered
//! by a staged reasoning pipeline backed by Langbase Pipes, and uncertain
//! assumptions are propagated through a Monte Carlo engine.
//!
//! ## Features
//!
//! - **Analysis pipeline**: decompose a query into sub-questions, answer them
//!   concurrently, fold findings into a running context, synthesize a final
//!   response and score the run
//! - **Monte Carlo simulation**: uniform, normal and triangular assumptions,
//!   parallel reproducible trials, per-impact-area summary statistics
//! - **Record store**: problems, segment trees, relationships, literature
//!   reviews, assumptions, milestones and saved analyses in SQLite
//!
//! ## Architecture
//!
//! ```text
//! MCP Client → MCP Server (Rust) → services → analysis pipeline → Langbase Pipes (HTTP)
//!                                      ↓              ↓
//!                               SQLite (records)  simulation engine (rayon)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use consulting_analysis::{AppState, Config, McpServer};
//! use consulting_analysis::analysis::CancelToken;
//! use consulting_analysis::langbase::{LangbaseClient, LangbaseReasoner};
//! use consulting_analysis::storage::SqliteStorage;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let storage = SqliteStorage::new(&config.database).await?;
//!     let client = LangbaseClient::new(&config.langbase, config.request.clone())?;
//!     let reasoner = Arc::new(LangbaseReasoner::new(client, config.pipes.clone()));
//!     let state = Arc::new(AppState::new(config, storage, reasoner, CancelToken::never()));
//!     McpServer::new(state).run().await?;
//!     Ok(())
//! }
//! ```

/// Staged analysis pipeline and its collaborator seams.
pub mod analysis;
/// Configuration loaded from the environment.
pub mod config;
/// Error types and result aliases for the application.
pub mod error;
/// Arena view over a problem's segment tree.
pub mod graph;
/// Langbase API client and the reasoning service built on it.
pub mod langbase;
/// System prompts and user prompt builders.
pub mod prompts;
/// MCP server implementation and request handling.
pub mod server;
/// Application services behind the MCP tools.
pub mod services;
/// Monte Carlo simulation engine.
pub mod simulation;
/// SQLite storage layer for persistence.
pub mod storage;

pub use config::Config;
pub use error::{AnalysisError, AnalysisResult, AppError, AppResult};
pub use server::{AppState, McpServer, SharedState};
