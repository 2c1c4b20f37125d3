//! Langbase Pipes integration.
//!
//! [`LangbaseClient`] speaks the HTTP API with retry and backoff.
//! [`LangbaseReasoner`] adapts it to the pipeline's
//! [`ReasoningService`](crate::analysis::ReasoningService) seam.

mod client;
mod reasoner;
mod types;

pub use client::*;
pub use reasoner::*;
pub use types::*;
