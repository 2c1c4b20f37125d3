//! Multi-step problem analysis.
//!
//! - [`AnalysisPipeline`]: decompose a query, answer each sub-question, fold
//!   the results into a [`ContextAccumulator`], synthesize, and score the run
//! - [`ReasoningService`], [`RetrievalTool`], [`SemanticIndex`]: the
//!   collaborator seams the pipeline is written against
//! - [`KeywordIndex`] and [`DocumentRetriever`]: in-process implementations of
//!   the index and retrieval seams

mod context;
mod index;
mod pipeline;
mod retrieval;
mod services;
mod synthesizer;
mod types;
mod validator;

pub use context::*;
pub use index::*;
pub use pipeline::*;
pub use retrieval::*;
pub use services::*;
pub use synthesizer::*;
pub use types::*;
pub use validator::{decode_bounded, parse_meta_analysis, parse_segment_output, parse_sub_questions};
