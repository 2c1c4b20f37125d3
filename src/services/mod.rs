//! Application services behind the MCP tools.
//!
//! - [`RecordService`]: problems, segments, relationships, reviews,
//!   assumptions and milestones
//! - [`AnalysisService`]: runs the pipeline for a stored problem and persists
//!   the outcome
//! - [`SimulationService`]: runs the Monte Carlo engine over stored assumptions

mod analysis;
mod records;
mod simulation;

pub use analysis::*;
pub use records::*;
pub use simulation::*;

use std::sync::Arc;

use crate::analysis::ReasoningService;
use crate::storage::SqliteStorage;

/// Dependencies shared by every service.
#[derive(Clone)]
pub struct ServiceCore {
    storage: SqliteStorage,
    reasoner: Arc<dyn ReasoningService>,
}

impl ServiceCore {
    pub fn new(storage: SqliteStorage, reasoner: Arc<dyn ReasoningService>) -> Self {
        Self { storage, reasoner }
    }

    #[inline]
    pub fn storage(&self) -> &SqliteStorage {
        &self.storage
    }

    #[inline]
    pub fn reasoner(&self) -> &Arc<dyn ReasoningService> {
        &self.reasoner
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use crate::storage::{Problem, Storage};

    #[tokio::test]
    async fn test_core_shares_storage_across_clones() {
        let core = core_with(CannedReasoner::default()).await;
        let clone = core.clone();

        let problem = Problem::new("Churn", "Why are customers leaving?", "Acme");
        core.storage().create_problem(&problem).await.unwrap();

        let loaded = clone.storage().get_problem(&problem.id).await.unwrap();
        assert_eq!(loaded.map(|p| p.title), Some("Churn".to_string()));
    }
}
