use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::SimulationConfig;
use crate::error::{AnalysisError, AnalysisResult};
use crate::simulation::{SimulationEngine, SimulationResult};
use crate::storage::{SqliteStorage, Storage};

/// Input for `simulation_run`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimulationParams {
    /// Restricts the run to one problem's assumptions.
    #[serde(default)]
    pub problem_id: Option<String>,
    /// Assumption ids to sample. Empty means every assumption of `problem_id`.
    #[serde(default)]
    pub assumptions: Vec<String>,
    /// Defaults to the configured iteration count.
    #[serde(default)]
    pub iterations: Option<usize>,
}

/// Loads assumptions and runs the Monte Carlo engine off the async runtime.
#[derive(Clone)]
pub struct SimulationService {
    storage: SqliteStorage,
    engine: SimulationEngine,
    default_iterations: usize,
}

impl SimulationService {
    pub fn new(storage: SqliteStorage, config: &SimulationConfig) -> Self {
        Self {
            storage,
            engine: SimulationEngine::new(config),
            default_iterations: config.default_iterations,
        }
    }

    /// Use a specific engine, e.g. a seeded one.
    pub fn with_engine(mut self, engine: SimulationEngine) -> Self {
        self.engine = engine;
        self
    }

    pub async fn process(&self, params: SimulationParams) -> AnalysisResult<SimulationResult> {
        let iterations = params.iterations.unwrap_or(self.default_iterations);

        let assumptions = match (&params.problem_id, params.assumptions.is_empty()) {
            (Some(problem_id), true) => {
                if self.storage.get_problem(problem_id).await?.is_none() {
                    return Err(AnalysisError::NotFound {
                        entity: "Problem",
                        id: problem_id.clone(),
                    });
                }
                self.storage.list_assumptions(problem_id).await?
            }
            (None, true) => {
                return Err(AnalysisError::invalid_argument(
                    "provide assumption ids or a problem_id",
                ))
            }
            (problem_id, false) => {
                let assumptions = self.storage.get_assumptions(&params.assumptions).await?;
                if let Some(problem_id) = problem_id {
                    if let Some(foreign) = assumptions.iter().find(|a| &a.problem_id != problem_id) {
                        return Err(AnalysisError::invalid_argument(format!(
                            "assumption {} belongs to problem {}, not {}",
                            foreign.id, foreign.problem_id, problem_id
                        )));
                    }
                }
                assumptions
            }
        };

        debug!(
            problem_id = ?params.problem_id,
            assumptions = assumptions.len(),
            iterations,
            "Dispatching simulation"
        );

        let engine = self.engine.clone();
        let result = tokio::task::spawn_blocking(move || engine.run(&assumptions, iterations))
            .await
            .map_err(|e| {
                if e.is_panic() {
                    std::panic::resume_unwind(e.into_panic());
                }
                AnalysisError::Cancelled {
                    stage: "simulation",
                }
            })??;

        info!(
            iterations = result.iterations,
            impact_areas = result.summary.len(),
            "Simulation request complete"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Assumption, Problem};

    async fn seeded_service() -> (SimulationService, Problem) {
        let storage = SqliteStorage::new_in_memory().await.unwrap();
        let problem = Problem::new("Launch", "New market entry", "Acme");
        storage.create_problem(&problem).await.unwrap();
        let service = SimulationService::new(storage, &SimulationConfig::default())
            .with_engine(SimulationEngine::seeded(42));
        (service, problem)
    }

    async fn add(service: &SimulationService, assumption: &Assumption) {
        service.storage.create_assumption(assumption).await.unwrap();
    }

    #[tokio::test]
    async fn test_runs_every_assumption_of_a_problem() {
        let (service, problem) = seeded_service().await;
        add(&service, &Assumption::new(&problem.id, "Price", 10.0, 20.0, "uniform", "revenue")).await;
        add(&service, &Assumption::new(&problem.id, "Build", 1.0, 3.0, "triangular", "cost")).await;

        let result = service
            .process(SimulationParams {
                problem_id: Some(problem.id.clone()),
                iterations: Some(200),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(result.iterations, 200);
        assert_eq!(result.results.len(), 200);
        assert_eq!(
            result.summary.keys().cloned().collect::<Vec<_>>(),
            vec!["cost".to_string(), "revenue".to_string()]
        );
    }

    #[tokio::test]
    async fn test_default_iterations_from_config() {
        let (service, problem) = seeded_service().await;
        let a = Assumption::new(&problem.id, "Price", 10.0, 20.0, "normal", "revenue");
        add(&service, &a).await;

        let result = service
            .process(SimulationParams {
                assumptions: vec![a.id.clone()],
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(result.iterations, SimulationConfig::default().default_iterations);
    }

    #[tokio::test]
    async fn test_unknown_assumption_is_not_found() {
        let (service, _) = seeded_service().await;
        let err = service
            .process(SimulationParams {
                assumptions: vec!["ghost".to_string()],
                iterations: Some(10),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::NotFound { ref id, .. } if id == "ghost"));
    }

    #[tokio::test]
    async fn test_foreign_assumption_rejected() {
        let (service, problem) = seeded_service().await;
        let other = Problem::new("Other", "Elsewhere", "Beta");
        service.storage.create_problem(&other).await.unwrap();
        let a = Assumption::new(&other.id, "Price", 1.0, 2.0, "uniform", "revenue");
        add(&service, &a).await;

        let err = service
            .process(SimulationParams {
                problem_id: Some(problem.id),
                assumptions: vec![a.id],
                iterations: Some(10),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidArgument { .. }));
    }

    #[tokio::test]
    async fn test_nothing_to_simulate() {
        let (service, problem) = seeded_service().await;

        let err = service.process(SimulationParams::default()).await.unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidArgument { .. }));

        // A problem without assumptions reaches the engine's empty check
        let err = service
            .process(SimulationParams {
                problem_id: Some(problem.id),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidArgument { .. }));
    }
}
