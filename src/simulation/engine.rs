use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::sampler::{sample, validate_bounds, DistributionKind};
use super::stats::SummaryStatistics;
use crate::config::SimulationConfig;
use crate::error::{AnalysisError, AnalysisResult};
use crate::storage::Assumption;

/// Outcome of a Monte Carlo run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub iterations: usize,
    /// One `{impact_area: value}` map per trial, in trial order.
    pub results: Vec<BTreeMap<String, f64>>,
    /// One entry per distinct impact area.
    pub summary: BTreeMap<String, SummaryStatistics>,
}

#[derive(Debug, Clone)]
struct Draw {
    impact_area: String,
    kind: DistributionKind,
    min: f64,
    max: f64,
}

/// Propagates assumption uncertainty through independent trials.
#[derive(Debug, Clone, Default)]
pub struct SimulationEngine {
    seed: Option<u64>,
}

impl SimulationEngine {
    pub fn new(config: &SimulationConfig) -> Self {
        Self { seed: config.seed }
    }

    /// Engine whose runs are reproducible.
    pub fn seeded(seed: u64) -> Self {
        Self { seed: Some(seed) }
    }

    /// Run `iterations` trials, sampling every assumption once per trial.
    ///
    /// Every assumption is validated before the first trial, so a bad one
    /// never yields a partial result. When two assumptions share an impact
    /// area the later one overwrites the earlier within each trial.
    pub fn run(
        &self,
        assumptions: &[Assumption],
        iterations: usize,
    ) -> AnalysisResult<SimulationResult> {
        if iterations == 0 {
            return Err(AnalysisError::invalid_argument("iterations must be at least 1"));
        }
        if assumptions.is_empty() {
            return Err(AnalysisError::invalid_argument(
                "at least one assumption is required",
            ));
        }

        let plan = plan_draws(assumptions)?;
        let run_seed = self.seed.unwrap_or_else(|| rand::thread_rng().gen());
        let start = Instant::now();

        debug!(
            iterations,
            assumptions = plan.len(),
            seeded = self.seed.is_some(),
            "Starting simulation"
        );

        let results: Vec<BTreeMap<String, f64>> = (0..iterations)
            .into_par_iter()
            .map(|trial| {
                let mut rng = StdRng::seed_from_u64(trial_seed(run_seed, trial as u64));
                let mut values = BTreeMap::new();
                for draw in &plan {
                    let value = sample(&mut rng, draw.kind, draw.min, draw.max)?;
                    values.insert(draw.impact_area.clone(), value);
                }
                Ok::<_, AnalysisError>(values)
            })
            .collect::<AnalysisResult<_>>()?;

        let mut summary = BTreeMap::new();
        for area in plan.iter().map(|d| d.impact_area.as_str()) {
            if summary.contains_key(area) {
                continue;
            }
            let values: Vec<f64> = results.iter().filter_map(|trial| trial.get(area).copied()).collect();
            if let Some(stats) = SummaryStatistics::from_values(&values) {
                summary.insert(area.to_string(), stats);
            }
        }

        info!(
            iterations,
            impact_areas = summary.len(),
            latency_ms = start.elapsed().as_millis(),
            "Simulation complete"
        );

        Ok(SimulationResult {
            iterations,
            results,
            summary,
        })
    }
}

/// Validate every assumption and resolve its distribution up front.
fn plan_draws(assumptions: &[Assumption]) -> AnalysisResult<Vec<Draw>> {
    let mut seen: BTreeMap<&str, &str> = BTreeMap::new();
    let mut plan = Vec::with_capacity(assumptions.len());

    for assumption in assumptions {
        let kind: DistributionKind = assumption.distribution.parse()?;
        validate_bounds(assumption.min_value, assumption.max_value).map_err(|e| {
            AnalysisError::invalid_argument(format!("assumption {}: {}", assumption.id, e))
        })?;

        if let Some(earlier) = seen.insert(&assumption.impact_area, &assumption.id) {
            warn!(
                impact_area = %assumption.impact_area,
                overwritten = %earlier,
                by = %assumption.id,
                "Assumptions share an impact area; later value overwrites earlier per trial"
            );
        }

        plan.push(Draw {
            impact_area: assumption.impact_area.clone(),
            kind,
            min: assumption.min_value,
            max: assumption.max_value,
        });
    }
    Ok(plan)
}

/// SplitMix64 over the run seed and trial index.
fn trial_seed(run_seed: u64, trial: u64) -> u64 {
    let mut z = run_seed ^ trial.wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
