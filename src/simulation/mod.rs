//! Monte Carlo sensitivity analysis over assumptions.
//!
//! Trials run in parallel on the rayon pool. Each trial draws from its own
//! RNG seeded from the run seed and the trial index, so a seeded run gives
//! identical results however the trials are scheduled.

mod engine;
mod sampler;
mod stats;

pub use engine::*;
pub use sampler::*;
pub use stats::*;
