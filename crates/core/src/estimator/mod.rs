//! Progress sampling and completion estimates.
//!
//! [`ProgressTracker`] holds the arithmetic and is driven with explicit
//! instants. [`LifecycleEstimator`] is the per-entity task that samples the
//! transfer engine, publishes progress and completes the entity.

mod runner;
mod velocity;

pub use runner::{EstimatorOutcome, EstimatorSettings, LifecycleEstimator};
pub use velocity::{Observation, ProgressTracker, VelocityWindow};
