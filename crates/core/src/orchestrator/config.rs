//! Orchestrator configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::estimator::EstimatorSettings;

/// Configuration for the acquisition orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// How often each active transfer is sampled (milliseconds).
    #[serde(default = "default_sample_interval")]
    pub sample_interval_ms: u64,

    /// Number of recent velocities averaged for the completion estimate.
    /// No estimate is published until this many have been observed.
    #[serde(default = "default_velocity_window")]
    pub velocity_window: usize,

    /// How long to wait for the engine to resolve metadata before the
    /// entity is marked failed (seconds).
    #[serde(default = "default_metadata_timeout")]
    pub metadata_timeout_secs: u64,
}

fn default_sample_interval() -> u64 {
    1000 // 1 second
}

fn default_velocity_window() -> usize {
    3
}

fn default_metadata_timeout() -> u64 {
    600 // 10 minutes
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: default_sample_interval(),
            velocity_window: default_velocity_window(),
            metadata_timeout_secs: default_metadata_timeout(),
        }
    }
}

impl OrchestratorConfig {
    pub fn estimator_settings(&self) -> EstimatorSettings {
        EstimatorSettings {
            sample_interval: Duration::from_millis(self.sample_interval_ms),
            velocity_window: self.velocity_window,
        }
    }

    pub fn metadata_timeout(&self) -> Duration {
        Duration::from_secs(self.metadata_timeout_secs)
    }
}
