use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::velocity::{Observation, ProgressTracker};
use crate::audit::{AuditEvent, AuditHandle};
use crate::catalog::{CatalogError, CatalogStore, EntityState};
use crate::events::{Change, ChangeKind, EventBus};
use crate::metrics::{ACQUISITIONS_FINISHED, ESTIMATOR_TICKS};
use crate::transfer::TransferHandle;

/// Sampling parameters for a [`LifecycleEstimator`].
#[derive(Debug, Clone, Copy)]
pub struct EstimatorSettings {
    pub sample_interval: Duration,
    pub velocity_window: usize,
}

impl Default for EstimatorSettings {
    fn default() -> Self {
        Self {
            sample_interval: Duration::from_secs(1),
            velocity_window: 3,
        }
    }
}

/// Why an estimator task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EstimatorOutcome {
    /// Progress reached 100 % and the entity is `Done`.
    Completed,
    /// The entity disappeared from the catalog.
    Removed,
    /// A stop signal arrived, or the entity left the active lifecycle.
    Stopped,
}

enum Tick {
    Continue,
    Exit(EstimatorOutcome),
}

/// Per-entity task that samples transfer progress until completion.
pub struct LifecycleEstimator {
    key: String,
    catalog: Arc<CatalogStore>,
    bus: EventBus,
    transfer: Arc<dyn TransferHandle>,
    audit: Option<AuditHandle>,
    settings: EstimatorSettings,
    resuming: bool,
}

impl LifecycleEstimator {
    pub fn new(
        key: impl Into<String>,
        catalog: Arc<CatalogStore>,
        bus: EventBus,
        transfer: Arc<dyn TransferHandle>,
        audit: Option<AuditHandle>,
        settings: EstimatorSettings,
    ) -> Self {
        Self {
            key: key.into(),
            catalog,
            bus,
            transfer,
            audit,
            settings,
            resuming: false,
        }
    }

    /// The transfer made progress before this estimator started. The first
    /// sample becomes the baseline instead of a velocity measured from 0 %.
    pub fn resuming(mut self) -> Self {
        self.resuming = true;
        self
    }

    /// Sample until the entity completes, is removed, or `stop` fires.
    pub async fn run(self, mut stop: broadcast::Receiver<()>) -> EstimatorOutcome {
        let mut ticker = tokio::time::interval(self.settings.sample_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately
        ticker.tick().await;

        let mut tracker = if self.resuming {
            ProgressTracker::resuming(self.settings.velocity_window)
        } else {
            ProgressTracker::new(self.settings.velocity_window, Instant::now())
        };
        debug!(key = %self.key, "Estimator started");

        let outcome = loop {
            tokio::select! {
                _ = stop.recv() => {
                    break EstimatorOutcome::Stopped;
                }
                _ = ticker.tick() => {
                    if let Tick::Exit(outcome) = self.tick(&mut tracker).await {
                        break outcome;
                    }
                }
            }
        };

        debug!(key = %self.key, outcome = ?outcome, "Estimator finished");
        outcome
    }

    async fn tick(&self, tracker: &mut ProgressTracker) -> Tick {
        let Some(record) = self.catalog.get(&self.key) else {
            return Tick::Exit(EstimatorOutcome::Removed);
        };

        match record.state {
            EntityState::Active => {}
            EntityState::Paused => {
                ESTIMATOR_TICKS.with_label_values(&["paused"]).inc();
                tracker.hold(Instant::now());
                return Tick::Continue;
            }
            other => {
                debug!(key = %self.key, state = %other, "Entity no longer active");
                return Tick::Exit(EstimatorOutcome::Stopped);
            }
        }

        // A previous completion attempt did not persist
        if tracker.percent() >= 100 {
            return self.complete().await;
        }

        let progress = match self.transfer.sample_progress().await {
            Ok(progress) => progress,
            Err(e) => {
                warn!(key = %self.key, error = %e, "Failed to sample progress");
                ESTIMATOR_TICKS.with_label_values(&["error"]).inc();
                return Tick::Continue;
            }
        };

        let Some(percent) = progress.percent() else {
            warn!(key = %self.key, "Engine reported zero total bytes");
            ESTIMATOR_TICKS.with_label_values(&["error"]).inc();
            return Tick::Continue;
        };

        match tracker.observe(percent, Instant::now()) {
            Observation::Unchanged => {
                ESTIMATOR_TICKS.with_label_values(&["stalled"]).inc();
                Tick::Continue
            }
            Observation::Advanced { percent, .. } if percent >= 100 => self.complete().await,
            Observation::Advanced {
                percent,
                eta_seconds,
            } => {
                ESTIMATOR_TICKS.with_label_values(&["progress"]).inc();
                self.bus.publish(
                    Change::from_record(ChangeKind::ProgressUpdated, &record)
                        .with_progress(percent, eta_seconds),
                );
                Tick::Continue
            }
        }
    }

    async fn complete(&self) -> Tick {
        match self.catalog.set_state(&self.key, EntityState::Done) {
            Ok(record) => {
                ESTIMATOR_TICKS.with_label_values(&["completed"]).inc();
                ACQUISITIONS_FINISHED
                    .with_label_values(&[EntityState::Done.as_str()])
                    .inc();
                info!(key = %self.key, name = %record.display_name(), "Acquisition complete");

                self.bus
                    .publish(Change::from_record(ChangeKind::Completed, &record));

                if let Some(ref audit) = self.audit {
                    audit
                        .emit(AuditEvent::EntityStateChanged {
                            key: self.key.clone(),
                            from_state: EntityState::Active.as_str().to_string(),
                            to_state: EntityState::Done.as_str().to_string(),
                            reason: None,
                        })
                        .await;
                }
                Tick::Exit(EstimatorOutcome::Completed)
            }
            Err(CatalogError::NotFound(_)) => Tick::Exit(EstimatorOutcome::Removed),
            // Paused between the state check and the commit
            Err(CatalogError::IllegalTransition {
                from: EntityState::Paused,
                ..
            }) => Tick::Continue,
            Err(e @ CatalogError::IllegalTransition { .. }) => {
                warn!(key = %self.key, error = %e, "Cannot complete entity");
                Tick::Exit(EstimatorOutcome::Stopped)
            }
            Err(e) => {
                error!(key = %self.key, error = %e, "Failed to persist completion, retrying");
                Tick::Continue
            }
        }
    }
}
