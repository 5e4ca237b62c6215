//! Acquisition orchestrator implementation.
//!
//! Every entity gets one background task: wait for metadata, commit it to the
//! catalog, then run the lifecycle estimator until completion. The task is
//! stopped through its own broadcast channel when the entity is removed or
//! the orchestrator shuts down.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, error, info, warn};

use crate::audit::{AuditEvent, AuditHandle};
use crate::catalog::{
    CatalogError, CatalogSnapshot, CatalogStats, CatalogStore, EntityRecord, EntityState,
};
use crate::estimator::LifecycleEstimator;
use crate::events::{Change, ChangeKind, EventBus, Subscription};
use crate::metrics::{ACQUISITIONS_FINISHED, METADATA_TIMEOUTS, QUOTA_REJECTIONS};
use crate::transfer::{TransferEngine, TransferHandle, TransferMetadata};

use super::config::OrchestratorConfig;
use super::service::CatalogService;
use super::types::{ActiveTransfer, OrchestratorError, OrchestratorStatus};

/// How long a stopped lifecycle task may take to wind down before it is aborted.
const STOP_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Startup {
    /// New entity: resolve metadata and commit it.
    Fresh,
    /// Recovered entity whose metadata is already in the catalog.
    Reattach,
}

/// What a lifecycle task needs, cloned into each task.
#[derive(Clone)]
struct Lifecycle {
    config: OrchestratorConfig,
    catalog: Arc<CatalogStore>,
    bus: EventBus,
    audit: Option<AuditHandle>,
}

impl Lifecycle {
    async fn run(
        self,
        key: String,
        handle: Arc<dyn TransferHandle>,
        startup: Startup,
        mut stop_rx: broadcast::Receiver<()>,
    ) {
        let resolved = tokio::select! {
            _ = stop_rx.recv() => {
                debug!(key = %key, "Stopped while waiting for metadata");
                return;
            }
            result = tokio::time::timeout(self.config.metadata_timeout(), handle.await_metadata()) => result,
        };

        let metadata = match resolved {
            Ok(Ok(metadata)) => metadata,
            Ok(Err(e)) => {
                error!(key = %key, error = %e, "Metadata resolution failed");
                self.cancel_transfer(&key, &handle).await;
                self.fail(&key, &e.to_string()).await;
                return;
            }
            Err(_) => {
                METADATA_TIMEOUTS.inc();
                let reason = OrchestratorError::MetadataTimeout {
                    key: key.clone(),
                    secs: self.config.metadata_timeout_secs,
                }
                .to_string();
                warn!(key = %key, timeout_secs = self.config.metadata_timeout_secs, "Metadata timed out");
                self.cancel_transfer(&key, &handle).await;
                self.fail(&key, &reason).await;
                return;
            }
        };

        match startup {
            Startup::Fresh => {
                if !self.commit(&key, &handle, metadata).await {
                    return;
                }
            }
            Startup::Reattach => {
                let paused = self
                    .catalog
                    .get(&key)
                    .map(|r| r.state == EntityState::Paused)
                    .unwrap_or(false);
                if paused {
                    if let Err(e) = handle.pause().await {
                        warn!(key = %key, error = %e, "Failed to pause recovered transfer");
                    }
                }
            }
        }

        let estimator = LifecycleEstimator::new(
            key,
            Arc::clone(&self.catalog),
            self.bus.clone(),
            handle,
            self.audit.clone(),
            self.config.estimator_settings(),
        );
        let estimator = match startup {
            Startup::Fresh => estimator,
            Startup::Reattach => estimator.resuming(),
        };
        estimator.run(stop_rx).await;
    }

    /// Record resolved metadata. Returns whether the entity went `Active`.
    async fn commit(
        &self,
        key: &str,
        handle: &Arc<dyn TransferHandle>,
        metadata: TransferMetadata,
    ) -> bool {
        match self
            .catalog
            .commit_info(key, &metadata.name, metadata.total_bytes)
        {
            Ok(record) => {
                info!(
                    key = %key,
                    name = %record.resolved_name,
                    size_bytes = record.size_bytes,
                    "Metadata resolved"
                );
                self.emit(AuditEvent::MetadataResolved {
                    key: key.to_string(),
                    name: record.resolved_name.clone(),
                    size_bytes: record.size_bytes,
                })
                .await;
                self.bus
                    .publish(Change::from_record(ChangeKind::MetadataResolved, &record));
                true
            }
            Err(CatalogError::QuotaExceeded {
                requested,
                used,
                quota,
            }) => {
                QUOTA_REJECTIONS.inc();
                warn!(
                    key = %key,
                    requested,
                    used,
                    quota,
                    "Acquisition does not fit in the quota"
                );
                self.emit(AuditEvent::QuotaRejected {
                    key: key.to_string(),
                    requested_bytes: requested,
                    used_bytes: used,
                    quota_bytes: quota,
                })
                .await;
                self.cancel_transfer(key, handle).await;
                let reason = CatalogError::QuotaExceeded {
                    requested,
                    used,
                    quota,
                }
                .to_string();
                self.fail(key, &reason).await;
                false
            }
            Err(CatalogError::NotFound(_)) => {
                debug!(key = %key, "Entity removed while resolving metadata");
                false
            }
            Err(e) => {
                error!(key = %key, error = %e, "Failed to commit metadata");
                self.cancel_transfer(key, handle).await;
                self.fail(key, &e.to_string()).await;
                false
            }
        }
    }

    /// Move an entity to `Failed` and tell everyone why.
    async fn fail(&self, key: &str, reason: &str) {
        let Some(previous) = self.catalog.get(key) else {
            return;
        };

        match self.catalog.set_state(key, EntityState::Failed) {
            Ok(record) => {
                ACQUISITIONS_FINISHED
                    .with_label_values(&[EntityState::Failed.as_str()])
                    .inc();
                self.bus
                    .publish(Change::from_record(ChangeKind::Failed, &record).with_reason(reason));
                self.emit(AuditEvent::EntityStateChanged {
                    key: key.to_string(),
                    from_state: previous.state.as_str().to_string(),
                    to_state: EntityState::Failed.as_str().to_string(),
                    reason: Some(reason.to_string()),
                })
                .await;
            }
            Err(CatalogError::NotFound(_)) => {}
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to mark entity as failed");
            }
        }
    }

    async fn cancel_transfer(&self, key: &str, handle: &Arc<dyn TransferHandle>) {
        if let Err(e) = handle.cancel().await {
            warn!(key = %key, error = %e, "Failed to cancel transfer");
        }
    }

    async fn emit(&self, event: AuditEvent) {
        if let Some(ref audit) = self.audit {
            audit.emit(event).await;
        }
    }
}

/// The acquisition orchestrator.
pub struct Orchestrator {
    lifecycle: Lifecycle,
    engine: Arc<dyn TransferEngine>,

    // Runtime state
    running: Arc<AtomicBool>,
    active: Arc<RwLock<HashMap<String, ActiveTransfer>>>,
}

impl Orchestrator {
    /// Create a new orchestrator. It accepts work immediately.
    pub fn new(
        config: OrchestratorConfig,
        catalog: Arc<CatalogStore>,
        bus: EventBus,
        engine: Arc<dyn TransferEngine>,
        audit: Option<AuditHandle>,
    ) -> Self {
        Self {
            lifecycle: Lifecycle {
                config,
                catalog,
                bus,
                audit,
            },
            engine,
            running: Arc::new(AtomicBool::new(true)),
            active: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn catalog(&self) -> &Arc<CatalogStore> {
        &self.lifecycle.catalog
    }

    pub fn bus(&self) -> &EventBus {
        &self.lifecycle.bus
    }

    /// Resume entities that were in flight when the process stopped.
    ///
    /// `Indexing` entities restart metadata resolution. `Active` and `Paused`
    /// ones are handed back to the engine and their estimator restarts.
    /// Returns the number of transfers resumed.
    pub async fn recover(&self) -> usize {
        let snapshot = match self.catalog().snapshot() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!("Failed to read catalog for recovery: {}", e);
                return 0;
            }
        };

        let mut recovered = 0;
        for record in snapshot.records {
            let startup = match record.state {
                EntityState::Indexing => Startup::Fresh,
                EntityState::Active | EntityState::Paused => Startup::Reattach,
                EntityState::Done | EntityState::Failed => continue,
            };

            if record.descriptor.is_empty() {
                warn!(key = %record.key, "No descriptor recorded, cannot resume");
                continue;
            }

            match self
                .engine
                .submit(&record.descriptor, &record.storage_path)
                .await
            {
                Ok(handle) => {
                    info!(key = %record.key, state = %record.state, "Recovered transfer");
                    self.track(record.key.clone(), handle, startup).await;
                    recovered += 1;
                }
                Err(e) => {
                    error!(key = %record.key, error = %e, "Failed to resubmit transfer");
                    self.lifecycle.fail(&record.key, &e.to_string()).await;
                }
            }
        }

        if recovered > 0 {
            info!("Recovered {} interrupted transfers", recovered);
        }
        recovered
    }

    /// Stop every lifecycle task. Engine transfers are left running.
    pub async fn shutdown(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("Orchestrator already stopped");
            return;
        }

        info!("Stopping orchestrator");

        let transfers: Vec<(String, ActiveTransfer)> = self.active.write().await.drain().collect();
        for (_, transfer) in &transfers {
            let _ = transfer.stop_tx.send(());
        }
        for (key, transfer) in transfers {
            stop_task(&key, transfer).await;
        }

        info!("Orchestrator stopped");
    }

    async fn track(&self, key: String, handle: Arc<dyn TransferHandle>, startup: Startup) {
        let (stop_tx, stop_rx) = broadcast::channel(1);
        let task = tokio::spawn(self.lifecycle.clone().run(
            key.clone(),
            Arc::clone(&handle),
            startup,
            stop_rx,
        ));

        let previous = self.active.write().await.insert(
            key,
            ActiveTransfer {
                handle,
                stop_tx,
                task,
                started_at: Utc::now(),
            },
        );
        if let Some(previous) = previous {
            let _ = previous.stop_tx.send(());
        }
    }

    async fn handle(&self, key: &str) -> Option<Arc<dyn TransferHandle>> {
        self.active
            .read()
            .await
            .get(key)
            .map(|t| Arc::clone(&t.handle))
    }
}

/// Signal a lifecycle task and wait for it, aborting it past the grace period.
async fn stop_task(key: &str, transfer: ActiveTransfer) {
    let _ = transfer.stop_tx.send(());
    let abort = transfer.task.abort_handle();
    if tokio::time::timeout(STOP_GRACE, transfer.task).await.is_err() {
        warn!(key = %key, "Lifecycle task did not stop in time, aborting");
        abort.abort();
    }
}

#[async_trait]
impl CatalogService for Orchestrator {
    async fn request_add(
        &self,
        title: &str,
        descriptor: &str,
    ) -> Result<EntityRecord, OrchestratorError> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(OrchestratorError::ShuttingDown);
        }

        let record = self.catalog().add_entity(title, descriptor)?;
        info!(key = %record.key, title = %record.title, "Acquisition requested");

        self.lifecycle
            .emit(AuditEvent::EntityAdded {
                key: record.key.clone(),
                title: record.title.clone(),
                storage_path: record.storage_path.display().to_string(),
            })
            .await;
        self.bus()
            .publish(Change::from_record(ChangeKind::EntityAdded, &record));

        let handle = match self.engine.submit(descriptor, &record.storage_path).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!(key = %record.key, error = %e, "Engine rejected acquisition, rolling back");
                match self.catalog().remove_entity(&record.key) {
                    Ok(removed) => {
                        self.bus().publish(
                            Change::from_record(ChangeKind::Removed, &removed)
                                .with_reason(e.to_string()),
                        );
                        self.lifecycle
                            .emit(AuditEvent::EntityRemoved {
                                key: removed.key.clone(),
                                previous_state: removed.state.as_str().to_string(),
                                freed_bytes: removed.size_bytes,
                            })
                            .await;
                    }
                    Err(re) => {
                        error!(key = %record.key, error = %re, "Rollback failed");
                    }
                }
                return Err(e.into());
            }
        };

        self.track(record.key.clone(), handle, Startup::Fresh).await;
        Ok(record)
    }

    async fn request_remove(&self, key: &str) -> Result<EntityRecord, OrchestratorError> {
        let previous = self
            .catalog()
            .get(key)
            .ok_or_else(|| CatalogError::NotFound(key.to_string()))?;

        let transfer = self.active.write().await.remove(key);
        if let Some(transfer) = transfer {
            let handle = Arc::clone(&transfer.handle);
            stop_task(key, transfer).await;
            if let Err(e) = handle.cancel().await {
                warn!(key = %key, error = %e, "Failed to cancel transfer");
            }
        }

        let removed = match self.catalog().remove_entity(key) {
            Ok(removed) => removed,
            Err(e) => {
                error!(key = %key, error = %e, "Failed to remove entity");
                // The transfer is already cancelled and nothing drives the
                // entity any more, so it cannot stay in a live state.
                if !previous.state.is_terminal() {
                    self.lifecycle
                        .fail(key, &format!("removal failed: {}", e))
                        .await;
                }
                return Err(e.into());
            }
        };
        info!(key = %key, freed_bytes = removed.size_bytes, "Entity removed");

        self.bus()
            .publish(Change::from_record(ChangeKind::Removed, &removed));
        self.lifecycle
            .emit(AuditEvent::EntityRemoved {
                key: key.to_string(),
                previous_state: previous.state.as_str().to_string(),
                freed_bytes: removed.size_bytes,
            })
            .await;

        Ok(removed)
    }

    async fn pause(&self, key: &str) -> Result<EntityRecord, OrchestratorError> {
        let record = self.catalog().set_state(key, EntityState::Paused)?;

        if let Some(handle) = self.handle(key).await {
            if let Err(e) = handle.pause().await {
                warn!(key = %key, error = %e, "Engine failed to pause transfer");
            }
        }

        self.bus()
            .publish(Change::from_record(ChangeKind::Paused, &record));
        self.lifecycle
            .emit(AuditEvent::EntityStateChanged {
                key: key.to_string(),
                from_state: EntityState::Active.as_str().to_string(),
                to_state: EntityState::Paused.as_str().to_string(),
                reason: None,
            })
            .await;
        Ok(record)
    }

    async fn resume(&self, key: &str) -> Result<EntityRecord, OrchestratorError> {
        let current = self
            .catalog()
            .get(key)
            .ok_or_else(|| CatalogError::NotFound(key.to_string()))?;
        if current.state != EntityState::Paused {
            return Err(CatalogError::IllegalTransition {
                key: key.to_string(),
                from: current.state,
                to: EntityState::Active,
            }
            .into());
        }

        let record = self.catalog().set_state(key, EntityState::Active)?;

        if let Some(handle) = self.handle(key).await {
            if let Err(e) = handle.resume().await {
                warn!(key = %key, error = %e, "Engine failed to resume transfer");
            }
        }

        self.bus()
            .publish(Change::from_record(ChangeKind::Resumed, &record));
        self.lifecycle
            .emit(AuditEvent::EntityStateChanged {
                key: key.to_string(),
                from_state: EntityState::Paused.as_str().to_string(),
                to_state: EntityState::Active.as_str().to_string(),
                reason: None,
            })
            .await;
        Ok(record)
    }

    fn list(&self) -> Result<CatalogSnapshot, OrchestratorError> {
        Ok(self.catalog().snapshot()?)
    }

    fn get(&self, key: &str) -> Option<EntityRecord> {
        self.catalog().get(key)
    }

    fn stats(&self) -> Result<CatalogStats, OrchestratorError> {
        Ok(self.catalog().stats()?)
    }

    fn subscribe(&self) -> Result<(CatalogSnapshot, Subscription), OrchestratorError> {
        let subscription = self.bus().subscribe();
        let snapshot = self.catalog().snapshot()?;
        Ok((snapshot, subscription))
    }

    async fn status(&self) -> OrchestratorStatus {
        let active_transfers = self
            .active
            .read()
            .await
            .values()
            .filter(|t| !t.task.is_finished())
            .count();

        OrchestratorStatus {
            running: self.running.load(Ordering::Relaxed),
            active_transfers,
            subscribers: self.bus().subscriber_count(),
        }
    }
}
