use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info};

use super::{AuditEvent, AuditRecord, AuditStore};

/// Sending side of the audit journal.
///
/// Clones share one queue. Events are stamped when emitted, so a slow
/// writer does not skew their timestamps.
#[derive(Clone)]
pub struct AuditHandle {
    tx: mpsc::Sender<AuditRecord>,
}

impl AuditHandle {
    /// Waits for queue space. If the writer is gone the event is logged
    /// and dropped.
    pub async fn emit(&self, event: AuditEvent) {
        let record = AuditRecord::now(event);
        let event_type = record.event_type.clone();
        if self.tx.send(record).await.is_err() {
            error!(event_type = %event_type, "Audit journal closed, event dropped");
        }
    }
}

/// Drains the queue into an [`AuditStore`].
pub struct AuditWriter {
    rx: mpsc::Receiver<AuditRecord>,
    store: Arc<dyn AuditStore>,
}

impl AuditWriter {
    /// Returns once every [`AuditHandle`] is dropped and the queue is empty.
    pub async fn run(mut self) {
        info!("Audit writer started");
        let mut written = 0u64;
        while let Some(record) = self.rx.recv().await {
            match self.store.insert(&record) {
                Ok(_) => written += 1,
                Err(e) => error!(
                    event_type = %record.event_type,
                    error = %e,
                    "Failed to write audit record"
                ),
            }
        }
        info!(written, "Audit writer stopped");
    }
}

/// Builds a journal with a queue of `capacity` records.
pub fn create_audit_system(
    store: Arc<dyn AuditStore>,
    capacity: usize,
) -> (AuditHandle, AuditWriter) {
    let (tx, rx) = mpsc::channel(capacity);
    (AuditHandle { tx }, AuditWriter { rx, store })
}
