//! Types for the acquisition orchestrator.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::catalog::CatalogError;
use crate::transfer::{TransferError, TransferHandle};

/// Errors that can occur during orchestration.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Catalog rejected the operation.
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// Transfer engine error.
    #[error("transfer engine error: {0}")]
    Transfer(#[from] TransferError),

    /// The engine did not resolve metadata in time.
    #[error("metadata not resolved within {secs}s for {key}")]
    MetadataTimeout { key: String, secs: u64 },

    /// New work is refused once shutdown has begun.
    #[error("orchestrator is shutting down")]
    ShuttingDown,
}

/// A transfer the orchestrator is driving.
///
/// Kept until the entity is removed so the engine transfer can be
/// cancelled even after its lifecycle task has finished.
pub struct ActiveTransfer {
    pub handle: Arc<dyn TransferHandle>,
    /// Stops the lifecycle task.
    pub stop_tx: broadcast::Sender<()>,
    pub task: JoinHandle<()>,
    pub started_at: DateTime<Utc>,
}

/// Current status of the orchestrator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrchestratorStatus {
    /// Whether new acquisitions are accepted.
    pub running: bool,
    /// Transfers with a live lifecycle task.
    pub active_transfers: usize,
    /// Connected change feed subscribers.
    pub subscribers: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::EntityState;

    #[test]
    fn test_orchestrator_status_default() {
        let status = OrchestratorStatus::default();
        assert!(!status.running);
        assert_eq!(status.active_transfers, 0);
        assert_eq!(status.subscribers, 0);
    }

    #[test]
    fn test_error_display() {
        let err = OrchestratorError::MetadataTimeout {
            key: "abc".to_string(),
            secs: 600,
        };
        assert_eq!(err.to_string(), "metadata not resolved within 600s for abc");

        let err = OrchestratorError::from(CatalogError::IllegalTransition {
            key: "abc".to_string(),
            from: EntityState::Done,
            to: EntityState::Paused,
        });
        assert_eq!(err.to_string(), "Illegal transition for abc: done -> paused");
    }
}
