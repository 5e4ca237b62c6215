use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during transfer engine operations.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("Invalid descriptor: {0}")]
    InvalidDescriptor(String),

    #[error("Engine unavailable: {0}")]
    Unavailable(String),

    /// The transfer has not been started by the engine yet.
    #[error("Transfer not started: {0}")]
    NotStarted(String),

    #[error("Engine error: {0}")]
    Engine(String),
}

/// Name and size reported once the engine has resolved metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferMetadata {
    pub name: String,
    pub total_bytes: u64,
}

/// Instantaneous byte counters for one transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferProgress {
    pub done_bytes: u64,
    pub total_bytes: u64,
}

impl TransferProgress {
    /// Whole percent complete, clamped to 100. `None` when the total is unknown.
    pub fn percent(&self) -> Option<u8> {
        if self.total_bytes == 0 {
            return None;
        }
        let pct = (self.done_bytes as u128 * 100) / self.total_bytes as u128;
        Some(pct.min(100) as u8)
    }
}

/// A transfer engine that accepts descriptors and produces handles.
#[async_trait]
pub trait TransferEngine: Send + Sync {
    /// Engine name for logging.
    fn name(&self) -> &str;

    /// Accept a descriptor for download into `destination`.
    ///
    /// Returns quickly. Metadata is resolved later through the handle.
    async fn submit(
        &self,
        descriptor: &str,
        destination: &Path,
    ) -> Result<Arc<dyn TransferHandle>, TransferError>;
}

/// One submitted transfer.
#[async_trait]
pub trait TransferHandle: Send + Sync {
    /// Wait until the engine knows the canonical name and total size.
    async fn await_metadata(&self) -> Result<TransferMetadata, TransferError>;

    /// Current byte counters.
    async fn sample_progress(&self) -> Result<TransferProgress, TransferError>;

    /// Suspend the transfer.
    async fn pause(&self) -> Result<(), TransferError> {
        Ok(())
    }

    /// Continue a suspended transfer.
    async fn resume(&self) -> Result<(), TransferError> {
        Ok(())
    }

    /// Stop the transfer and release engine resources. Files are left in place.
    async fn cancel(&self) -> Result<(), TransferError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_floors() {
        let progress = TransferProgress {
            done_bytes: 999,
            total_bytes: 1000,
        };
        assert_eq!(progress.percent(), Some(99));
    }

    #[test]
    fn test_percent_clamps_overshoot() {
        let progress = TransferProgress {
            done_bytes: 1200,
            total_bytes: 1000,
        };
        assert_eq!(progress.percent(), Some(100));
    }

    #[test]
    fn test_percent_unknown_total() {
        let progress = TransferProgress {
            done_bytes: 10,
            total_bytes: 0,
        };
        assert_eq!(progress.percent(), None);
    }

    #[test]
    fn test_percent_large_values_do_not_overflow() {
        let progress = TransferProgress {
            done_bytes: u64::MAX / 2,
            total_bytes: u64::MAX,
        };
        assert_eq!(progress.percent(), Some(49));
    }
}
