//! Mock transfer engine for testing.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::catalog::derive_key;
use crate::transfer::{
    TransferEngine, TransferError, TransferHandle, TransferMetadata, TransferProgress,
};

const METADATA_POLL: Duration = Duration::from_millis(5);

/// A recorded submit call for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedSubmit {
    pub key: String,
    pub descriptor: String,
    pub destination: PathBuf,
    pub timestamp: chrono::DateTime<Utc>,
}

/// Scripted behavior and observed calls for one transfer.
#[derive(Debug, Default)]
struct MockTransfer {
    /// `None` keeps `await_metadata` pending.
    metadata: Option<Result<TransferMetadata, String>>,
    /// Samples returned in order. The last one repeats.
    progress: VecDeque<(u64, u64)>,
    samples_taken: usize,
    paused: bool,
    cancelled: bool,
}

#[derive(Debug, Default)]
struct MockState {
    submitted: Vec<RecordedSubmit>,
    transfers: HashMap<String, MockTransfer>,
    next_submit_error: Option<String>,
}

/// Mock implementation of the TransferEngine trait.
///
/// Provides controllable behavior for testing:
/// - Record submitted descriptors
/// - Release metadata when the test decides (or never, to force a timeout)
/// - Script the progress samples a transfer reports
/// - Simulate submit and metadata failures
///
/// # Example
///
/// ```rust,ignore
/// let engine = MockTransferEngine::new();
/// engine.set_metadata(&key, "movie.mkv", 700).await;
/// engine.set_progress_script(&key, vec![(350, 700), (700, 700)]).await;
///
/// let handle = engine.submit(&magnet, &path).await?;
/// assert_eq!(handle.await_metadata().await?.total_bytes, 700);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockTransferEngine {
    state: Arc<RwLock<MockState>>,
}

impl MockTransferEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `await_metadata` for `key` resolve with this name and size.
    pub async fn set_metadata(&self, key: &str, name: &str, total_bytes: u64) {
        let mut state = self.state.write().await;
        state.transfers.entry(key.to_string()).or_default().metadata =
            Some(Ok(TransferMetadata {
                name: name.to_string(),
                total_bytes,
            }));
    }

    /// Make `await_metadata` for `key` fail.
    pub async fn set_metadata_error(&self, key: &str, message: &str) {
        let mut state = self.state.write().await;
        state.transfers.entry(key.to_string()).or_default().metadata = Some(Err(message.to_string()));
    }

    /// Script the `(done, total)` samples reported for `key`.
    pub async fn set_progress_script(&self, key: &str, samples: Vec<(u64, u64)>) {
        let mut state = self.state.write().await;
        state.transfers.entry(key.to_string()).or_default().progress = samples.into();
    }

    /// Fail the next submit call.
    pub async fn fail_next_submit(&self, message: &str) {
        self.state.write().await.next_submit_error = Some(message.to_string());
    }

    pub async fn submitted(&self) -> Vec<RecordedSubmit> {
        self.state.read().await.submitted.clone()
    }

    pub async fn samples_taken(&self, key: &str) -> usize {
        self.state
            .read()
            .await
            .transfers
            .get(key)
            .map(|t| t.samples_taken)
            .unwrap_or(0)
    }

    pub async fn is_paused(&self, key: &str) -> bool {
        self.state
            .read()
            .await
            .transfers
            .get(key)
            .map(|t| t.paused)
            .unwrap_or(false)
    }

    pub async fn is_cancelled(&self, key: &str) -> bool {
        self.state
            .read()
            .await
            .transfers
            .get(key)
            .map(|t| t.cancelled)
            .unwrap_or(false)
    }
}

#[async_trait]
impl TransferEngine for MockTransferEngine {
    fn name(&self) -> &str {
        "mock"
    }

    async fn submit(
        &self,
        descriptor: &str,
        destination: &Path,
    ) -> Result<Arc<dyn TransferHandle>, TransferError> {
        let mut state = self.state.write().await;
        if let Some(message) = state.next_submit_error.take() {
            return Err(TransferError::Engine(message));
        }

        let key = derive_key(descriptor)
            .map_err(|e| TransferError::InvalidDescriptor(e.to_string()))?;

        state.submitted.push(RecordedSubmit {
            key: key.clone(),
            descriptor: descriptor.to_string(),
            destination: destination.to_path_buf(),
            timestamp: Utc::now(),
        });
        let transfer = state.transfers.entry(key.clone()).or_default();
        transfer.cancelled = false;

        Ok(Arc::new(MockTransferHandle {
            key,
            state: Arc::clone(&self.state),
        }))
    }
}

struct MockTransferHandle {
    key: String,
    state: Arc<RwLock<MockState>>,
}

#[async_trait]
impl TransferHandle for MockTransferHandle {
    async fn await_metadata(&self) -> Result<TransferMetadata, TransferError> {
        loop {
            {
                let state = self.state.read().await;
                if let Some(transfer) = state.transfers.get(&self.key) {
                    if transfer.cancelled {
                        return Err(TransferError::Engine("transfer cancelled".to_string()));
                    }
                    match &transfer.metadata {
                        Some(Ok(metadata)) => return Ok(metadata.clone()),
                        Some(Err(message)) => return Err(TransferError::Engine(message.clone())),
                        None => {}
                    }
                }
            }
            tokio::time::sleep(METADATA_POLL).await;
        }
    }

    async fn sample_progress(&self) -> Result<TransferProgress, TransferError> {
        let mut state = self.state.write().await;
        let transfer = state
            .transfers
            .get_mut(&self.key)
            .ok_or_else(|| TransferError::NotStarted(self.key.clone()))?;
        transfer.samples_taken += 1;

        let sample = if transfer.progress.len() > 1 {
            transfer.progress.pop_front()
        } else {
            transfer.progress.front().copied()
        };

        let (done_bytes, total_bytes) =
            sample.ok_or_else(|| TransferError::NotStarted(self.key.clone()))?;
        Ok(TransferProgress {
            done_bytes,
            total_bytes,
        })
    }

    async fn pause(&self) -> Result<(), TransferError> {
        let mut state = self.state.write().await;
        if let Some(transfer) = state.transfers.get_mut(&self.key) {
            transfer.paused = true;
        }
        Ok(())
    }

    async fn resume(&self) -> Result<(), TransferError> {
        let mut state = self.state.write().await;
        if let Some(transfer) = state.transfers.get_mut(&self.key) {
            transfer.paused = false;
        }
        Ok(())
    }

    async fn cancel(&self) -> Result<(), TransferError> {
        let mut state = self.state.write().await;
        if let Some(transfer) = state.transfers.get_mut(&self.key) {
            transfer.cancelled = true;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HASH: &str = "44ee80f1c56bada494667a50856777ba7ddaae61";

    #[tokio::test]
    async fn test_submit_records_and_derives_key() {
        let engine = MockTransferEngine::new();
        let magnet = format!("magnet:?xt=urn:btih:{}", HASH.to_uppercase());

        engine.submit(&magnet, Path::new("/data/x")).await.unwrap();

        let submitted = engine.submitted().await;
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].key, HASH);
        assert_eq!(submitted[0].destination, PathBuf::from("/data/x"));
    }

    #[tokio::test]
    async fn test_submit_invalid_descriptor() {
        let engine = MockTransferEngine::new();
        let result = engine.submit("garbage", Path::new("/data/x")).await;
        assert!(matches!(result, Err(TransferError::InvalidDescriptor(_))));
    }

    #[tokio::test]
    async fn test_fail_next_submit() {
        let engine = MockTransferEngine::new();
        engine.fail_next_submit("engine down").await;

        assert!(engine.submit(HASH, Path::new("/x")).await.is_err());
        assert!(engine.submit(HASH, Path::new("/x")).await.is_ok());
    }

    #[tokio::test]
    async fn test_metadata_released_later() {
        let engine = MockTransferEngine::new();
        let handle = engine.submit(HASH, Path::new("/x")).await.unwrap();

        let waiter = tokio::spawn(async move { handle.await_metadata().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        engine.set_metadata(HASH, "movie.mkv", 700).await;
        let metadata = waiter.await.unwrap().unwrap();
        assert_eq!(metadata.name, "movie.mkv");
        assert_eq!(metadata.total_bytes, 700);
    }

    #[tokio::test]
    async fn test_progress_script_repeats_last_sample() {
        let engine = MockTransferEngine::new();
        engine
            .set_progress_script(HASH, vec![(1, 10), (5, 10)])
            .await;
        let handle = engine.submit(HASH, Path::new("/x")).await.unwrap();

        assert_eq!(handle.sample_progress().await.unwrap().done_bytes, 1);
        assert_eq!(handle.sample_progress().await.unwrap().done_bytes, 5);
        assert_eq!(handle.sample_progress().await.unwrap().done_bytes, 5);
        assert_eq!(engine.samples_taken(HASH).await, 3);
    }

    #[tokio::test]
    async fn test_cancel_unblocks_metadata_wait() {
        let engine = MockTransferEngine::new();
        let handle = engine.submit(HASH, Path::new("/x")).await.unwrap();
        handle.cancel().await.unwrap();

        assert!(engine.is_cancelled(HASH).await);
        assert!(handle.await_metadata().await.is_err());
    }
}
