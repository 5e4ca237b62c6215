//! librqbit embedded transfer engine.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use librqbit::{
    AddTorrent, AddTorrentOptions, AddTorrentResponse, ManagedTorrent, Session, SessionOptions,
    SessionPersistenceConfig,
};
use tracing::{debug, info, warn};

use super::{TransferEngine, TransferError, TransferHandle, TransferMetadata, TransferProgress};
use crate::catalog::derive_key;
use crate::config::LibrqbitConfig;

/// Transfer engine backed by an in-process librqbit session.
pub struct LibrqbitEngine {
    session: Arc<Session>,
}

impl LibrqbitEngine {
    /// Start a session that downloads under `download_path` by default.
    pub async fn new(config: &LibrqbitConfig, download_path: &Path) -> Result<Self, TransferError> {
        std::fs::create_dir_all(download_path).map_err(|e| {
            TransferError::Unavailable(format!("Failed to create download directory: {}", e))
        })?;

        let mut opts = SessionOptions::default();

        if !config.enable_dht {
            opts.disable_dht = true;
        }

        // Range, not RangeInclusive
        if let Some(port) = config.listen_port {
            opts.listen_port_range = Some(port..(port + 1));
        }

        if let Some(ref persistence_dir) = config.persistence_path {
            std::fs::create_dir_all(persistence_dir).map_err(|e| {
                TransferError::Unavailable(format!(
                    "Failed to create persistence directory: {}",
                    e
                ))
            })?;
            opts.persistence = Some(SessionPersistenceConfig::Json {
                folder: Some(persistence_dir.clone()),
            });
        }

        info!(
            download_path = %download_path.display(),
            dht_enabled = !opts.disable_dht,
            "Initializing librqbit session"
        );

        let session = Session::new_with_opts(download_path.to_path_buf(), opts)
            .await
            .map_err(|e| {
                TransferError::Unavailable(format!("Failed to initialize librqbit session: {}", e))
            })?;

        if let Some(port) = session.tcp_listen_port() {
            info!(port = port, "librqbit listening on TCP port");
        }

        Ok(Self { session })
    }
}

#[async_trait]
impl TransferEngine for LibrqbitEngine {
    fn name(&self) -> &str {
        "librqbit"
    }

    async fn submit(
        &self,
        descriptor: &str,
        destination: &Path,
    ) -> Result<Arc<dyn TransferHandle>, TransferError> {
        let key = derive_key(descriptor)
            .map_err(|e| TransferError::InvalidDescriptor(e.to_string()))?;

        debug!(key = %key, destination = %destination.display(), "Transfer submitted");

        Ok(Arc::new(LibrqbitTransfer {
            session: Arc::clone(&self.session),
            key,
            descriptor: descriptor.trim().replace("&amp;", "&"),
            destination: destination.to_path_buf(),
            torrent: Mutex::new(None),
        }))
    }
}

/// Format an info hash the way catalog keys are written (lowercase hex).
fn format_hash(hash: &librqbit_core::Id20) -> String {
    hash.as_string()
}

/// A torrent in the session. Added lazily by `await_metadata`, since adding a
/// magnet blocks until its metadata has been fetched from peers.
struct LibrqbitTransfer {
    session: Arc<Session>,
    key: String,
    descriptor: String,
    destination: PathBuf,
    torrent: Mutex<Option<Arc<ManagedTorrent>>>,
}

impl LibrqbitTransfer {
    fn torrent(&self) -> Result<Arc<ManagedTorrent>, TransferError> {
        self.torrent
            .lock()
            .map_err(|_| TransferError::Engine("transfer lock poisoned".to_string()))?
            .clone()
            .ok_or_else(|| TransferError::NotStarted(self.key.clone()))
    }

    fn set_torrent(&self, torrent: Arc<ManagedTorrent>) -> Result<(), TransferError> {
        *self
            .torrent
            .lock()
            .map_err(|_| TransferError::Engine("transfer lock poisoned".to_string()))? =
            Some(torrent);
        Ok(())
    }
}

#[async_trait]
impl TransferHandle for LibrqbitTransfer {
    async fn await_metadata(&self) -> Result<TransferMetadata, TransferError> {
        let opts = AddTorrentOptions {
            output_folder: Some(self.destination.to_string_lossy().into_owned()),
            overwrite: true,
            ..Default::default()
        };

        let response = self
            .session
            .add_torrent(AddTorrent::from_url(&self.descriptor), Some(opts))
            .await
            .map_err(|e| TransferError::Engine(format!("Failed to add torrent: {}", e)))?;

        let handle = match response {
            AddTorrentResponse::Added(_, handle) => handle,
            AddTorrentResponse::AlreadyManaged(_, handle) => {
                warn!(key = %self.key, "Torrent already managed by the session");
                handle
            }
            AddTorrentResponse::ListOnly(_) => {
                return Err(TransferError::Engine(
                    "Torrent was added in list-only mode".to_string(),
                ))
            }
        };

        let info_hash = format_hash(&handle.info_hash());
        if info_hash != self.key {
            warn!(key = %self.key, info_hash = %info_hash, "Session reports a different info hash");
        }

        let name = handle
            .name()
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("torrent-{}", &self.key[..8]));
        let total_bytes = handle.stats().total_bytes;
        self.set_torrent(handle)?;

        debug!(key = %self.key, name = %name, total_bytes, "Metadata resolved");
        Ok(TransferMetadata { name, total_bytes })
    }

    async fn sample_progress(&self) -> Result<TransferProgress, TransferError> {
        let stats = self.torrent()?.stats();
        Ok(TransferProgress {
            done_bytes: stats.progress_bytes,
            total_bytes: stats.total_bytes,
        })
    }

    async fn pause(&self) -> Result<(), TransferError> {
        let torrent = self.torrent()?;
        self.session
            .pause(&torrent)
            .await
            .map_err(|e| TransferError::Engine(format!("Failed to pause torrent: {}", e)))?;
        debug!(key = %self.key, "Torrent paused");
        Ok(())
    }

    async fn resume(&self) -> Result<(), TransferError> {
        let torrent = self.torrent()?;
        self.session
            .unpause(&torrent)
            .await
            .map_err(|e| TransferError::Engine(format!("Failed to resume torrent: {}", e)))?;
        debug!(key = %self.key, "Torrent resumed");
        Ok(())
    }

    async fn cancel(&self) -> Result<(), TransferError> {
        let torrent = match self.torrent() {
            Ok(torrent) => torrent,
            // Never added to the session, nothing to release
            Err(TransferError::NotStarted(_)) => return Ok(()),
            Err(e) => return Err(e),
        };

        self.session
            .delete(torrent.id().into(), false)
            .await
            .map_err(|e| TransferError::Engine(format!("Failed to remove torrent: {}", e)))?;
        debug!(key = %self.key, "Torrent removed from session");
        Ok(())
    }
}
