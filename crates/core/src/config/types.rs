use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

use crate::orchestrator::OrchestratorConfig;

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub events: EventsConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub torrent_client: TorrentClientConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Directory served as a fallback for non-API paths.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub static_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            static_dir: None,
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

/// Where payloads and the catalog snapshot live, and how much space they may use
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Catalog snapshot file.
    #[serde(default = "default_catalog_path")]
    pub catalog_path: PathBuf,
    /// Root directory for downloaded payloads.
    #[serde(default = "default_storage_path")]
    pub storage_path: PathBuf,
    /// Storage quota in MiB.
    pub quota_mb: u64,
}

impl StorageConfig {
    /// Quota in bytes.
    pub fn quota_bytes(&self) -> u64 {
        self.quota_mb.saturating_mul(BYTES_PER_MB)
    }
}

fn default_catalog_path() -> PathBuf {
    PathBuf::from("catalog.json")
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("storage")
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("swatchr.db")
}

/// Change feed configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EventsConfig {
    /// Per-subscriber queue length. A subscriber that falls this far behind is dropped.
    #[serde(default = "default_subscriber_capacity")]
    pub subscriber_capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            subscriber_capacity: default_subscriber_capacity(),
        }
    }
}

fn default_subscriber_capacity() -> usize {
    256
}

/// Transfer engine configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TorrentClientConfig {
    #[serde(default)]
    pub backend: TorrentClientBackend,
    #[serde(default)]
    pub librqbit: LibrqbitConfig,
}

/// Available transfer engines
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TorrentClientBackend {
    #[default]
    Librqbit,
}

/// Embedded librqbit session configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LibrqbitConfig {
    #[serde(default = "default_enable_dht")]
    pub enable_dht: bool,
    /// Fixed TCP listen port. A random port is used when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listen_port: Option<u16>,
    /// Directory for session state. Sessions are not persisted when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistence_path: Option<PathBuf>,
}

impl Default for LibrqbitConfig {
    fn default() -> Self {
        Self {
            enable_dht: default_enable_dht(),
            listen_port: None,
            persistence_path: None,
        }
    }
}

fn default_enable_dht() -> bool {
    true
}
