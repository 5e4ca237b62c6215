//! Testing utilities and mock implementations.
//!
//! Public so that integration tests in both crates can drive the catalog
//! without a real torrent session.
//!
//! # Example
//!
//! ```rust,ignore
//! use swatchr_core::testing::{fixtures, MockTransferEngine};
//!
//! let engine = MockTransferEngine::new();
//! let hash = fixtures::hash(1);
//! engine.set_metadata(&hash, "movie.mkv", 600).await;
//! engine.set_progress_script(&hash, vec![(300, 600), (600, 600)]).await;
//! ```

mod mock_transfer_engine;

pub use mock_transfer_engine::{MockTransferEngine, RecordedSubmit};

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::path::Path;

    use crate::config::{load_config_from_str, Config};

    /// A distinct 40-hex info hash for each `n`.
    pub fn hash(n: u32) -> String {
        format!("{:040x}", n)
    }

    /// A magnet URI for `hash` with a display name, as browsers submit it.
    pub fn magnet(hash: &str) -> String {
        format!(
            "magnet:?xt=urn:btih:{}&amp;dn=Test+Item&amp;tr=udp%3A%2F%2Ftracker.example%3A80",
            hash.to_uppercase()
        )
    }

    /// A valid configuration rooted in `dir` with fast sampling.
    pub fn config(dir: &Path, quota_mb: u64) -> Config {
        let toml = format!(
            r#"
[server]
host = "127.0.0.1"
port = 8080

[storage]
catalog_path = "{catalog}"
storage_path = "{storage}"
quota_mb = {quota_mb}

[database]
path = "{db}"

[orchestrator]
sample_interval_ms = 5
velocity_window = 3
metadata_timeout_secs = 5

[torrent_client.librqbit]
enable_dht = false
"#,
            catalog = dir.join("catalog.json").display(),
            storage = dir.join("storage").display(),
            db = dir.join("audit.db").display(),
            quota_mb = quota_mb,
        );
        // Only fails if the template above is malformed
        load_config_from_str(&toml).unwrap_or_else(|e| panic!("invalid test config: {}", e))
    }
}
