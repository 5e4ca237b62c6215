//! Acquisition catalog.
//!
//! Tracks every acquisition by content key, enforces the storage quota and
//! the entity lifecycle, and persists the whole catalog as a snapshot file.

mod fs;
mod key;
mod store;
mod types;

pub use fs::{path_size, remove_path, sanitize_title, unique_storage_path};
pub use key::{derive_key, local_key};
pub use store::CatalogStore;
pub use types::*;
