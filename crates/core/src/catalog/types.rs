//! Types for the acquisition catalog.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle state of a catalog entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityState {
    /// Key and title known, waiting for the transfer engine to report metadata.
    Indexing,
    /// Name and size known, transfer in progress.
    Active,
    /// Transfer suspended by an external command.
    Paused,
    /// Transfer complete. The record stays in the catalog.
    Done,
    /// Setup or transfer could not proceed (metadata timeout, engine error, quota).
    Failed,
}

impl EntityState {
    /// Every state, in lifecycle order.
    pub const ALL: [EntityState; 5] = [
        EntityState::Indexing,
        EntityState::Active,
        EntityState::Paused,
        EntityState::Done,
        EntityState::Failed,
    ];

    /// Returns the string representation for API responses.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityState::Indexing => "indexing",
            EntityState::Active => "active",
            EntityState::Paused => "paused",
            EntityState::Done => "done",
            EntityState::Failed => "failed",
        }
    }

    /// Terminal states accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, EntityState::Done | EntityState::Failed)
    }

    /// Whether `next` is reachable from this state in one step.
    pub fn can_transition_to(&self, next: EntityState) -> bool {
        use EntityState::*;

        matches!(
            (self, next),
            (Indexing, Active)
                | (Active, Done)
                | (Active, Paused)
                | (Paused, Active)
                | (Indexing, Failed)
                | (Active, Failed)
                | (Paused, Failed)
        )
    }
}

impl fmt::Display for EntityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One tracked acquisition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRecord {
    /// Content key (lowercase hex info hash).
    pub key: String,
    /// Label supplied when the acquisition was requested.
    pub title: String,
    /// Descriptor the entity was created from (magnet URI).
    /// Empty for entries discovered in the storage directory.
    #[serde(default)]
    pub descriptor: String,
    /// Canonical name reported by the transfer engine.
    #[serde(default)]
    pub resolved_name: String,
    /// Where the payload lives on disk.
    pub storage_path: PathBuf,
    /// Total size in bytes, 0 until metadata resolves.
    pub size_bytes: u64,
    /// Current lifecycle state.
    pub state: EntityState,
    /// When the entity was registered.
    pub added_at: DateTime<Utc>,
}

impl EntityRecord {
    /// Resolved name if known, otherwise the title.
    pub fn display_name(&self) -> &str {
        if self.resolved_name.is_empty() {
            &self.title
        } else {
            &self.resolved_name
        }
    }
}

/// Read-only view of the whole catalog. Also the on-disk snapshot format.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    /// Configured ceiling on committed bytes.
    pub quota_bytes: u64,
    /// Bytes committed across all entities.
    pub used_bytes: u64,
    /// Every record, in insertion order.
    pub records: Vec<EntityRecord>,
}

impl CatalogSnapshot {
    /// Find a record by key.
    pub fn get(&self, key: &str) -> Option<&EntityRecord> {
        self.records.iter().find(|r| r.key == key)
    }
}

/// Catalog statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogStats {
    pub quota_bytes: u64,
    pub used_bytes: u64,
    pub free_bytes: u64,
    pub total_entities: usize,
    /// Entity count per state name.
    pub by_state: BTreeMap<String, usize>,
}

/// Errors for catalog operations.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Invalid descriptor: {0}")]
    InvalidDescriptor(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Quota exceeded: {requested} bytes requested, {used} of {quota} bytes used")]
    QuotaExceeded { requested: u64, used: u64, quota: u64 },

    #[error("Illegal transition for {key}: {from} -> {to}")]
    IllegalTransition {
        key: String,
        from: EntityState,
        to: EntityState,
    },

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
