//! In-memory catalog backed by whole-snapshot persistence.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use tracing::{debug, error, info, warn};

use super::fs::{path_size, remove_path, unique_storage_path};
use super::key::{derive_key, local_key};
use super::{CatalogError, CatalogSnapshot, CatalogStats, EntityRecord, EntityState};
use crate::metrics::{CATALOG_QUOTA_BYTES, CATALOG_USED_BYTES, ENTITIES_BY_STATE};

/// Registry of acquisitions, one record per content key.
///
/// A single mutex covers both the in-memory state and the snapshot file.
/// Every mutation is applied to a staged copy, the copy is written to disk,
/// and only then is it installed, so memory never holds state that is not
/// durable.
pub struct CatalogStore {
    inner: Mutex<CatalogState>,
    snapshot_path: PathBuf,
    storage_root: PathBuf,
}

#[derive(Debug, Clone)]
struct CatalogState {
    quota_bytes: u64,
    used_bytes: u64,
    records: HashMap<String, EntityRecord>,
    /// Keys in insertion order.
    order: Vec<String>,
}

impl CatalogState {
    fn empty(quota_bytes: u64) -> Self {
        Self {
            quota_bytes,
            used_bytes: 0,
            records: HashMap::new(),
            order: Vec::new(),
        }
    }

    fn from_snapshot(snapshot: CatalogSnapshot) -> Self {
        let mut state = Self::empty(snapshot.quota_bytes);
        for record in snapshot.records {
            state.insert(record);
        }

        let committed: u64 = state.records.values().map(|r| r.size_bytes).sum();
        if committed != snapshot.used_bytes {
            warn!(
                persisted = snapshot.used_bytes,
                computed = committed,
                "Snapshot used_bytes disagrees with record sizes, using computed value"
            );
        }
        state.used_bytes = committed;
        state
    }

    fn to_snapshot(&self) -> CatalogSnapshot {
        CatalogSnapshot {
            quota_bytes: self.quota_bytes,
            used_bytes: self.used_bytes,
            records: self
                .order
                .iter()
                .filter_map(|key| self.records.get(key).cloned())
                .collect(),
        }
    }

    fn insert(&mut self, record: EntityRecord) {
        if self.records.insert(record.key.clone(), record.clone()).is_none() {
            self.order.push(record.key);
        }
    }

    fn remove(&mut self, key: &str) -> Option<EntityRecord> {
        let record = self.records.remove(key)?;
        self.order.retain(|k| k != key);
        Some(record)
    }

    fn get_mut(&mut self, key: &str) -> Result<&mut EntityRecord, CatalogError> {
        self.records
            .get_mut(key)
            .ok_or_else(|| CatalogError::NotFound(key.to_string()))
    }

    /// Add `bytes` to the committed total. The only place usage grows.
    fn charge(&mut self, bytes: u64, enforce_quota: bool) -> Result<(), CatalogError> {
        let next = self.used_bytes.saturating_add(bytes);
        if enforce_quota && next > self.quota_bytes {
            return Err(CatalogError::QuotaExceeded {
                requested: bytes,
                used: self.used_bytes,
                quota: self.quota_bytes,
            });
        }
        self.used_bytes = next;
        Ok(())
    }

    /// Return `bytes` to the free pool. The only place usage shrinks.
    fn release(&mut self, bytes: u64) {
        self.used_bytes = self.used_bytes.saturating_sub(bytes);
    }

    fn transition(&mut self, key: &str, to: EntityState) -> Result<&mut EntityRecord, CatalogError> {
        let record = self.get_mut(key)?;
        if !record.state.can_transition_to(to) {
            warn!(
                key = %key,
                from = %record.state,
                to = %to,
                "Rejected illegal state transition"
            );
            return Err(CatalogError::IllegalTransition {
                key: key.to_string(),
                from: record.state,
                to,
            });
        }
        record.state = to;
        Ok(record)
    }

    fn counts_by_state(&self) -> BTreeMap<String, usize> {
        let mut counts: BTreeMap<String, usize> = EntityState::ALL
            .iter()
            .map(|s| (s.as_str().to_string(), 0))
            .collect();
        for record in self.records.values() {
            *counts.entry(record.state.as_str().to_string()).or_default() += 1;
        }
        counts
    }
}

impl CatalogStore {
    /// Open the catalog at `snapshot_path`.
    ///
    /// If no snapshot exists yet, the catalog is seeded from the entries
    /// already present in `storage_root` (each one becomes a `Done` record
    /// sized from the filesystem) and an initial snapshot is written.
    /// The configured quota overrides whatever the snapshot recorded.
    pub fn load(
        snapshot_path: impl Into<PathBuf>,
        storage_root: impl Into<PathBuf>,
        quota_bytes: u64,
    ) -> Result<Self, CatalogError> {
        let snapshot_path = snapshot_path.into();
        let storage_root = storage_root.into();

        fs::create_dir_all(&storage_root).map_err(|e| {
            CatalogError::Io(format!(
                "create storage dir {}: {}",
                storage_root.display(),
                e
            ))
        })?;

        let state = if snapshot_path.exists() {
            let data = fs::read(&snapshot_path).map_err(|e| {
                CatalogError::Io(format!("read {}: {}", snapshot_path.display(), e))
            })?;
            let snapshot: CatalogSnapshot = serde_json::from_slice(&data)
                .map_err(|e| CatalogError::Serialization(e.to_string()))?;

            let mut state = CatalogState::from_snapshot(snapshot);
            if state.quota_bytes != quota_bytes {
                info!(
                    previous = state.quota_bytes,
                    configured = quota_bytes,
                    "Quota changed since last snapshot"
                );
                state.quota_bytes = quota_bytes;
            }
            info!(
                path = %snapshot_path.display(),
                entities = state.records.len(),
                used_bytes = state.used_bytes,
                "Catalog loaded"
            );
            state
        } else {
            let state = seed_from_storage(&storage_root, &snapshot_path, quota_bytes)?;
            write_snapshot(&snapshot_path, &state.to_snapshot())?;
            info!(
                path = %snapshot_path.display(),
                entities = state.records.len(),
                used_bytes = state.used_bytes,
                "Catalog initialized from storage directory"
            );
            state
        };

        update_gauges(&state);

        Ok(Self {
            inner: Mutex::new(state),
            snapshot_path,
            storage_root,
        })
    }

    /// Path of the snapshot file.
    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot_path
    }

    /// Directory holding entity payloads.
    pub fn storage_root(&self) -> &Path {
        &self.storage_root
    }

    /// Register a new acquisition in the `Indexing` state.
    pub fn add_entity(&self, title: &str, descriptor: &str) -> Result<EntityRecord, CatalogError> {
        let key = derive_key(descriptor)?;
        let storage_root = self.storage_root.clone();

        let record = self.commit(|state| {
            if state.records.contains_key(&key) {
                return Err(CatalogError::AlreadyExists(key.clone()));
            }

            let storage_path = unique_storage_path(&storage_root, title, |candidate| {
                state.records.values().any(|r| r.storage_path == candidate)
            });

            let record = EntityRecord {
                key: key.clone(),
                title: title.to_string(),
                descriptor: descriptor.trim().to_string(),
                resolved_name: String::new(),
                storage_path,
                size_bytes: 0,
                state: EntityState::Indexing,
                added_at: Utc::now(),
            };
            state.insert(record.clone());
            Ok(record)
        })?;

        debug!(key = %record.key, path = %record.storage_path.display(), "Entity added");
        Ok(record)
    }

    /// Remove an entity and delete its payload from disk.
    ///
    /// If the payload cannot be deleted the record is kept, so the catalog
    /// never forgets data that still occupies space.
    pub fn remove_entity(&self, key: &str) -> Result<EntityRecord, CatalogError> {
        let record = self.commit(|state| {
            let record = state
                .remove(key)
                .ok_or_else(|| CatalogError::NotFound(key.to_string()))?;

            if let Err(e) = remove_path(&record.storage_path) {
                error!(key = %key, error = %e, "Failed to delete entity payload");
                return Err(e);
            }

            state.release(record.size_bytes);
            Ok(record)
        })?;

        debug!(key = %key, freed = record.size_bytes, "Entity removed");
        Ok(record)
    }

    /// Record resolved metadata and move the entity to `Active`.
    ///
    /// Nothing is applied if the new size does not fit in the quota.
    pub fn commit_info(
        &self,
        key: &str,
        resolved_name: &str,
        size_bytes: u64,
    ) -> Result<EntityRecord, CatalogError> {
        self.commit(|state| {
            let current = state.get_mut(key)?.state;
            if current != EntityState::Indexing {
                warn!(key = %key, state = %current, "Metadata committed outside of indexing");
                return Err(CatalogError::IllegalTransition {
                    key: key.to_string(),
                    from: current,
                    to: EntityState::Active,
                });
            }

            state.charge(size_bytes, true)?;

            let record = state.transition(key, EntityState::Active)?;
            record.resolved_name = resolved_name.to_string();
            record.size_bytes = size_bytes;
            Ok(record.clone())
        })
    }

    /// Whether an entity with this key is registered.
    pub fn exists(&self, key: &str) -> bool {
        self.lock()
            .map(|state| state.records.contains_key(key))
            .unwrap_or(false)
    }

    /// Move an entity to `new_state` if the lifecycle allows it.
    pub fn set_state(&self, key: &str, new_state: EntityState) -> Result<EntityRecord, CatalogError> {
        self.commit(|state| state.transition(key, new_state).map(|r| r.clone()))
    }

    /// Copy of a single record.
    pub fn get(&self, key: &str) -> Option<EntityRecord> {
        self.lock().ok()?.records.get(key).cloned()
    }

    /// Immutable copy of the whole catalog.
    pub fn snapshot(&self) -> Result<CatalogSnapshot, CatalogError> {
        Ok(self.lock()?.to_snapshot())
    }

    /// Space usage and per-state counts.
    pub fn stats(&self) -> Result<CatalogStats, CatalogError> {
        let state = self.lock()?;
        Ok(CatalogStats {
            quota_bytes: state.quota_bytes,
            used_bytes: state.used_bytes,
            free_bytes: state.quota_bytes.saturating_sub(state.used_bytes),
            total_entities: state.records.len(),
            by_state: state.counts_by_state(),
        })
    }

    /// Write the current state to the snapshot file.
    pub fn save(&self) -> Result<(), CatalogError> {
        let state = self.lock()?;
        write_snapshot(&self.snapshot_path, &state.to_snapshot())
    }

    fn lock(&self) -> Result<MutexGuard<'_, CatalogState>, CatalogError> {
        self.inner
            .lock()
            .map_err(|_| CatalogError::Internal("catalog lock poisoned".to_string()))
    }

    /// Apply `op` to a staged copy, persist it, then install it.
    fn commit<T>(
        &self,
        op: impl FnOnce(&mut CatalogState) -> Result<T, CatalogError>,
    ) -> Result<T, CatalogError> {
        let mut state = self.lock()?;
        let mut staged = state.clone();
        let out = op(&mut staged)?;

        write_snapshot(&self.snapshot_path, &staged.to_snapshot())?;
        *state = staged;
        update_gauges(&state);
        Ok(out)
    }
}

fn seed_from_storage(
    storage_root: &Path,
    snapshot_path: &Path,
    quota_bytes: u64,
) -> Result<CatalogState, CatalogError> {
    let mut state = CatalogState::empty(quota_bytes);
    let tmp_path = temp_path(snapshot_path);

    let entries = fs::read_dir(storage_root).map_err(|e| {
        CatalogError::Io(format!("list {}: {}", storage_root.display(), e))
    })?;

    let mut found = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| CatalogError::Io(e.to_string()))?;
        let path = entry.path();
        if path == snapshot_path || path == tmp_path {
            continue;
        }
        found.push(path);
    }
    found.sort();

    for path in found {
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name.to_string(),
            None => {
                warn!(path = %path.display(), "Skipping entry with non UTF-8 name");
                continue;
            }
        };
        let size_bytes = path_size(&path)
            .map_err(|e| CatalogError::Io(format!("size of {}: {}", path.display(), e)))?;

        state.charge(size_bytes, false)?;
        state.insert(EntityRecord {
            key: local_key(&name),
            title: name.clone(),
            descriptor: String::new(),
            resolved_name: name,
            storage_path: path,
            size_bytes,
            state: EntityState::Done,
            added_at: Utc::now(),
        });
    }

    if state.used_bytes > quota_bytes {
        warn!(
            used_bytes = state.used_bytes,
            quota_bytes,
            "Existing storage already exceeds the quota"
        );
    }

    Ok(state)
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Write the snapshot next to its target and rename it into place.
fn write_snapshot(path: &Path, snapshot: &CatalogSnapshot) -> Result<(), CatalogError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| CatalogError::Io(format!("create {}: {}", parent.display(), e)))?;
    }

    let payload = serde_json::to_vec_pretty(snapshot)
        .map_err(|e| CatalogError::Serialization(e.to_string()))?;

    let tmp = temp_path(path);
    fs::write(&tmp, &payload)
        .map_err(|e| CatalogError::Io(format!("write {}: {}", tmp.display(), e)))?;
    fs::rename(&tmp, path).map_err(|e| {
        CatalogError::Io(format!(
            "rename {} -> {}: {}",
            tmp.display(),
            path.display(),
            e
        ))
    })?;
    Ok(())
}

fn update_gauges(state: &CatalogState) {
    CATALOG_USED_BYTES.set(state.used_bytes as i64);
    CATALOG_QUOTA_BYTES.set(state.quota_bytes as i64);
    for (name, count) in state.counts_by_state() {
        ENTITIES_BY_STATE
            .with_label_values(&[name.as_str()])
            .set(count as i64);
    }
}
