use serde::{Deserialize, Serialize};

use crate::catalog::EntityRecord;
use crate::format::format_size;

/// What happened to an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    EntityAdded,
    MetadataResolved,
    ProgressUpdated,
    Completed,
    Paused,
    Resumed,
    Failed,
    Removed,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::EntityAdded => "entity_added",
            ChangeKind::MetadataResolved => "metadata_resolved",
            ChangeKind::ProgressUpdated => "progress_updated",
            ChangeKind::Completed => "completed",
            ChangeKind::Paused => "paused",
            ChangeKind::Resumed => "resumed",
            ChangeKind::Failed => "failed",
            ChangeKind::Removed => "removed",
        }
    }
}

/// One entry of the change feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub kind: ChangeKind,
    pub key: String,
    pub title: String,
    /// Engine-reported name, empty until metadata resolves.
    pub name: String,
    /// Human-readable size, empty until metadata resolves.
    pub size_formatted: String,
    pub progress_percent: u8,
    /// Seconds until completion. Absent while the estimate is unknown.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eta_seconds: Option<u64>,
    /// Why the entity failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Change {
    /// Build a change describing `record` as it is now.
    pub fn from_record(kind: ChangeKind, record: &EntityRecord) -> Self {
        let size_formatted = if record.size_bytes > 0 {
            format_size(record.size_bytes)
        } else {
            String::new()
        };
        let progress_percent = match kind {
            ChangeKind::Completed => 100,
            _ => 0,
        };

        Self {
            kind,
            key: record.key.clone(),
            title: record.title.clone(),
            name: record.resolved_name.clone(),
            size_formatted,
            progress_percent,
            eta_seconds: None,
            reason: None,
        }
    }

    pub fn with_progress(mut self, percent: u8, eta_seconds: Option<u64>) -> Self {
        self.progress_percent = percent.min(100);
        self.eta_seconds = eta_seconds;
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::EntityState;
    use chrono::Utc;
    use std::path::PathBuf;

    fn record(size_bytes: u64) -> EntityRecord {
        EntityRecord {
            key: "abc".to_string(),
            title: "Movie".to_string(),
            descriptor: String::new(),
            resolved_name: if size_bytes > 0 {
                "movie.mkv".to_string()
            } else {
                String::new()
            },
            storage_path: PathBuf::from("/data/Movie"),
            size_bytes,
            state: EntityState::Active,
            added_at: Utc::now(),
        }
    }

    #[test]
    fn test_wire_format_is_flat_snake_case() {
        let change = Change::from_record(ChangeKind::ProgressUpdated, &record(1536))
            .with_progress(42, Some(90));
        let value = serde_json::to_value(&change).unwrap();

        assert_eq!(value["kind"], "progress_updated");
        assert_eq!(value["key"], "abc");
        assert_eq!(value["title"], "Movie");
        assert_eq!(value["name"], "movie.mkv");
        assert_eq!(value["size_formatted"], "1.5K");
        assert_eq!(value["progress_percent"], 42);
        assert_eq!(value["eta_seconds"], 90);
        assert!(value.get("reason").is_none());
    }

    #[test]
    fn test_unknown_estimate_is_omitted() {
        let change = Change::from_record(ChangeKind::ProgressUpdated, &record(10))
            .with_progress(5, None);
        let json = serde_json::to_string(&change).unwrap();
        assert!(!json.contains("eta_seconds"));
    }

    #[test]
    fn test_entity_added_has_no_size() {
        let change = Change::from_record(ChangeKind::EntityAdded, &record(0));
        assert_eq!(change.size_formatted, "");
        assert_eq!(change.name, "");
        assert_eq!(change.progress_percent, 0);
    }

    #[test]
    fn test_completed_is_full() {
        let change = Change::from_record(ChangeKind::Completed, &record(2048));
        assert_eq!(change.progress_percent, 100);
        assert_eq!(change.size_formatted, "2K");
    }

    #[test]
    fn test_failed_carries_reason() {
        let change = Change::from_record(ChangeKind::Failed, &record(0)).with_reason("quota");
        let value = serde_json::to_value(&change).unwrap();
        assert_eq!(value["kind"], "failed");
        assert_eq!(value["reason"], "quota");
    }
}
