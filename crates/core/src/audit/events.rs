use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Audit event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    // System events
    ServiceStarted {
        version: String,
        config_hash: String,
    },
    ServiceStopped {
        reason: String,
    },

    // Entity lifecycle
    EntityAdded {
        key: String,
        title: String,
        storage_path: String,
    },
    MetadataResolved {
        key: String,
        /// Name reported by the transfer engine
        name: String,
        size_bytes: u64,
    },
    EntityStateChanged {
        key: String,
        from_state: String,
        to_state: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    EntityRemoved {
        key: String,
        /// State the entity was in when removed
        previous_state: String,
        /// Bytes returned to the quota
        freed_bytes: u64,
    },
    /// Metadata resolved but the payload did not fit in the quota.
    QuotaRejected {
        key: String,
        requested_bytes: u64,
        used_bytes: u64,
        quota_bytes: u64,
    },
}

impl AuditEvent {
    /// Returns the event type as a string for storage
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ServiceStarted { .. } => "service_started",
            Self::ServiceStopped { .. } => "service_stopped",
            Self::EntityAdded { .. } => "entity_added",
            Self::MetadataResolved { .. } => "metadata_resolved",
            Self::EntityStateChanged { .. } => "entity_state_changed",
            Self::EntityRemoved { .. } => "entity_removed",
            Self::QuotaRejected { .. } => "quota_rejected",
        }
    }

    /// Extract the entity key if this event concerns one entity
    pub fn entity_key(&self) -> Option<&str> {
        match self {
            Self::EntityAdded { key, .. }
            | Self::MetadataResolved { key, .. }
            | Self::EntityStateChanged { key, .. }
            | Self::EntityRemoved { key, .. }
            | Self::QuotaRejected { key, .. } => Some(key),
            Self::ServiceStarted { .. } | Self::ServiceStopped { .. } => None,
        }
    }
}

/// A stored audit record with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_key: Option<String>,
    pub data: AuditEvent,
}

impl AuditRecord {
    /// Record for an event that happened now. The id is assigned on insert.
    pub fn now(event: AuditEvent) -> Self {
        Self {
            id: 0,
            timestamp: Utc::now(),
            event_type: event.event_type().to_string(),
            entity_key: event.entity_key().map(String::from),
            data: event,
        }
    }
}
