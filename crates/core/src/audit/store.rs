use chrono::{DateTime, Utc};
use thiserror::Error;

use super::AuditRecord;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit database: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("audit database directory: {0}")]
    Io(#[from] std::io::Error),

    #[error("audit event payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("stored timestamp {0:?} is not RFC 3339")]
    Timestamp(String),

    #[error("audit connection lock poisoned")]
    Poisoned,
}

/// Which journal rows a query or count covers. Every field left `None`
/// matches everything.
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub entity_key: Option<String>,
    pub event_type: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl AuditFilter {
    pub fn entity(mut self, key: impl Into<String>) -> Self {
        self.entity_key = Some(key.into());
        self
    }

    pub fn kind(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    pub fn between(mut self, since: Option<DateTime<Utc>>, until: Option<DateTime<Utc>>) -> Self {
        self.since = since;
        self.until = until;
        self
    }
}

/// Window into a newest-first result list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuditPage {
    pub limit: i64,
    pub offset: i64,
}

impl AuditPage {
    pub const DEFAULT_LIMIT: i64 = 100;
    pub const MAX_LIMIT: i64 = 1000;

    /// Out-of-range values are clamped rather than rejected.
    pub fn new(limit: Option<i64>, offset: Option<i64>) -> Self {
        Self {
            limit: limit
                .unwrap_or(Self::DEFAULT_LIMIT)
                .clamp(1, Self::MAX_LIMIT),
            offset: offset.unwrap_or(0).max(0),
        }
    }
}

impl Default for AuditPage {
    fn default() -> Self {
        Self::new(None, None)
    }
}

pub trait AuditStore: Send + Sync {
    /// Append a record and return its row id
    fn insert(&self, record: &AuditRecord) -> Result<i64, AuditError>;

    /// Matching records, newest first
    fn query(&self, filter: &AuditFilter, page: AuditPage) -> Result<Vec<AuditRecord>, AuditError>;

    fn count(&self, filter: &AuditFilter) -> Result<i64, AuditError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_defaults() {
        assert_eq!(
            AuditPage::default(),
            AuditPage {
                limit: 100,
                offset: 0
            }
        );
    }

    #[test]
    fn test_page_clamps_out_of_range_values() {
        assert_eq!(AuditPage::new(Some(0), Some(-5)).limit, 1);
        assert_eq!(AuditPage::new(Some(0), Some(-5)).offset, 0);
        assert_eq!(AuditPage::new(Some(50_000), None).limit, 1000);
        assert_eq!(AuditPage::new(Some(25), Some(75)).offset, 75);
    }
}
