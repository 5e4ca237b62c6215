pub mod audit;
pub mod catalog;
pub mod config;
pub mod estimator;
pub mod events;
pub mod format;
pub mod metrics;
pub mod orchestrator;
pub mod testing;
pub mod transfer;

pub use audit::{
    create_audit_system, AuditError, AuditEvent, AuditFilter, AuditHandle, AuditPage, AuditRecord,
    AuditStore, AuditWriter, SqliteAuditStore,
};
pub use catalog::{
    derive_key, CatalogError, CatalogSnapshot, CatalogStats, CatalogStore, EntityRecord,
    EntityState,
};
pub use config::{load_config, load_config_from_str, validate_config, Config, ConfigError};
pub use events::{Change, ChangeKind, EventBus, Subscription};
pub use format::format_size;
pub use orchestrator::{
    CatalogService, Orchestrator, OrchestratorConfig, OrchestratorError, OrchestratorStatus,
};
pub use transfer::{
    LibrqbitEngine, TransferEngine, TransferError, TransferHandle, TransferMetadata,
    TransferProgress,
};
