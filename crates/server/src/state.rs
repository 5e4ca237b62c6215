use std::sync::Arc;

use swatchr_core::{AuditStore, CatalogService, Config};

/// Shared application state
pub struct AppState {
    config: Config,
    service: Arc<dyn CatalogService>,
    audit_store: Arc<dyn AuditStore>,
}

impl AppState {
    pub fn new(
        config: Config,
        service: Arc<dyn CatalogService>,
        audit_store: Arc<dyn AuditStore>,
    ) -> Self {
        Self {
            config,
            service,
            audit_store,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn service(&self) -> &dyn CatalogService {
        self.service.as_ref()
    }

    pub fn audit_store(&self) -> &dyn AuditStore {
        self.audit_store.as_ref()
    }
}
