//! The operations the transport layer is allowed to call.

use async_trait::async_trait;

use super::types::{OrchestratorError, OrchestratorStatus};
use crate::catalog::{CatalogSnapshot, CatalogStats, EntityRecord};
use crate::events::Subscription;

/// Catalog operations exposed to request handlers.
#[async_trait]
pub trait CatalogService: Send + Sync {
    /// Register an acquisition and start it in the background.
    /// Returns as soon as the entity is recorded.
    async fn request_add(
        &self,
        title: &str,
        descriptor: &str,
    ) -> Result<EntityRecord, OrchestratorError>;

    /// Stop, cancel and delete an entity.
    async fn request_remove(&self, key: &str) -> Result<EntityRecord, OrchestratorError>;

    async fn pause(&self, key: &str) -> Result<EntityRecord, OrchestratorError>;

    async fn resume(&self, key: &str) -> Result<EntityRecord, OrchestratorError>;

    fn list(&self) -> Result<CatalogSnapshot, OrchestratorError>;

    fn get(&self, key: &str) -> Option<EntityRecord>;

    fn stats(&self) -> Result<CatalogStats, OrchestratorError>;

    /// Subscribe to the change feed.
    ///
    /// The snapshot is taken after the subscription is registered, so a
    /// change is either reflected in the snapshot or delivered on the stream.
    fn subscribe(&self) -> Result<(CatalogSnapshot, Subscription), OrchestratorError>;

    async fn status(&self) -> OrchestratorStatus;
}
