//! Acquisition orchestrator.
//!
//! Composes the catalog, the change feed and the transfer engine:
//! - **Add**: record the entity, hand it to the engine, return immediately
//! - **Metadata**: one background task per entity waits for name and size
//! - **Progress**: the same task then runs the lifecycle estimator

mod config;
mod runner;
mod service;
mod types;

pub use config::OrchestratorConfig;
pub use runner::Orchestrator;
pub use service::CatalogService;
pub use types::{ActiveTransfer, OrchestratorError, OrchestratorStatus};
