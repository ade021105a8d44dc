//! Bazaar Sync - Marketplace Catalog Import & Reconciliation Engine
//!
//! Imports catalog, vendor, and identity data from a Dokan-style marketplace
//! REST API into the internal catalog store on a recurring, re-runnable basis.
//! The engine guarantees that repeated imports never duplicate data, that
//! external identities stay stable across runs, and that partial failures do
//! not corrupt previously-synced state.

// Module declarations
pub mod domain;
pub mod application;
pub mod infrastructure;

// Re-export the pieces a caller needs to wire a pipeline
pub use application::sync_orchestrator::SyncOrchestrator;
pub use domain::errors::{SyncError, SyncResult};
pub use infrastructure::config::AppConfig;

#[cfg(test)]
pub mod test_support;
