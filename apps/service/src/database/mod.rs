/// Time-series persistence
///
/// Two append-only collections (checks, speed tests) in an embedded LibSQL database,
/// accessed through the [`Store`] trait so engine tasks stay storage-agnostic.
pub mod migrations;
pub mod models;
pub mod repository;

pub use repository::{LibsqlStore, Store, StoreError, StoreResult};

use anyhow::Result;

/// Initialize database with schema
pub async fn initialize_database(conn: &libsql::Connection) -> Result<()> {
    migrations::run_migrations(conn).await
}
