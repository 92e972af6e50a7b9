//! Persistence layer for durable execution
//!
//! This module provides:
//! - [`ExecutionStore`] trait for execution and step persistence
//! - [`SqliteExecutionStore`] for crash-resumable deployments
//! - [`InMemoryExecutionStore`] for tests and degraded mode
//! - [`open_store`] to pick one from [`EngineConfig`]

mod memory;
mod sqlite;
mod store;

use std::sync::Arc;

use tracing::warn;

use crate::config::EngineConfig;

pub use memory::InMemoryExecutionStore;
pub use sqlite::SqliteExecutionStore;
pub use store::{ExecutionFilter, ExecutionStore, StoreError};

/// Open the store selected by `config`
///
/// Uses SQLite when a database URL is configured. Without one, falls back to
/// the in-memory store: executions work but are lost on restart.
pub async fn open_store(config: &EngineConfig) -> Result<Arc<dyn ExecutionStore>, StoreError> {
    match &config.database_url {
        Some(url) => Ok(Arc::new(SqliteExecutionStore::connect(url).await?)),
        None => {
            warn!("DATABASE_URL not set, using in-memory execution store (no crash resumption)");
            Ok(Arc::new(InMemoryExecutionStore::new()))
        }
    }
}
