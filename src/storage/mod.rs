//! Strategy Storage
//!
//! Append-only persistence of optimization runs and scenario comparisons,
//! behind the `StrategyStore` trait.

pub mod persistence;
mod sled_store;

pub use persistence::{InMemoryStrategyStore, PersistenceError, StrategyStore};
pub use sled_store::SledStrategyStore;

use std::sync::Arc;

use crate::config::{StorageBackend, StorageConfig};

/// Open the backend named in `config`.
pub fn open_store(config: &StorageConfig) -> Result<Arc<dyn StrategyStore>, PersistenceError> {
    let store: Arc<dyn StrategyStore> = match config.backend {
        StorageBackend::Memory => Arc::new(InMemoryStrategyStore::new()),
        StorageBackend::Sled => Arc::new(SledStrategyStore::open(&config.path)?),
    };
    tracing::info!(backend = store.backend_name(), "Strategy store ready");
    Ok(store)
}
