//! StrategyStore trait: pluggable, append-only strategy persistence
//!
//! Abstracts strategy and scenario persistence so backends can be swapped
//! without touching the manager:
//! - `InMemoryStrategyStore`: in-memory store for tests and one-shot CLI runs
//! - `SledStrategyStore`: durable embedded store

use std::collections::BTreeMap;
use std::sync::RwLock;

use crate::types::{ScenarioRecord, StrategyId, StrategyRecord};

/// Trait for pluggable persistence backends.
///
/// Records are never updated or deleted. Implementations must be thread-safe
/// (Send + Sync) for shared access across async tasks.
pub trait StrategyStore: Send + Sync {
    /// Append a strategy record; an existing id is rejected.
    fn append_strategy(&self, record: &StrategyRecord) -> Result<(), PersistenceError>;

    fn get_strategy(&self, id: &StrategyId) -> Result<Option<StrategyRecord>, PersistenceError>;

    /// Every strategy record, oldest first.
    fn all_strategies(&self) -> Result<Vec<StrategyRecord>, PersistenceError>;

    /// Records for one field, oldest first.
    fn field_history(&self, field_id: &str) -> Result<Vec<StrategyRecord>, PersistenceError> {
        Ok(self
            .all_strategies()?
            .into_iter()
            .filter(|r| r.request.field_id == field_id)
            .collect())
    }

    /// Most recent record per (field, crop), ordered by field then crop.
    fn latest_strategies(&self) -> Result<Vec<StrategyRecord>, PersistenceError> {
        let mut latest: BTreeMap<(String, String), StrategyRecord> = BTreeMap::new();
        for r in self.all_strategies()? {
            let key = (r.request.field_id.clone(), r.request.crop_id.clone());
            latest.insert(key, r);
        }
        Ok(latest.into_values().collect())
    }

    fn append_scenario(&self, record: &ScenarioRecord) -> Result<(), PersistenceError>;

    /// Scenario comparisons made against one strategy, oldest first.
    fn scenarios_for(&self, id: &StrategyId) -> Result<Vec<ScenarioRecord>, PersistenceError>;

    /// Backend name for logging
    fn backend_name(&self) -> &'static str;
}

/// Persistence errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PersistenceError {
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("strategy {strategy_id} already stored")]
    Duplicate { strategy_id: String },
}

impl From<serde_json::Error> for PersistenceError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<sled::Error> for PersistenceError {
    fn from(err: sled::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

/// In-memory persistence for tests and one-shot runs
///
/// Thread-safe via `RwLock`. Not durable: data lost on restart.
#[derive(Default)]
pub struct InMemoryStrategyStore {
    strategies: RwLock<Vec<StrategyRecord>>,
    scenarios: RwLock<Vec<ScenarioRecord>>,
}

impl InMemoryStrategyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StrategyStore for InMemoryStrategyStore {
    fn append_strategy(&self, record: &StrategyRecord) -> Result<(), PersistenceError> {
        let mut store = self
            .strategies
            .write()
            .map_err(|e| PersistenceError::Storage(e.to_string()))?;

        if store.iter().any(|r| r.strategy_id == record.strategy_id) {
            return Err(PersistenceError::Duplicate {
                strategy_id: record.strategy_id.to_string(),
            });
        }
        store.push(record.clone());
        Ok(())
    }

    fn get_strategy(&self, id: &StrategyId) -> Result<Option<StrategyRecord>, PersistenceError> {
        let store = self
            .strategies
            .read()
            .map_err(|e| PersistenceError::Storage(e.to_string()))?;

        Ok(store.iter().find(|r| &r.strategy_id == id).cloned())
    }

    fn all_strategies(&self) -> Result<Vec<StrategyRecord>, PersistenceError> {
        let store = self
            .strategies
            .read()
            .map_err(|e| PersistenceError::Storage(e.to_string()))?;

        Ok(store.clone())
    }

    fn append_scenario(&self, record: &ScenarioRecord) -> Result<(), PersistenceError> {
        let mut store = self
            .scenarios
            .write()
            .map_err(|e| PersistenceError::Storage(e.to_string()))?;

        store.push(record.clone());
        Ok(())
    }

    fn scenarios_for(&self, id: &StrategyId) -> Result<Vec<ScenarioRecord>, PersistenceError> {
        let store = self
            .scenarios
            .read()
            .map_err(|e| PersistenceError::Storage(e.to_string()))?;

        Ok(store.iter().filter(|r| &r.strategy_id == id).cloned().collect())
    }

    fn backend_name(&self) -> &'static str {
        "InMemory"
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::record;
    use super::*;

    #[test]
    fn test_in_memory_append_and_get() {
        let store = InMemoryStrategyStore::new();
        let r = record("f1", "corn", 1);
        store.append_strategy(&r).unwrap();
        assert_eq!(store.get_strategy(&r.strategy_id).unwrap(), Some(r));
        assert_eq!(store.get_strategy(&StrategyId::new()).unwrap(), None);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let store = InMemoryStrategyStore::new();
        let r = record("f1", "corn", 1);
        store.append_strategy(&r).unwrap();
        assert!(matches!(
            store.append_strategy(&r),
            Err(PersistenceError::Duplicate { .. })
        ));
        assert_eq!(store.all_strategies().unwrap().len(), 1);
    }

    #[test]
    fn test_latest_per_field_and_crop() {
        let store = InMemoryStrategyStore::new();
        let old = record("f1", "corn", 1);
        let new = record("f1", "corn", 2);
        let wheat = record("f1", "wheat", 1);
        let other = record("f2", "corn", 1);
        for r in [&old, &wheat, &new, &other] {
            store.append_strategy(r).unwrap();
        }

        let latest = store.latest_strategies().unwrap();
        let ids: Vec<_> = latest.iter().map(|r| r.strategy_id).collect();
        assert_eq!(ids, vec![new.strategy_id, wheat.strategy_id, other.strategy_id]);

        let history = store.field_history("f1").unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].strategy_id, old.strategy_id);
    }

    #[test]
    fn test_trait_object() {
        let store: Box<dyn StrategyStore> = Box::new(InMemoryStrategyStore::new());
        assert_eq!(store.backend_name(), "InMemory");
        store.append_strategy(&record("f1", "corn", 3)).unwrap();
        assert_eq!(store.field_history("f1").unwrap().len(), 1);
        assert!(store.field_history("f9").unwrap().is_empty());
    }
}
