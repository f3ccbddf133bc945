//! Sled-backed strategy store
//!
//! Trees:
//! - `strategies`: sequence number (big-endian u64) -> JSON `StrategyRecord`
//! - `strategy_index`: strategy uuid bytes -> sequence number
//! - `scenarios`: strategy uuid bytes ++ sequence number -> JSON `ScenarioRecord`
//!
//! Sequence numbers come from `Db::generate_id`, so iteration order is
//! append order across restarts.

use std::path::Path;

use sled::transaction::{abort, TransactionError};
use sled::{Db, Transactional, Tree};
use tracing::{debug, info, warn};

use crate::types::{ScenarioRecord, StrategyId, StrategyRecord};

use super::{PersistenceError, StrategyStore};

pub struct SledStrategyStore {
    db: Db,
    strategies: Tree,
    index: Tree,
    scenarios: Tree,
}

impl SledStrategyStore {
    /// Open or create the store at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let path = path.as_ref();
        let db = sled::open(path)?;
        let store = Self {
            strategies: db.open_tree("strategies")?,
            index: db.open_tree("strategy_index")?,
            scenarios: db.open_tree("scenarios")?,
            db,
        };
        info!(path = %path.display(), strategies = store.strategies.len(), "Strategy store opened");
        Ok(store)
    }

    fn next_seq(&self) -> Result<[u8; 8], PersistenceError> {
        Ok(self.db.generate_id()?.to_be_bytes())
    }

    /// Flush after a committed write. The write already succeeded, so a
    /// failure here is logged rather than reported as a lost record.
    fn flush_committed(&self, strategy_id: &StrategyId) {
        if let Err(e) = self.db.flush() {
            warn!(strategy_id = %strategy_id, error = %e, "Strategy store flush failed");
        }
    }
}

impl StrategyStore for SledStrategyStore {
    fn append_strategy(&self, record: &StrategyRecord) -> Result<(), PersistenceError> {
        let value = serde_json::to_vec(record)?;
        let seq = self.next_seq()?;
        let id_key = &record.strategy_id.as_uuid().as_bytes()[..];

        // Index claim and record land together or not at all
        (&self.index, &self.strategies)
            .transaction(|(index, strategies)| {
                if index.get(id_key)?.is_some() {
                    return abort(PersistenceError::Duplicate {
                        strategy_id: record.strategy_id.to_string(),
                    });
                }
                index.insert(id_key, &seq[..])?;
                strategies.insert(&seq[..], value.as_slice())?;
                Ok(())
            })
            .map_err(|e| match e {
                TransactionError::Abort(err) => err,
                TransactionError::Storage(err) => PersistenceError::from(err),
            })?;
        self.flush_committed(&record.strategy_id);

        debug!(strategy_id = %record.strategy_id, "Stored strategy record");
        Ok(())
    }

    fn get_strategy(&self, id: &StrategyId) -> Result<Option<StrategyRecord>, PersistenceError> {
        let Some(seq) = self.index.get(id.as_uuid().as_bytes())? else {
            return Ok(None);
        };
        match self.strategies.get(seq)? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    fn all_strategies(&self) -> Result<Vec<StrategyRecord>, PersistenceError> {
        let mut records = Vec::with_capacity(self.strategies.len());
        for item in self.strategies.iter() {
            let (_key, value) = item?;
            records.push(serde_json::from_slice(&value)?);
        }
        Ok(records)
    }

    fn append_scenario(&self, record: &ScenarioRecord) -> Result<(), PersistenceError> {
        let value = serde_json::to_vec(record)?;
        let mut key = record.strategy_id.as_uuid().as_bytes().to_vec();
        key.extend_from_slice(&self.next_seq()?);
        self.scenarios.insert(key, value)?;
        self.flush_committed(&record.strategy_id);
        Ok(())
    }

    fn scenarios_for(&self, id: &StrategyId) -> Result<Vec<ScenarioRecord>, PersistenceError> {
        let mut records = Vec::new();
        for item in self.scenarios.scan_prefix(id.as_uuid().as_bytes()) {
            let (_key, value) = item?;
            records.push(serde_json::from_slice(&value)?);
        }
        Ok(records)
    }

    fn backend_name(&self) -> &'static str {
        "Sled"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::persistence::test_support::record;

    #[test]
    fn records_survive_reopen_in_append_order() {
        let dir = tempfile::tempdir().unwrap();
        let a = record("f1", "corn", 1);
        let b = record("f1", "corn", 2);
        {
            let store = SledStrategyStore::open(dir.path()).unwrap();
            store.append_strategy(&a).unwrap();
            store.append_strategy(&b).unwrap();
        }

        let store = SledStrategyStore::open(dir.path()).unwrap();
        assert_eq!(store.backend_name(), "Sled");
        let all = store.all_strategies().unwrap();
        assert_eq!(all, vec![a.clone(), b.clone()]);
        assert_eq!(store.get_strategy(&a.strategy_id).unwrap(), Some(a));
        assert_eq!(store.latest_strategies().unwrap(), vec![b]);
    }

    #[test]
    fn duplicate_id_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledStrategyStore::open(dir.path()).unwrap();
        let r = record("f1", "corn", 1);
        store.append_strategy(&r).unwrap();
        assert!(matches!(
            store.append_strategy(&r),
            Err(PersistenceError::Duplicate { .. })
        ));
        assert_eq!(store.all_strategies().unwrap().len(), 1);
    }

    #[test]
    fn concurrent_appends_of_one_id_store_it_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledStrategyStore::open(dir.path()).unwrap();
        let r = record("f1", "corn", 1);

        let outcomes: Vec<_> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8).map(|_| s.spawn(|| store.append_strategy(&r))).collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(outcomes.iter().filter(|o| o.is_ok()).count(), 1);
        assert!(outcomes
            .iter()
            .filter_map(|o| o.as_ref().err())
            .all(|e| matches!(e, PersistenceError::Duplicate { .. })));
        assert_eq!(store.all_strategies().unwrap(), vec![r.clone()]);
        assert_eq!(store.get_strategy(&r.strategy_id).unwrap(), Some(r));
    }

    #[test]
    fn unreadable_strategy_record_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledStrategyStore::open(dir.path()).unwrap();
        store.append_strategy(&record("f1", "corn", 1)).unwrap();
        store.strategies.insert(u64::MAX.to_be_bytes(), &b"{not json"[..]).unwrap();

        assert!(matches!(
            store.all_strategies(),
            Err(PersistenceError::Serialization(_))
        ));
        assert!(store.latest_strategies().is_err());
    }

    #[test]
    fn unknown_strategy_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledStrategyStore::open(dir.path()).unwrap();
        assert_eq!(store.get_strategy(&StrategyId::new()).unwrap(), None);
        assert!(store.scenarios_for(&StrategyId::new()).unwrap().is_empty());
    }
}
