//! Append-only price snapshot cache with atomic publication.
//!
//! The whole ledger is an immutable value behind an `ArcSwap`. Publishing
//! builds a new ledger and swaps the pointer, so a reader holding the old
//! ledger keeps a complete view while new readers see the new one in full.

use arc_swap::ArcSwap;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

use super::{PriceError, PriceSnapshot};

#[derive(Debug, Clone, Default)]
struct SnapshotLedger {
    version: u64,
    latest: Option<Arc<PriceSnapshot>>,
    snapshots: BTreeMap<String, Arc<PriceSnapshot>>,
}

/// Shared price cache backing snapshot retrieval.
pub struct PriceCache {
    ledger: ArcSwap<SnapshotLedger>,
    /// Serializes writers; readers never take it
    publish_lock: Mutex<()>,
}

impl PriceCache {
    pub fn new() -> Self {
        Self {
            ledger: ArcSwap::from_pointee(SnapshotLedger::default()),
            publish_lock: Mutex::new(()),
        }
    }

    /// Build a cache pre-loaded with `snapshots`, published in order.
    pub fn with_snapshots(snapshots: impl IntoIterator<Item = PriceSnapshot>) -> Result<Self, PriceError> {
        let cache = Self::new();
        for s in snapshots {
            cache.publish(s)?;
        }
        Ok(cache)
    }

    /// Publish a new snapshot and make it the latest.
    ///
    /// Returns the ledger version after publication. Ids are never reused.
    pub fn publish(&self, snapshot: PriceSnapshot) -> Result<u64, PriceError> {
        snapshot.validate()?;

        let _guard = self.publish_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self.ledger.load_full();
        if current.snapshots.contains_key(&snapshot.snapshot_id) {
            return Err(PriceError::DuplicateSnapshot {
                snapshot_id: snapshot.snapshot_id,
            });
        }

        let snapshot = Arc::new(snapshot);
        let mut next = (*current).clone();
        next.version += 1;
        next.snapshots
            .insert(snapshot.snapshot_id.clone(), Arc::clone(&snapshot));
        next.latest = Some(Arc::clone(&snapshot));
        let version = next.version;
        self.ledger.store(Arc::new(next));

        info!(
            snapshot_id = %snapshot.snapshot_id,
            version,
            fertilizers = snapshot.fertilizers.len(),
            commodities = snapshot.commodities.len(),
            "Price snapshot published"
        );
        Ok(version)
    }

    /// Snapshot by id.
    pub fn get(&self, snapshot_id: &str) -> Result<Arc<PriceSnapshot>, PriceError> {
        let found = self.ledger.load().snapshots.get(snapshot_id).cloned();
        found.ok_or_else(|| {
            debug!(snapshot_id, "Snapshot lookup miss");
            PriceError::SnapshotNotFound {
                snapshot_id: snapshot_id.to_string(),
            }
        })
    }

    /// Most recently published snapshot.
    pub fn latest(&self) -> Option<Arc<PriceSnapshot>> {
        self.ledger.load().latest.clone()
    }

    /// Number of publications so far.
    pub fn version(&self) -> u64 {
        self.ledger.load().version
    }

    pub fn len(&self) -> usize {
        self.ledger.load().snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot_ids(&self) -> Vec<String> {
        self.ledger.load().snapshots.keys().cloned().collect()
    }
}

impl Default for PriceCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Nutrient;
    use chrono::Utc;

    fn snapshot(id: &str, corn: f64) -> PriceSnapshot {
        PriceSnapshot::new(id, Utc::now(), "USD")
            .with_fertilizer("n", Nutrient::Nitrogen, 1.0, 1.0)
            .with_commodity("corn", corn)
    }

    #[test]
    fn publish_then_get() {
        let cache = PriceCache::new();
        assert!(cache.is_empty());
        assert_eq!(cache.publish(snapshot("s1", 5.0)).unwrap(), 1);
        assert_eq!(cache.publish(snapshot("s2", 6.0)).unwrap(), 2);

        assert_eq!(cache.get("s1").unwrap().commodity_price("corn").unwrap(), 5.0);
        assert_eq!(cache.latest().unwrap().snapshot_id, "s2");
        assert_eq!(cache.version(), 2);
        assert_eq!(cache.snapshot_ids(), vec!["s1".to_string(), "s2".to_string()]);
    }

    #[test]
    fn unknown_snapshot_is_an_error() {
        let cache = PriceCache::new();
        assert_eq!(
            cache.get("nope").unwrap_err(),
            PriceError::SnapshotNotFound {
                snapshot_id: "nope".into()
            }
        );
    }

    #[test]
    fn snapshots_are_append_only() {
        let cache = PriceCache::with_snapshots([snapshot("s1", 5.0)]).unwrap();
        let err = cache.publish(snapshot("s1", 9.0)).unwrap_err();
        assert!(matches!(err, PriceError::DuplicateSnapshot { .. }));
        // Original value untouched and version not bumped
        assert_eq!(cache.get("s1").unwrap().commodity_price("corn").unwrap(), 5.0);
        assert_eq!(cache.version(), 1);
    }

    #[test]
    fn invalid_snapshot_is_not_published() {
        let cache = PriceCache::new();
        let bad = PriceSnapshot::new("bad", Utc::now(), "USD").with_commodity("corn", 0.0);
        assert!(cache.publish(bad).is_err());
        assert!(cache.is_empty());
        assert!(cache.latest().is_none());
    }

    #[test]
    fn held_snapshot_survives_later_publications() {
        let cache = PriceCache::with_snapshots([snapshot("s1", 5.0)]).unwrap();
        let held = cache.latest().unwrap();
        cache.publish(snapshot("s2", 7.0)).unwrap();
        assert_eq!(held.snapshot_id, "s1");
        assert_eq!(held.commodity_price("corn").unwrap(), 5.0);
    }

    #[test]
    fn concurrent_readers_see_whole_snapshots() {
        let cache = Arc::new(PriceCache::with_snapshots([snapshot("s0", 1.0)]).unwrap());
        std::thread::scope(|scope| {
            let writer = Arc::clone(&cache);
            scope.spawn(move || {
                for i in 1..200 {
                    writer.publish(snapshot(&format!("s{i}"), f64::from(i) + 1.0)).unwrap();
                }
            });
            for _ in 0..4 {
                let reader = Arc::clone(&cache);
                scope.spawn(move || {
                    for _ in 0..500 {
                        let s = reader.latest().unwrap();
                        let idx: f64 = s.snapshot_id[1..].parse().unwrap();
                        // Price always matches the id it was published under
                        assert_eq!(s.commodity_price("corn").unwrap(), idx + 1.0);
                    }
                });
            }
        });
        assert_eq!(cache.version(), 200);
    }
}
