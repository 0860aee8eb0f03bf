// ── Insertion-ordered record collection ──
//
// Keyed by record id, with push-based change notification via `watch`
// channels. Mutations only touch the map; `commit()` rebuilds the sorted
// snapshot once per apply so a batch is published as a single swap.

use std::sync::Arc;

use indexmap::IndexMap;
use tokio::sync::watch;

use crate::model::Record;

pub(crate) struct RecordCollection {
    /// Primary storage in first-seen order. Ties in the sorted snapshot
    /// fall back to this order.
    by_id: IndexMap<String, Arc<Record>>,

    /// Version counter, bumped on every commit that changed something.
    version: watch::Sender<u64>,

    /// Materialized view: newest `timestamp` first, no duplicate ids.
    snapshot: watch::Sender<Arc<Vec<Arc<Record>>>>,
}

impl RecordCollection {
    pub(crate) fn new() -> Self {
        let (version, _) = watch::channel(0u64);
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));

        Self {
            by_id: IndexMap::new(),
            version,
            snapshot,
        }
    }

    /// Insert or replace a record. Returns the record it displaced.
    pub(crate) fn upsert(&mut self, record: Arc<Record>) -> Option<Arc<Record>> {
        // `insert` keeps the original slot for an existing key.
        self.by_id.insert(record.id.clone(), record)
    }

    /// Remove a record, preserving the order of the rest.
    pub(crate) fn remove(&mut self, id: &str) -> Option<Arc<Record>> {
        self.by_id.shift_remove(id)
    }

    pub(crate) fn get(&self, id: &str) -> Option<&Arc<Record>> {
        self.by_id.get(id)
    }

    pub(crate) fn ids(&self) -> Vec<String> {
        self.by_id.keys().cloned().collect()
    }

    pub(crate) fn clear(&mut self) {
        self.by_id.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Get the current snapshot (cheap `Arc` clone).
    pub(crate) fn snapshot(&self) -> Arc<Vec<Arc<Record>>> {
        self.snapshot.borrow().clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<Arc<Vec<Arc<Record>>>> {
        self.snapshot.subscribe()
    }

    pub(crate) fn version(&self) -> u64 {
        *self.version.borrow()
    }

    /// Rebuild the sorted snapshot and broadcast it.
    pub(crate) fn commit(&self) {
        let mut values: Vec<Arc<Record>> = self.by_id.values().cloned().collect();
        // Stable: equal timestamps keep insertion order.
        values.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        // `send_modify` updates unconditionally, even with zero receivers.
        self.snapshot.send_modify(|snap| *snap = Arc::new(values));
        self.version.send_modify(|v| *v += 1);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    use super::*;

    fn rec(id: &str, secs: i64) -> Arc<Record> {
        Arc::new(Record::new(id, "D1", Utc.timestamp_opt(secs, 0).unwrap()))
    }

    fn ids(snapshot: &[Arc<Record>]) -> Vec<&str> {
        snapshot.iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn commit_sorts_newest_first_with_stable_ties() {
        let mut col = RecordCollection::new();
        col.upsert(rec("old", 100));
        col.upsert(rec("tie-a", 200));
        col.upsert(rec("tie-b", 200));
        col.upsert(rec("new", 300));
        col.commit();

        assert_eq!(ids(&col.snapshot()), ["new", "tie-a", "tie-b", "old"]);
    }

    #[test]
    fn upsert_replaces_in_place() {
        let mut col = RecordCollection::new();
        assert!(col.upsert(rec("a", 1)).is_none());
        col.upsert(rec("b", 1));
        let prev = col.upsert(rec("a", 1)).unwrap();
        assert_eq!(prev.id, "a");
        assert_eq!(col.ids(), ["a", "b"]);
        assert_eq!(col.len(), 2);
    }

    #[test]
    fn snapshot_is_only_published_on_commit() {
        let mut col = RecordCollection::new();
        let rx = col.subscribe();
        col.upsert(rec("a", 1));
        assert!(rx.borrow().is_empty());
        assert_eq!(col.version(), 0);

        col.commit();
        assert_eq!(rx.borrow().len(), 1);
        assert_eq!(col.version(), 1);
    }

    #[test]
    fn remove_keeps_relative_order() {
        let mut col = RecordCollection::new();
        for id in ["a", "b", "c"] {
            col.upsert(rec(id, 5));
        }
        col.remove("b");
        col.commit();
        assert_eq!(ids(&col.snapshot()), ["a", "c"]);

        col.clear();
        col.commit();
        assert!(col.snapshot().is_empty());
    }
}
