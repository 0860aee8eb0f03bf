// ── Reconciler: merges push and poll into one canonical set ──
//
// Both sources call `apply`. The merge, the optional prune and the
// snapshot rebuild happen under one lock with no await inside, so
// readers see either the old set or the new one. Subscribers are
// notified after the lock is released.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::collection::RecordCollection;
use crate::event::{MessageKind, Source, SyncEvent};
use crate::model::{Collection, Record, Viewer};
use crate::registry::SubscriptionRegistry;
use crate::stream::RecordStream;

// ── ConflictPolicy ──────────────────────────────────────────────────

/// How an incoming record competes with the stored one of the same id.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Every incoming record wins.
    LastApplied,
    /// Records strictly older than the stored one are discarded.
    NewestTimestamp,
    /// Last applied wins, but a resolved record is only un-resolved by a
    /// strictly newer one.
    #[default]
    KeepResolved,
}

impl ConflictPolicy {
    pub fn accepts(self, stored: &Record, incoming: &Record) -> bool {
        match self {
            Self::LastApplied => true,
            Self::NewestTimestamp => incoming.timestamp >= stored.timestamp,
            Self::KeepResolved => {
                !(stored.resolved && !incoming.resolved && incoming.timestamp <= stored.timestamp)
            }
        }
    }
}

// ── Apply inputs and outputs ────────────────────────────────────────

/// How a batch reached the reconciler.
#[derive(Debug, Clone)]
pub enum ApplyMode {
    /// One push frame. Its records are always announced under `kind`.
    Partial {
        kind: MessageKind,
        frame: Option<Value>,
    },
    /// A full poll result. `initial` marks the first fetch after start.
    /// It only takes effect while this collection has no snapshot of its
    /// own yet; its records then form the baseline and none is announced.
    Snapshot { initial: bool },
}

/// What one `apply` did to the canonical set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplyOutcome {
    pub inserted: usize,
    pub replaced: usize,
    pub unchanged: usize,
    /// Discarded by the conflict policy.
    pub rejected: usize,
    /// Pruned because a snapshot no longer listed them.
    pub removed: usize,
    /// Records announced to subscribers, newest first for snapshots.
    pub arrived: Vec<Arc<Record>>,
}

impl ApplyOutcome {
    pub fn changed(&self) -> bool {
        self.inserted + self.replaced + self.removed > 0
    }
}

enum Merge {
    Insert,
    Replace,
    Same,
    Reject,
}

// ── Reconciler ──────────────────────────────────────────────────────

struct ReconcileState {
    records: RecordCollection,
    /// Ids of the last snapshot, for new-record detection.
    last_snapshot_ids: Option<HashSet<String>>,
    /// When the push feed first went live this session. Without an
    /// earlier snapshot, records older than this predate the session.
    live_since: Option<DateTime<Utc>>,
}

pub struct Reconciler {
    collection: Collection,
    policy: ConflictPolicy,
    prune_missing: bool,
    state: Mutex<ReconcileState>,
    registry: SubscriptionRegistry<SyncEvent>,
}

impl Reconciler {
    pub fn new(
        collection: Collection,
        policy: ConflictPolicy,
        prune_missing: bool,
        registry: SubscriptionRegistry<SyncEvent>,
    ) -> Self {
        Self {
            collection,
            policy,
            prune_missing,
            state: Mutex::new(ReconcileState {
                records: RecordCollection::new(),
                last_snapshot_ids: None,
                live_since: None,
            }),
            registry,
        }
    }

    pub fn collection(&self) -> Collection {
        self.collection
    }

    fn lock(&self) -> MutexGuard<'_, ReconcileState> {
        // No callback runs under this lock; a poisoned guard still holds a
        // consistent set because every mutation is committed or not at all.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Merge `records` into the canonical set.
    pub fn apply(&self, records: Vec<Record>, mode: ApplyMode) -> ApplyOutcome {
        let snapshot_mode = matches!(mode, ApplyMode::Snapshot { .. });
        let initial = matches!(mode, ApplyMode::Snapshot { initial: true });
        let mut outcome = ApplyOutcome::default();

        let materialized = {
            let mut state = self.lock();
            let incoming_ids: HashSet<String> = if snapshot_mode {
                records.iter().map(|r| r.id.clone()).collect()
            } else {
                HashSet::new()
            };

            for record in records {
                let record = Arc::new(record);
                let merge = match state.records.get(&record.id) {
                    None => Merge::Insert,
                    Some(stored) if stored.same_as(&record) => Merge::Same,
                    Some(stored) if self.policy.accepts(stored, &record) => Merge::Replace,
                    Some(_) => Merge::Reject,
                };

                match merge {
                    Merge::Insert => {
                        outcome.inserted += 1;
                        let announce = !snapshot_mode
                            || (!record.resolved
                                && match &state.last_snapshot_ids {
                                    Some(ids) => !ids.contains(&record.id),
                                    None if initial => false,
                                    None => state
                                        .live_since
                                        .is_none_or(|since| record.timestamp >= since),
                                });
                        if announce {
                            outcome.arrived.push(Arc::clone(&record));
                        }
                        state.records.upsert(record);
                    }
                    Merge::Replace => {
                        outcome.replaced += 1;
                        if !snapshot_mode {
                            outcome.arrived.push(Arc::clone(&record));
                        }
                        state.records.upsert(record);
                    }
                    Merge::Same => {
                        outcome.unchanged += 1;
                        if !snapshot_mode {
                            outcome.arrived.push(record);
                        }
                    }
                    Merge::Reject => {
                        outcome.rejected += 1;
                        debug!(
                            collection = %self.collection,
                            id = %record.id,
                            policy = %self.policy,
                            "stale record discarded"
                        );
                    }
                }
            }

            if snapshot_mode {
                if self.prune_missing {
                    for id in state.records.ids() {
                        if !incoming_ids.contains(&id) {
                            state.records.remove(&id);
                            outcome.removed += 1;
                        }
                    }
                }
                state.last_snapshot_ids = Some(incoming_ids);
            }

            if outcome.changed() {
                state.records.commit();
            }
            state.records.snapshot()
        };

        if snapshot_mode {
            outcome
                .arrived
                .sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        }

        debug!(
            collection = %self.collection,
            inserted = outcome.inserted,
            replaced = outcome.replaced,
            unchanged = outcome.unchanged,
            rejected = outcome.rejected,
            removed = outcome.removed,
            "apply"
        );

        self.announce(mode, &outcome, &materialized);
        outcome
    }

    fn announce(&self, mode: ApplyMode, outcome: &ApplyOutcome, materialized: &[Arc<Record>]) {
        match mode {
            ApplyMode::Partial { kind, frame } => {
                if outcome.arrived.is_empty() {
                    return;
                }
                let event = SyncEvent {
                    topic: kind.as_str().to_owned(),
                    collection: Some(self.collection),
                    source: Source::Push,
                    records: outcome.arrived.clone(),
                    frame,
                };
                self.registry.publish(&event.topic, &event);
            }
            ApplyMode::Snapshot { .. } => {
                if outcome.changed() {
                    let topic = self.collection.snapshot_topic();
                    self.registry.publish(
                        topic,
                        &SyncEvent {
                            topic: topic.to_owned(),
                            collection: Some(self.collection),
                            source: Source::Poll,
                            records: materialized.to_vec(),
                            frame: None,
                        },
                    );
                }
                if !outcome.arrived.is_empty() {
                    let topic = self.collection.arrival_topic();
                    self.registry.publish(
                        topic,
                        &SyncEvent {
                            topic: topic.to_owned(),
                            collection: Some(self.collection),
                            source: Source::Poll,
                            records: outcome.arrived.clone(),
                            frame: None,
                        },
                    );
                }
            }
        }
    }

    /// Mark a stored record resolved. Unknown ids are ignored.
    ///
    /// The timestamp is kept so the record does not move in the sorted
    /// list; `at` is recorded in the payload as `resolved_at`. Returns
    /// `true` when the record was known.
    pub fn resolve(
        &self,
        id: &str,
        at: Option<DateTime<Utc>>,
        kind: MessageKind,
        frame: Option<Value>,
    ) -> bool {
        let resolved = {
            let mut state = self.lock();
            let Some(stored) = state.records.get(id) else {
                debug!(collection = %self.collection, id, "resolve for unknown record ignored");
                return false;
            };

            let mut next = (**stored).clone();
            let changed = !next.resolved;
            next.resolved = true;
            if let Some(at) = at {
                if !next.payload.is_object() {
                    next.payload = Value::Object(serde_json::Map::new());
                }
                if let Value::Object(map) = &mut next.payload {
                    map.insert("resolved_at".into(), Value::String(at.to_rfc3339()));
                }
            }

            let next = Arc::new(next);
            if changed || **stored != *next {
                state.records.upsert(Arc::clone(&next));
                state.records.commit();
            }
            next
        };

        let event = SyncEvent {
            topic: kind.as_str().to_owned(),
            collection: Some(self.collection),
            source: Source::Push,
            records: vec![resolved],
            frame,
        };
        self.registry.publish(&event.topic, &event);
        true
    }

    /// Drop every record and forget the last snapshot.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.records.clear();
        state.last_snapshot_ids = None;
        state.live_since = None;
        state.records.commit();
    }

    /// Record that the push feed is live. Only the first call until the
    /// next `clear` counts.
    pub fn mark_live(&self, at: DateTime<Utc>) {
        let mut state = self.lock();
        if state.live_since.is_none() {
            state.live_since = Some(at);
        }
    }

    // ── Reads ────────────────────────────────────────────────────────

    /// Sorted snapshot, newest first.
    pub fn snapshot(&self) -> Arc<Vec<Arc<Record>>> {
        self.lock().records.snapshot()
    }

    /// Snapshot filtered to what `viewer` may see.
    pub fn visible_to(&self, viewer: &Viewer) -> Vec<Arc<Record>> {
        self.snapshot()
            .iter()
            .filter(|r| viewer.can_see(r))
            .cloned()
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<Arc<Record>> {
        self.lock().records.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bumped on every apply that changed the set.
    pub fn version(&self) -> u64 {
        self.lock().records.version()
    }

    pub fn stream(&self) -> RecordStream {
        RecordStream::new(self.lock().records.subscribe())
    }
}

// ── Tests ────────────────────────────────────────────────────────────
