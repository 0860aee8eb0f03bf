// ── Canonical record store ──
//
// One `Reconciler` per collection owns the canonical set and merges both
// sync sources into it. `RecordCollection` is the storage underneath;
// it is only ever touched under the reconciler's lock.

mod collection;
mod reconciler;

pub use reconciler::{ApplyMode, ApplyOutcome, ConflictPolicy, Reconciler};
