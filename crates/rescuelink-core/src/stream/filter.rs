// ── Filter predicates for record streams ──
//
// Used by consumers to narrow snapshots without touching the reconciler.

use crate::model::{Record, Severity, Viewer};

/// Filter predicate for alert and device collections.
pub enum RecordFilter {
    All,
    /// What a given viewer is allowed to see.
    VisibleTo(Viewer),
    Unresolved,
    AtLeast(Severity),
    Device(String),
    Custom(Box<dyn Fn(&Record) -> bool + Send + Sync>),
}

impl RecordFilter {
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Self::All => true,
            Self::VisibleTo(viewer) => viewer.can_see(record),
            Self::Unresolved => !record.resolved,
            Self::AtLeast(min) => record.severity >= *min,
            Self::Device(id) => record.device_id == *id,
            Self::Custom(f) => f(record),
        }
    }
}
