// ── Domain model ──
//
// Canonical representations of what the dashboard renders. Wire-level
// quirks are absorbed in `rescuelink_api::wire` and `crate::convert`;
// nothing here knows about field-name variants.

pub mod record;
pub mod status;
pub mod viewer;

// ── Re-exports ──────────────────────────────────────────────────────

pub use record::{Collection, Record, Severity};
pub use status::{ConnectionState, SyncStatus, Visibility};
pub use viewer::{Role, Viewer};
