// rescuelink-core: Real-time sync layer between rescuelink-api and consumers (CLI/UI).

pub mod config;
pub mod connection;
pub mod convert;
pub mod error;
pub mod event;
pub mod facade;
pub mod model;
pub mod polling;
pub mod registry;
pub mod retry;
pub mod store;
pub mod stream;
pub mod transport;

mod router;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{SyncConfig, TlsVerification};
pub use connection::ConnectionManager;
pub use error::CoreError;
pub use event::{MessageKind, Source, SyncEvent, topics};
pub use facade::{SessionProvider, StaticSession, SyncFacade};
pub use polling::{PollState, PollingScheduler};
pub use registry::{Subscription, SubscriptionRegistry, Topic};
pub use retry::{Retry, RetryPolicy};
pub use store::{ApplyMode, ApplyOutcome, ConflictPolicy, Reconciler};
pub use stream::{RecordFilter, RecordStream};
pub use transport::{PushChannel, PushConnector, SnapshotSource};

// Re-export model types at the crate root for ergonomics.
pub use model::{
    Collection, ConnectionState, Record, Role, Severity, SyncStatus, Viewer, Visibility,
};
