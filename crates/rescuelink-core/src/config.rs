// ── Runtime sync configuration ──
//
// Describes *where* the backend lives and *how* to keep in sync with it.
// Never touches disk: the CLI builds a `SyncConfig` from its profile and
// hands it in. Credentials are not part of it either; tokens come from a
// `SessionProvider` on every connect and poll.

use std::time::Duration;

use rescuelink_api::{TlsMode, TransportConfig};
use url::Url;

use crate::retry::RetryPolicy;
use crate::store::ConflictPolicy;

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(std::path::PathBuf),
    /// Skip verification (development backends with self-signed certs).
    DangerAcceptInvalid,
}

/// Default polling interval, matching the dashboard's refresh cadence.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Configuration for one backend.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// REST base (e.g., `https://host/api/v1/`).
    pub api_url: Url,
    /// WebSocket endpoint (e.g., `wss://host/ws`).
    pub push_url: Url,
    /// TLS verification strategy.
    pub tls: TlsVerification,
    /// Request timeout for snapshot fetches.
    pub timeout: Duration,
    /// Open the push channel on start.
    pub push_enabled: bool,
    /// Run the polling scheduler on start. The scheduler still starts
    /// as a fallback when the push channel fails.
    pub polling_enabled: bool,
    /// Time between snapshot fetches. Zero disables polling.
    pub poll_interval: Duration,
    /// Reconnect backoff for the push channel.
    pub retry: RetryPolicy,
    /// How a snapshot record competes with a stored one.
    pub conflict_policy: ConflictPolicy,
    /// Drop records absent from a full snapshot.
    pub prune_missing: bool,
}

impl SyncConfig {
    /// Defaults for everything except the two endpoints.
    pub fn new(api_url: Url, push_url: Url) -> Self {
        Self {
            api_url,
            push_url,
            tls: TlsVerification::default(),
            timeout: Duration::from_secs(30),
            push_enabled: true,
            polling_enabled: true,
            poll_interval: DEFAULT_POLL_INTERVAL,
            retry: RetryPolicy::default(),
            conflict_policy: ConflictPolicy::default(),
            prune_missing: false,
        }
    }

    pub(crate) fn transport(&self) -> TransportConfig {
        TransportConfig {
            tls: match &self.tls {
                TlsVerification::SystemDefaults => TlsMode::System,
                TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
                TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
            },
            timeout: self.timeout,
        }
    }
}
