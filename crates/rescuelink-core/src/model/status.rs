// ── Sync status ──

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Push channel lifecycle.
///
/// `Failed` is terminal until a manual reconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, strum::Display)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Connected,
    Disconnected,
    Failed,
}

impl ConnectionState {
    /// A reconnect loop is (or may soon be) trying to open the channel.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Connecting | Self::Connected)
    }
}

/// Whether the consuming view is on screen. Polling pauses while hidden.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, strum::Display)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Visible,
    Hidden,
}

/// Aggregated status for the UI banner.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct SyncStatus {
    pub connection: ConnectionState,
    /// The polling scheduler is running (not necessarily mid-fetch).
    pub is_polling: bool,
    /// When a record was last applied from either source.
    pub last_update: Option<DateTime<Utc>>,
    /// Most recent fetch or connection problem, cleared on success.
    pub last_error: Option<String>,
    /// The session was refused; the layer has stopped itself.
    pub auth_rejected: bool,
    /// Polling was started as a fallback after the push channel failed.
    pub degraded: bool,
}
