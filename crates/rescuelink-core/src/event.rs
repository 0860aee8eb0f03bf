// ── Sync events ──
//
// What subscribers receive from the registry: a topic, the records that
// changed, and (for push frames) the frame as it arrived.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::model::{Collection, Record};

/// Topic names published by the sync layer.
pub mod topics {
    pub const NEW_ALERT: &str = "new_alert";
    pub const ALERT_UPDATE: &str = "alert_update";
    pub const ALERT_RESOLVED: &str = "alert_resolved";
    pub const DEVICE_DATA: &str = "device_data";
    /// Published after a poll changed the alert set.
    pub const ALERTS_SNAPSHOT: &str = "alerts_snapshot";
    /// Published after a poll changed the device set.
    pub const DEVICES_SNAPSHOT: &str = "devices_snapshot";
    /// Subscribes to every topic.
    pub const WILDCARD: &str = "*";
}

// ── MessageKind ─────────────────────────────────────────────────────

/// The `type` of a push frame.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageKind {
    NewAlert,
    AlertUpdate,
    AlertResolved,
    DeviceData,
    /// Anything else. Forwarded to wildcard subscribers only.
    Other(String),
}

impl MessageKind {
    pub fn parse(kind: &str) -> Self {
        match kind {
            topics::NEW_ALERT => Self::NewAlert,
            topics::ALERT_UPDATE => Self::AlertUpdate,
            topics::ALERT_RESOLVED => Self::AlertResolved,
            topics::DEVICE_DATA => Self::DeviceData,
            other => Self::Other(other.to_owned()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::NewAlert => topics::NEW_ALERT,
            Self::AlertUpdate => topics::ALERT_UPDATE,
            Self::AlertResolved => topics::ALERT_RESOLVED,
            Self::DeviceData => topics::DEVICE_DATA,
            Self::Other(kind) => kind,
        }
    }

    /// Which canonical collection a frame of this kind mutates.
    pub fn collection(&self) -> Option<Collection> {
        match self {
            Self::NewAlert | Self::AlertUpdate | Self::AlertResolved => Some(Collection::Alerts),
            Self::DeviceData => Some(Collection::Devices),
            Self::Other(_) => None,
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Collection {
    /// Topic announcing records that showed up in a poll for the first time.
    pub fn arrival_topic(self) -> &'static str {
        match self {
            Self::Alerts => topics::NEW_ALERT,
            Self::Devices => topics::DEVICE_DATA,
        }
    }

    /// Topic announcing that a poll changed this collection.
    pub fn snapshot_topic(self) -> &'static str {
        match self {
            Self::Alerts => topics::ALERTS_SNAPSHOT,
            Self::Devices => topics::DEVICES_SNAPSHOT,
        }
    }
}

// ── SyncEvent ───────────────────────────────────────────────────────

/// Where a change came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Push,
    Poll,
}

/// Payload handed to registry subscribers.
#[derive(Debug, Clone, Serialize)]
pub struct SyncEvent {
    pub topic: String,
    pub collection: Option<Collection>,
    pub source: Source,
    /// Records this event is about, newest first for poll arrivals.
    pub records: Vec<Arc<Record>>,
    /// The push frame as received, `type` included.
    pub frame: Option<Value>,
}

// ── Internal signals ────────────────────────────────────────────────

/// Raised by the connection manager or the scheduler toward the facade.
#[derive(Debug, Clone)]
pub(crate) enum Signal {
    AuthRejected { origin: &'static str, message: String },
}
