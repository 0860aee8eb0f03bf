// ── Alert and device records ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Alert urgency. Ordered so `High > Medium > Low`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[strum(ascii_case_insensitive)]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    /// Lenient parse of a backend severity label.
    ///
    /// Beyond the three canonical names, a few synonyms seen from device
    /// firmware are folded in. Unknown labels yield `None` so the caller
    /// can pick a collection-specific default.
    pub fn from_wire(label: &str) -> Option<Self> {
        if let Ok(sev) = label.trim().parse() {
            return Some(sev);
        }
        match label.trim().to_ascii_lowercase().as_str() {
            "critical" | "urgent" | "sos" => Some(Self::High),
            "warning" | "warn" => Some(Self::Medium),
            "info" | "normal" => Some(Self::Low),
            _ => None,
        }
    }
}

/// The two canonical collections the sync layer maintains.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Alerts,
    Devices,
}

/// One alert or device as the dashboard sees it.
///
/// For devices, `id` and `device_id` carry the same value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub device_id: String,
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub resolved: bool,
    /// The full object as the backend sent it.
    #[serde(default)]
    pub payload: Value,
}

impl Record {
    pub fn new(
        id: impl Into<String>,
        device_id: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            device_id: device_id.into(),
            timestamp,
            severity: Severity::Medium,
            resolved: false,
            payload: Value::Null,
        }
    }

    #[must_use]
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    #[must_use]
    pub fn with_resolved(mut self, resolved: bool) -> Self {
        self.resolved = resolved;
        self
    }

    #[must_use]
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    /// Equal, or the same backend object stamped at different times.
    ///
    /// A backend timestamp lives in the payload too, so two equal
    /// non-null payloads can only differ in a locally filled timestamp.
    pub fn same_as(&self, other: &Record) -> bool {
        self == other
            || (!self.payload.is_null()
                && self.payload == other.payload
                && self.id == other.id
                && self.device_id == other.device_id
                && self.severity == other.severity
                && self.resolved == other.resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_parses_case_insensitively() {
        assert_eq!(Severity::from_wire("HIGH"), Some(Severity::High));
        assert_eq!(Severity::from_wire(" medium "), Some(Severity::Medium));
        assert_eq!(Severity::from_wire("Critical"), Some(Severity::High));
        assert_eq!(Severity::from_wire("purple"), None);
    }

    #[test]
    fn severity_orders_by_urgency() {
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
    }

    #[test]
    fn collection_round_trips_through_strings() {
        assert_eq!(Collection::Alerts.to_string(), "alerts");
        assert_eq!("Devices".parse::<Collection>().ok(), Some(Collection::Devices));
    }
}
