// ── Wire types and field-name normalization ──
//
// The backend is inconsistent about field names (`alert_id` vs `id`,
// `resolved_status` vs `isResolved` vs `status: "resolved"`, ...).
// Every variant is absorbed here so the core only ever sees one name
// per concept.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::Error;

// ── RawRecord ────────────────────────────────────────────────────────

/// One alert or device object as the backend sent it.
///
/// Every field is kept as a loose `Value` so that a string where a bool
/// was expected does not fail the whole object; the typed accessors
/// below do the interpretation. The untouched object is kept in `raw`.
#[derive(Debug, Clone, Default, Deserialize)]
#[allow(clippy::struct_field_names)]
pub struct RawRecord {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    alert_id: Option<Value>,
    #[serde(default, rename = "alertId")]
    alert_id_camel: Option<Value>,

    #[serde(default)]
    device_id: Option<Value>,
    #[serde(default, rename = "deviceId")]
    device_id_camel: Option<Value>,

    #[serde(default)]
    severity: Option<Value>,
    #[serde(default)]
    timestamp: Option<Value>,
    #[serde(default)]
    last_seen: Option<Value>,
    #[serde(default, rename = "lastSeen")]
    last_seen_camel: Option<Value>,

    #[serde(default)]
    resolved: Option<Value>,
    #[serde(default)]
    resolved_status: Option<Value>,
    #[serde(default)]
    is_resolved: Option<Value>,
    #[serde(default, rename = "isResolved")]
    is_resolved_camel: Option<Value>,
    #[serde(default)]
    status: Option<Value>,

    #[serde(default)]
    resolved_at: Option<Value>,
    #[serde(default, rename = "resolvedAt")]
    resolved_at_camel: Option<Value>,

    #[serde(skip)]
    raw: Value,
}

impl RawRecord {
    /// Interpret a JSON object as a record. Non-objects are rejected.
    pub fn from_value(value: Value) -> Result<Self, Error> {
        if !value.is_object() {
            return Err(Error::Deserialization {
                message: "record is not a JSON object".into(),
                body: value.to_string(),
            });
        }
        let mut record: Self =
            serde_json::from_value(value.clone()).map_err(|e| Error::Deserialization {
                message: e.to_string(),
                body: value.to_string(),
            })?;
        record.raw = value;
        Ok(record)
    }

    /// Identity of an alert: `alert_id`, then `alertId`, then `id`.
    pub fn alert_key(&self) -> Option<String> {
        first_id([&self.alert_id, &self.alert_id_camel, &self.id])
    }

    /// Identity of a device record: `device_id`, then `deviceId`, then `id`.
    pub fn device_key(&self) -> Option<String> {
        first_id([&self.device_id, &self.device_id_camel, &self.id])
    }

    /// The device an alert was raised by.
    pub fn device_ref(&self) -> Option<String> {
        first_id([&self.device_id, &self.device_id_camel, &None])
    }

    pub fn severity(&self) -> Option<&str> {
        self.severity.as_ref().and_then(Value::as_str)
    }

    /// `timestamp`, falling back to a device's `last_seen`/`lastSeen`.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        [&self.timestamp, &self.last_seen, &self.last_seen_camel]
            .into_iter()
            .find_map(|v| v.as_ref().and_then(parse_instant))
    }

    pub fn resolved_at(&self) -> Option<DateTime<Utc>> {
        self.resolved_at
            .as_ref()
            .or(self.resolved_at_camel.as_ref())
            .and_then(parse_instant)
    }

    /// Collapse every "is this resolved" spelling into one answer.
    ///
    /// Explicit boolean-ish fields win over the `status` string.
    /// `None` means the object said nothing about resolution.
    pub fn resolved(&self) -> Option<bool> {
        let explicit = [
            &self.resolved_status,
            &self.resolved,
            &self.is_resolved,
            &self.is_resolved_camel,
        ]
        .into_iter()
        .find_map(|v| v.as_ref().and_then(loose_bool));

        explicit.or_else(|| {
            self.status
                .as_ref()
                .and_then(Value::as_str)
                .filter(|s| s.eq_ignore_ascii_case("resolved"))
                .map(|_| true)
        })
    }

    /// The original JSON object, untouched.
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn into_raw(self) -> Value {
        self.raw
    }
}

fn first_id<const N: usize>(candidates: [&Option<Value>; N]) -> Option<String> {
    candidates.into_iter().find_map(|v| match v.as_ref()? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_owned()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn loose_bool(v: &Value) -> Option<bool> {
    match v {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|i| i != 0),
        Value::String(s) => match s.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "resolved" => Some(true),
            "false" | "0" | "no" | "active" | "open" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Accepts RFC 3339, naive ISO-8601 (read as UTC), or epoch seconds/millis.
fn parse_instant(v: &Value) -> Option<DateTime<Utc>> {
    match v {
        Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
                .into_iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .map(|naive| naive.and_utc())
        }
        Value::Number(n) => {
            let raw = n.as_i64()?;
            // Anything past the year 5000 in seconds is really milliseconds.
            if raw.abs() > 100_000_000_000 {
                DateTime::from_timestamp_millis(raw)
            } else {
                DateTime::from_timestamp(raw, 0)
            }
        }
        _ => None,
    }
}

// ── List responses ───────────────────────────────────────────────────

/// `GET /alerts` and `GET /devices` return either a bare array or an
/// envelope with the array under `data`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum ListResponse {
    Bare(Vec<Value>),
    Envelope { data: Vec<Value> },
}

impl ListResponse {
    pub(crate) fn into_items(self) -> Vec<Value> {
        match self {
            Self::Bare(items) | Self::Envelope { data: items } => items,
        }
    }
}

/// Parse every item independently; one malformed object never sinks the list.
pub(crate) fn parse_items(items: Vec<Value>) -> Vec<RawRecord> {
    items
        .into_iter()
        .filter_map(|item| match RawRecord::from_value(item) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!(error = %e, "dropping malformed record");
                None
            }
        })
        .collect()
}

// ── InboundFrame ─────────────────────────────────────────────────────

/// A push-channel frame: `{ "type": <string>, ...payload }`.
#[derive(Debug, Clone)]
pub struct InboundFrame {
    pub kind: String,
    pub payload: Map<String, Value>,
}

impl InboundFrame {
    /// Parse a text frame. Anything that is not a JSON object with a
    /// string `type` is a deserialization error.
    pub fn parse(text: &str) -> Result<Self, Error> {
        let value: Value = serde_json::from_str(text).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body: text.to_owned(),
        })?;

        let Value::Object(mut payload) = value else {
            return Err(Error::Deserialization {
                message: "frame is not a JSON object".into(),
                body: text.to_owned(),
            });
        };

        let kind = match payload.remove("type") {
            Some(Value::String(kind)) if !kind.is_empty() => kind,
            _ => {
                return Err(Error::Deserialization {
                    message: "frame has no string `type` field".into(),
                    body: text.to_owned(),
                });
            }
        };

        Ok(Self { kind, payload })
    }

    /// Records carried by the frame.
    ///
    /// A batch arrives under `data` (array or single object); otherwise
    /// the payload itself is the record.
    pub fn records(&self) -> Vec<RawRecord> {
        match self.payload.get("data") {
            Some(Value::Array(items)) => parse_items(items.clone()),
            Some(obj @ Value::Object(_)) => parse_items(vec![obj.clone()]),
            _ => parse_items(vec![Value::Object(self.payload.clone())]),
        }
    }

    /// The frame as it arrived, `type` included.
    pub fn to_value(&self) -> Value {
        let mut obj = self.payload.clone();
        obj.insert("type".into(), Value::String(self.kind.clone()));
        Value::Object(obj)
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn alert_key_prefers_alert_id() {
        let raw = RawRecord::from_value(json!({ "id": 7, "alert_id": "A-7" })).unwrap();
        assert_eq!(raw.alert_key().as_deref(), Some("A-7"));

        let raw = RawRecord::from_value(json!({ "id": 7 })).unwrap();
        assert_eq!(raw.alert_key().as_deref(), Some("7"));

        let raw = RawRecord::from_value(json!({ "alertId": "A-9" })).unwrap();
        assert_eq!(raw.alert_key().as_deref(), Some("A-9"));
    }

    #[test]
    fn blank_ids_are_ignored() {
        let raw = RawRecord::from_value(json!({ "alert_id": "  ", "id": "A1" })).unwrap();
        assert_eq!(raw.alert_key().as_deref(), Some("A1"));

        let raw = RawRecord::from_value(json!({ "message": "no id" })).unwrap();
        assert!(raw.alert_key().is_none());
    }

    #[test]
    fn resolved_variants_collapse() {
        let cases = [
            (json!({ "resolved_status": true }), Some(true)),
            (json!({ "isResolved": true }), Some(true)),
            (json!({ "is_resolved": "false" }), Some(false)),
            (json!({ "resolved": 1 }), Some(true)),
            (json!({ "status": "Resolved" }), Some(true)),
            (json!({ "status": "Active" }), None),
            (json!({}), None),
        ];
        for (value, expected) in cases {
            let raw = RawRecord::from_value(value.clone()).unwrap();
            assert_eq!(raw.resolved(), expected, "for {value}");
        }
    }

    #[test]
    fn explicit_flag_beats_status_string() {
        let raw =
            RawRecord::from_value(json!({ "resolved_status": false, "status": "resolved" }))
                .unwrap();
        assert_eq!(raw.resolved(), Some(false));
    }

    #[test]
    fn timestamps_in_several_shapes() {
        let expected = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        for ts in [
            json!("2025-03-01T12:00:00Z"),
            json!("2025-03-01T14:00:00+02:00"),
            json!("2025-03-01T12:00:00"),
            json!("2025-03-01 12:00:00.000"),
            json!(1_740_830_400),
            json!(1_740_830_400_000_i64),
        ] {
            let raw = RawRecord::from_value(json!({ "timestamp": ts.clone() })).unwrap();
            assert_eq!(raw.timestamp(), Some(expected), "for {ts}");
        }

        let raw = RawRecord::from_value(json!({ "timestamp": "yesterday" })).unwrap();
        assert!(raw.timestamp().is_none());
    }

    #[test]
    fn devices_fall_back_to_last_seen() {
        let expected = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let raw =
            RawRecord::from_value(json!({ "device_id": "D1", "lastSeen": "2025-03-01T12:00:00Z" }))
                .unwrap();
        assert_eq!(raw.timestamp(), Some(expected));

        let raw = RawRecord::from_value(json!({
            "timestamp": "2025-03-01T12:00:00Z",
            "last_seen": "2024-01-01T00:00:00Z"
        }))
        .unwrap();
        assert_eq!(raw.timestamp(), Some(expected));
    }

    #[test]
    fn wrong_types_do_not_fail_the_object() {
        let raw = RawRecord::from_value(json!({
            "alert_id": "A1",
            "severity": 3,
            "resolved_status": "maybe"
        }))
        .unwrap();
        assert_eq!(raw.alert_key().as_deref(), Some("A1"));
        assert!(raw.severity().is_none());
        assert!(raw.resolved().is_none());
    }

    #[test]
    fn non_object_records_are_rejected() {
        assert!(RawRecord::from_value(json!("A1")).is_err());
        let parsed = parse_items(vec![json!(1), json!({ "id": "ok" })]);
        assert_eq!(parsed.len(), 1);
    }

    #[test]
    fn list_response_accepts_both_shapes() {
        let bare: ListResponse = serde_json::from_value(json!([{ "id": 1 }])).unwrap();
        assert_eq!(bare.into_items().len(), 1);

        let wrapped: ListResponse =
            serde_json::from_value(json!({ "data": [{ "id": 1 }, { "id": 2 }] })).unwrap();
        assert_eq!(wrapped.into_items().len(), 2);
    }

    #[test]
    fn frame_parse_extracts_type() {
        let frame =
            InboundFrame::parse(r#"{"type":"new_alert","alert_id":"A1","severity":"High"}"#)
                .unwrap();
        assert_eq!(frame.kind, "new_alert");
        assert!(!frame.payload.contains_key("type"));

        let records = frame.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].alert_key().as_deref(), Some("A1"));
        assert_eq!(frame.to_value()["type"], "new_alert");
    }

    #[test]
    fn frame_batch_under_data() {
        let frame = InboundFrame::parse(
            r#"{"type":"device_data","data":[{"device_id":"D1"},{"device_id":"D2"},"junk"]}"#,
        )
        .unwrap();
        let keys: Vec<_> = frame
            .records()
            .iter()
            .filter_map(RawRecord::device_key)
            .collect();
        assert_eq!(keys, ["D1", "D2"]);
    }

    #[test]
    fn malformed_frames_are_errors() {
        assert!(InboundFrame::parse("not json").is_err());
        assert!(InboundFrame::parse("[1,2]").is_err());
        assert!(InboundFrame::parse(r#"{"alert_id":"A1"}"#).is_err());
        assert!(InboundFrame::parse(r#"{"type":42}"#).is_err());
    }
}
