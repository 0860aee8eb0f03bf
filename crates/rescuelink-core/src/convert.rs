// ── Wire-to-domain conversions ──
//
// Bridges `rescuelink_api::RawRecord` into canonical `Record`s. Field-name
// variants are already folded by the api crate; this layer picks the id
// for the collection, fills defaults for missing optional data, and
// rejects objects that cannot be keyed.

use chrono::{DateTime, Utc};
use rescuelink_api::RawRecord;
use tracing::{debug, warn};

use crate::error::CoreError;
use crate::model::{Collection, Record, Severity};

// ── Alerts ──────────────────────────────────────────────────────────

/// Alert defaults: severity `Medium`, unresolved, timestamped `received_at`.
pub fn alert_from_raw(raw: RawRecord, received_at: DateTime<Utc>) -> Result<Record, CoreError> {
    let id = raw.alert_key().ok_or_else(|| CoreError::Parse {
        message: "alert has no id".into(),
    })?;
    let device_id = raw.device_ref().unwrap_or_else(|| {
        debug!(alert = %id, "alert carries no device id");
        String::new()
    });

    Ok(Record {
        severity: severity_or(&raw, Severity::Medium),
        timestamp: raw.timestamp().unwrap_or(received_at),
        resolved: raw.resolved().unwrap_or(false),
        id,
        device_id,
        payload: raw.into_raw(),
    })
}

// ── Devices ─────────────────────────────────────────────────────────

/// Device defaults: severity `Low`, timestamped `received_at`. The device
/// id doubles as the record id.
pub fn device_from_raw(raw: RawRecord, received_at: DateTime<Utc>) -> Result<Record, CoreError> {
    let id = raw.device_key().ok_or_else(|| CoreError::Parse {
        message: "device has no id".into(),
    })?;

    Ok(Record {
        severity: severity_or(&raw, Severity::Low),
        timestamp: raw.timestamp().unwrap_or(received_at),
        resolved: raw.resolved().unwrap_or(false),
        device_id: id.clone(),
        id,
        payload: raw.into_raw(),
    })
}

pub fn record_from_raw(
    raw: RawRecord,
    collection: Collection,
    received_at: DateTime<Utc>,
) -> Result<Record, CoreError> {
    match collection {
        Collection::Alerts => alert_from_raw(raw, received_at),
        Collection::Devices => device_from_raw(raw, received_at),
    }
}

/// Convert a batch, dropping (and logging) anything that cannot be keyed.
pub fn records_from_raw(
    raws: Vec<RawRecord>,
    collection: Collection,
    received_at: DateTime<Utc>,
) -> Vec<Record> {
    raws.into_iter()
        .filter_map(|raw| match record_from_raw(raw, collection, received_at) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(%collection, error = %e, "dropping record");
                None
            }
        })
        .collect()
}

fn severity_or(raw: &RawRecord, default: Severity) -> Severity {
    raw.severity()
        .and_then(Severity::from_wire)
        .unwrap_or(default)
}
