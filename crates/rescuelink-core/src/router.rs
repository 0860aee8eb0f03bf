// ── Inbound routing ──
//
// Glue between the transports and the reconcilers. Push frames are
// parsed, converted and applied as partial updates; poll cycles fetch
// both collections concurrently and apply them as snapshots.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rescuelink_api::{InboundFrame, RawRecord};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::convert;
use crate::error::CoreError;
use crate::event::{MessageKind, Source, SyncEvent};
use crate::facade::SessionProvider;
use crate::model::Collection;
use crate::registry::SubscriptionRegistry;
use crate::store::{ApplyMode, Reconciler};
use crate::transport::SnapshotSource;

pub(crate) struct Router {
    alerts: Arc<Reconciler>,
    devices: Arc<Reconciler>,
    registry: SubscriptionRegistry<SyncEvent>,
    last_update: watch::Sender<Option<DateTime<Utc>>>,
}

impl Router {
    pub(crate) fn new(
        alerts: Arc<Reconciler>,
        devices: Arc<Reconciler>,
        registry: SubscriptionRegistry<SyncEvent>,
    ) -> Self {
        let (last_update, _) = watch::channel(None);
        Self {
            alerts,
            devices,
            registry,
            last_update,
        }
    }

    pub(crate) fn reconciler(&self, collection: Collection) -> &Arc<Reconciler> {
        match collection {
            Collection::Alerts => &self.alerts,
            Collection::Devices => &self.devices,
        }
    }

    pub(crate) fn last_update(&self) -> Option<DateTime<Utc>> {
        *self.last_update.borrow()
    }

    pub(crate) fn watch_last_update(&self) -> watch::Receiver<Option<DateTime<Utc>>> {
        self.last_update.subscribe()
    }

    /// The push feed came up at `at`; see [`Reconciler::mark_live`].
    pub(crate) fn mark_live(&self, at: DateTime<Utc>) {
        self.alerts.mark_live(at);
        self.devices.mark_live(at);
    }

    pub(crate) fn clear(&self) {
        self.alerts.clear();
        self.devices.clear();
        self.last_update.send_replace(None);
    }

    fn touch(&self, at: DateTime<Utc>) {
        self.last_update.send_replace(Some(at));
    }

    // ── Push ─────────────────────────────────────────────────────────

    /// Handle one text frame. Malformed frames are logged and dropped.
    pub(crate) fn handle_text(&self, text: &str) {
        let frame = match InboundFrame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %CoreError::from(e), "dropping push frame");
                return;
            }
        };

        let kind = MessageKind::parse(&frame.kind);
        let Some(collection) = kind.collection() else {
            debug!(kind = %kind, "unrecognized push frame; wildcard only");
            let event = SyncEvent {
                topic: frame.kind.clone(),
                collection: None,
                source: Source::Push,
                records: Vec::new(),
                frame: Some(frame.to_value()),
            };
            self.registry.publish_wildcard(&event.topic, &event);
            return;
        };

        let received_at = Utc::now();
        let raws = frame.records();
        let frame_value = Some(frame.to_value());

        if kind == MessageKind::AlertResolved {
            self.handle_resolved(raws, frame_value, received_at);
            return;
        }

        let records = convert::records_from_raw(raws, collection, received_at);
        if records.is_empty() {
            warn!(kind = %kind, "push frame carried no usable records");
            return;
        }

        self.reconciler(collection).apply(
            records,
            ApplyMode::Partial {
                kind,
                frame: frame_value,
            },
        );
        self.touch(received_at);
    }

    /// `alert_resolved` may carry a full alert or just `{alertId, resolvedAt}`.
    fn handle_resolved(
        &self,
        raws: Vec<RawRecord>,
        frame: Option<serde_json::Value>,
        received_at: DateTime<Utc>,
    ) {
        let mut full = Vec::new();
        for raw in raws {
            let Some(id) = raw.alert_key() else {
                warn!("alert_resolved without an alert id dropped");
                continue;
            };

            if raw.device_ref().is_some() {
                match convert::alert_from_raw(raw, received_at) {
                    Ok(mut record) => {
                        record.resolved = true;
                        full.push(record);
                    }
                    Err(e) => warn!(error = %e, "dropping resolved alert"),
                }
            } else {
                let at = raw.resolved_at().or(Some(received_at));
                self.alerts
                    .resolve(&id, at, MessageKind::AlertResolved, frame.clone());
                self.touch(received_at);
            }
        }

        if !full.is_empty() {
            self.alerts.apply(
                full,
                ApplyMode::Partial {
                    kind: MessageKind::AlertResolved,
                    frame,
                },
            );
            self.touch(received_at);
        }
    }

    // ── Poll ─────────────────────────────────────────────────────────

    /// Fetch both collections concurrently and apply whatever arrived.
    ///
    /// A failure in one collection does not discard the other. An auth
    /// rejection wins over any other error.
    pub(crate) async fn poll_cycle(
        &self,
        source: &dyn SnapshotSource,
        session: &dyn SessionProvider,
        initial: bool,
    ) -> Result<(), CoreError> {
        let token = session
            .token()
            .ok_or_else(|| CoreError::AuthenticationFailed {
                message: "no session token".into(),
            })?;

        let role = session.role();
        let (alerts, devices) = tokio::join!(
            source.fetch(Collection::Alerts, role, token.clone()),
            source.fetch(Collection::Devices, role, token),
        );
        let fetched_at = Utc::now();

        let mut failure: Option<CoreError> = None;
        for (collection, result) in [(Collection::Alerts, alerts), (Collection::Devices, devices)] {
            match result {
                Ok(raws) => {
                    let records = convert::records_from_raw(raws, collection, fetched_at);
                    self.reconciler(collection)
                        .apply(records, ApplyMode::Snapshot { initial });
                }
                Err(e) => {
                    let err = CoreError::from(e);
                    debug!(%collection, error = %err, "snapshot fetch failed");
                    if failure.as_ref().is_none_or(|f| !f.is_auth()) {
                        failure = Some(err);
                    }
                }
            }
        }

        match failure {
            Some(err) => Err(err),
            None => {
                self.touch(fetched_at);
                Ok(())
            }
        }
    }
}
