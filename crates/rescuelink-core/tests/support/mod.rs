// Scripted transports for driving the sync layer without a network.
#![allow(dead_code, clippy::unwrap_used)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::BoxFuture;
use rescuelink_api::{Error, PushFrame, RawRecord};
use rescuelink_core::{Collection, PushChannel, PushConnector, Role, SnapshotSource, SyncEvent};
use secrecy::SecretString;
use serde_json::Value;
use tokio::sync::mpsc;
use url::Url;

pub fn push_url() -> Url {
    Url::parse("ws://backend.test/ws").unwrap()
}

pub fn api_url() -> Url {
    Url::parse("http://backend.test/api/v1/").unwrap()
}

/// Let spawned tasks run; with a paused clock this also auto-advances.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

/// Collects every event delivered to a subscription.
pub fn recorder() -> (Arc<Mutex<Vec<SyncEvent>>>, impl Fn(&SyncEvent) + Send + Sync + 'static) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    (seen, move |event: &SyncEvent| sink.lock().unwrap().push(event.clone()))
}

// ── Push ────────────────────────────────────────────────────────────

pub enum Plan {
    Fail,
    Reject,
    Open(FakeChannel),
}

/// Pops one plan per `open`; an empty script means "refused".
#[derive(Default)]
pub struct FakeConnector {
    plans: Mutex<VecDeque<Plan>>,
    attempts: AtomicU32,
    urls: Mutex<Vec<Url>>,
}

impl FakeConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn plan(&self, plan: Plan) {
        self.plans.lock().unwrap().push_back(plan);
    }

    /// Script an open that succeeds, returning the server side.
    pub fn accept(&self) -> ChannelHandle {
        let (channel, handle) = channel();
        self.plan(Plan::Open(channel));
        handle
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn last_url(&self) -> Option<Url> {
        self.urls.lock().unwrap().last().cloned()
    }
}

impl PushConnector for FakeConnector {
    fn open(&self, url: Url) -> BoxFuture<'static, Result<Box<dyn PushChannel>, Error>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.urls.lock().unwrap().push(url);
        let plan = self.plans.lock().unwrap().pop_front().unwrap_or(Plan::Fail);
        Box::pin(async move {
            match plan {
                Plan::Fail => Err(Error::WebSocketConnect("connection refused".into())),
                Plan::Reject => Err(Error::Unauthorized {
                    status: 401,
                    message: "push channel upgrade rejected".into(),
                }),
                Plan::Open(channel) => Ok(Box::new(channel) as Box<dyn PushChannel>),
            }
        })
    }
}

pub struct FakeChannel {
    rx: mpsc::UnboundedReceiver<PushFrame>,
    closed: Arc<AtomicBool>,
}

/// Server side of a `FakeChannel`. Dropping it ends the stream.
pub struct ChannelHandle {
    tx: mpsc::UnboundedSender<PushFrame>,
    closed: Arc<AtomicBool>,
}

pub fn channel() -> (FakeChannel, ChannelHandle) {
    let (tx, rx) = mpsc::unbounded_channel();
    let closed = Arc::new(AtomicBool::new(false));
    (
        FakeChannel {
            rx,
            closed: Arc::clone(&closed),
        },
        ChannelHandle { tx, closed },
    )
}

impl ChannelHandle {
    pub fn send(&self, frame: &Value) {
        let _ = self.tx.send(PushFrame::Text(frame.to_string()));
    }

    pub fn send_raw(&self, text: &str) {
        let _ = self.tx.send(PushFrame::Text(text.to_owned()));
    }

    pub fn close(&self, code: u16) {
        let _ = self.tx.send(PushFrame::Close {
            code,
            reason: String::new(),
        });
    }

    /// We sent a close frame from our side.
    pub fn was_closed_by_client(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl PushChannel for FakeChannel {
    fn recv(&mut self) -> BoxFuture<'_, Option<Result<PushFrame, Error>>> {
        Box::pin(async move { self.rx.recv().await.map(Ok) })
    }

    fn shutdown(self: Box<Self>) -> BoxFuture<'static, ()> {
        self.closed.store(true, Ordering::SeqCst);
        Box::pin(async {})
    }
}

// ── Poll ────────────────────────────────────────────────────────────

#[derive(Clone, Copy)]
pub enum Failure {
    Server,
    Unauthorized,
}

/// Serves whatever alerts/devices the test put in, optionally slowly.
#[derive(Default)]
pub struct FakeSource {
    alerts: Mutex<Vec<Value>>,
    devices: Mutex<Vec<Value>>,
    failure: Mutex<Option<Failure>>,
    device_failure: Mutex<Option<Failure>>,
    delay: Mutex<Duration>,
    cycles: AtomicU32,
    device_roles: Mutex<Vec<Role>>,
}

impl FakeSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_alerts(&self, alerts: Vec<Value>) {
        *self.alerts.lock().unwrap() = alerts;
    }

    pub fn set_devices(&self, devices: Vec<Value>) {
        *self.devices.lock().unwrap() = devices;
    }

    pub fn fail_with(&self, failure: Option<Failure>) {
        *self.failure.lock().unwrap() = failure;
    }

    /// Fail only the device fetch; alerts keep being served.
    pub fn fail_devices_with(&self, failure: Option<Failure>) {
        *self.device_failure.lock().unwrap() = failure;
    }

    /// Role passed with each device fetch, oldest first.
    pub fn device_roles(&self) -> Vec<Role> {
        self.device_roles.lock().unwrap().clone()
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    /// Number of poll cycles (alert fetches) served.
    pub fn cycles(&self) -> u32 {
        self.cycles.load(Ordering::SeqCst)
    }
}

impl SnapshotSource for FakeSource {
    fn fetch(
        &self,
        collection: Collection,
        role: Role,
        _token: SecretString,
    ) -> BoxFuture<'static, Result<Vec<RawRecord>, Error>> {
        let items = match collection {
            Collection::Alerts => {
                self.cycles.fetch_add(1, Ordering::SeqCst);
                self.alerts.lock().unwrap().clone()
            }
            Collection::Devices => {
                self.device_roles.lock().unwrap().push(role);
                self.devices.lock().unwrap().clone()
            }
        };
        let failure = match collection {
            Collection::Alerts => *self.failure.lock().unwrap(),
            Collection::Devices => {
                (*self.failure.lock().unwrap()).or(*self.device_failure.lock().unwrap())
            }
        };
        let delay = *self.delay.lock().unwrap();

        Box::pin(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            match failure {
                Some(Failure::Server) => Err(Error::Http {
                    status: 503,
                    message: "maintenance".into(),
                }),
                Some(Failure::Unauthorized) => Err(Error::Unauthorized {
                    status: 401,
                    message: "Token expired".into(),
                }),
                None => Ok(items
                    .into_iter()
                    .map(|v| RawRecord::from_value(v).unwrap())
                    .collect()),
            }
        })
    }
}
