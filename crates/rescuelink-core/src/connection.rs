// ── Push channel connection manager ──
//
// Owns the push channel lifecycle and its reconnect loop. State is
// published on a `watch` channel:
//
//   Idle → Connecting → Connected → Disconnected → Connecting → …
//                                                → Failed
//
// Retries count reconnect attempts within one outage and reset on every
// successful open. A server close with code 1000 ends the loop without a
// reconnect; any other close, error or stream end schedules one. An
// auth rejection stops the loop and raises a signal instead of retrying.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use rescuelink_api::PushFrame;
use rescuelink_api::websocket::NORMAL_CLOSURE;
use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::error::CoreError;
use crate::event::Signal;
use crate::model::ConnectionState;
use crate::retry::{Retry, RetryPolicy};
use crate::transport::{PushChannel, PushConnector};

/// Called with every text frame, on the read loop's task.
pub type FrameHandler = Arc<dyn Fn(&str) + Send + Sync>;

/// Upper bound on sending our own close frame during `disconnect`.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

struct RunSlot {
    /// Last URL passed to `connect`, reused by `reconnect`.
    url: Option<Url>,
    task: Option<(CancellationToken, JoinHandle<()>)>,
}

pub struct ConnectionManager {
    connector: Arc<dyn PushConnector>,
    policy: RetryPolicy,
    on_text: FrameHandler,
    state: Arc<watch::Sender<ConnectionState>>,
    retries: Arc<AtomicU32>,
    signals: Option<broadcast::Sender<Signal>>,
    run: Mutex<RunSlot>,
}

impl ConnectionManager {
    pub fn new(connector: Arc<dyn PushConnector>, policy: RetryPolicy, on_text: FrameHandler) -> Self {
        let (state, _) = watch::channel(ConnectionState::Idle);
        Self {
            connector,
            policy,
            on_text,
            state: Arc::new(state),
            retries: Arc::new(AtomicU32::new(0)),
            signals: None,
            run: Mutex::new(RunSlot {
                url: None,
                task: None,
            }),
        }
    }

    pub(crate) fn with_signals(mut self, signals: broadcast::Sender<Signal>) -> Self {
        self.signals = Some(signals);
        self
    }

    // ── Observation ──────────────────────────────────────────────────

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Reconnect attempts made in the current outage.
    pub fn retries(&self) -> u32 {
        self.retries.load(Ordering::Relaxed)
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Open the channel and keep it open.
    ///
    /// A no-op while a loop is already running, and while `Failed`
    /// (use [`reconnect`](Self::reconnect) to leave that state).
    pub async fn connect(&self, url: Url) -> Result<(), CoreError> {
        let mut slot = self.run.lock().await;

        if slot.task.as_ref().is_some_and(|(_, task)| !task.is_finished()) {
            debug!("push loop already running; connect ignored");
            return Ok(());
        }
        if self.state() == ConnectionState::Failed {
            debug!("push channel failed; waiting for a manual reconnect");
            return Ok(());
        }

        self.spawn_loop(&mut slot, url);
        Ok(())
    }

    /// Close the channel with a normal-closure frame. Idempotent.
    pub async fn disconnect(&self) {
        let mut slot = self.run.lock().await;
        Self::stop_loop(&mut slot).await;

        self.state.send_if_modified(|state| match state {
            ConnectionState::Idle | ConnectionState::Disconnected => false,
            _ => {
                *state = ConnectionState::Disconnected;
                true
            }
        });
    }

    /// Tear down and reopen with a fresh retry budget, reusing the last URL.
    pub async fn reconnect(&self) -> Result<(), CoreError> {
        let mut slot = self.run.lock().await;
        let url = slot.url.clone().ok_or(CoreError::NotStarted)?;
        Self::stop_loop(&mut slot).await;
        info!("manual reconnect");
        self.spawn_loop(&mut slot, url);
        Ok(())
    }

    /// Like [`reconnect`](Self::reconnect) with a new URL (e.g. a rotated token).
    pub async fn reconnect_to(&self, url: Url) {
        let mut slot = self.run.lock().await;
        Self::stop_loop(&mut slot).await;
        info!("manual reconnect");
        self.spawn_loop(&mut slot, url);
    }

    fn spawn_loop(&self, slot: &mut RunSlot, url: Url) {
        let cancel = CancellationToken::new();
        self.retries.store(0, Ordering::Relaxed);
        self.state.send_replace(ConnectionState::Connecting);

        let ctx = LoopCtx {
            connector: Arc::clone(&self.connector),
            policy: self.policy,
            on_text: Arc::clone(&self.on_text),
            state: Arc::clone(&self.state),
            retries: Arc::clone(&self.retries),
            signals: self.signals.clone(),
            url: url.clone(),
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(connection_loop(ctx));

        slot.url = Some(url);
        slot.task = Some((cancel, task));
    }

    async fn stop_loop(slot: &mut RunSlot) {
        if let Some((cancel, task)) = slot.task.take() {
            cancel.cancel();
            if let Err(e) = task.await {
                if e.is_panic() {
                    error!(error = %e, "push loop panicked");
                }
            }
        }
    }
}

// ── Background reconnection loop ─────────────────────────────────────

struct LoopCtx {
    connector: Arc<dyn PushConnector>,
    policy: RetryPolicy,
    on_text: FrameHandler,
    state: Arc<watch::Sender<ConnectionState>>,
    retries: Arc<AtomicU32>,
    signals: Option<broadcast::Sender<Signal>>,
    url: Url,
    cancel: CancellationToken,
}

enum PumpEnd {
    Cancelled,
    CleanClose,
    Dropped(String),
}

/// Main loop: open → read → on failure, backoff → reopen.
async fn connection_loop(ctx: LoopCtx) {
    let mut retries: u32 = 0;

    loop {
        ctx.state.send_replace(ConnectionState::Connecting);

        let opened = tokio::select! {
            biased;
            () = ctx.cancel.cancelled() => break,
            opened = ctx.connector.open(ctx.url.clone()) => opened,
        };

        let reason = match opened {
            Ok(mut channel) => {
                retries = 0;
                ctx.retries.store(0, Ordering::Relaxed);
                ctx.state.send_replace(ConnectionState::Connected);
                info!("push channel connected");

                match pump(channel.as_mut(), &ctx).await {
                    PumpEnd::Cancelled => {
                        if tokio::time::timeout(CLOSE_TIMEOUT, channel.shutdown()).await.is_err() {
                            debug!("close frame timed out");
                        }
                        break;
                    }
                    PumpEnd::CleanClose => {
                        info!("push channel closed by server");
                        ctx.state.send_replace(ConnectionState::Disconnected);
                        break;
                    }
                    PumpEnd::Dropped(reason) => reason,
                }
            }
            Err(e) if e.is_auth_rejected() => {
                warn!(error = %e, "push channel rejected the session");
                ctx.state.send_replace(ConnectionState::Disconnected);
                if let Some(signals) = &ctx.signals {
                    // No receivers just means nobody is supervising.
                    let _ = signals.send(Signal::AuthRejected {
                        origin: "push",
                        message: e.to_string(),
                    });
                }
                break;
            }
            Err(e) => e.to_string(),
        };

        ctx.state.send_replace(ConnectionState::Disconnected);

        match ctx.policy.decide(retries) {
            Retry::GiveUp => {
                error!(retries, reason = %reason, "push channel reconnection limit reached, giving up");
                ctx.state.send_replace(ConnectionState::Failed);
                break;
            }
            Retry::After(delay) => {
                info!(
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    attempt = retries + 1,
                    reason = %reason,
                    "waiting before reconnect"
                );

                tokio::select! {
                    biased;
                    () = ctx.cancel.cancelled() => break,
                    () = tokio::time::sleep(delay) => {}
                }

                retries += 1;
                ctx.retries.store(retries, Ordering::Relaxed);
            }
        }
    }

    debug!("push loop exiting");
}

/// Read frames until the channel ends or we are cancelled.
async fn pump(channel: &mut dyn PushChannel, ctx: &LoopCtx) -> PumpEnd {
    loop {
        let frame = tokio::select! {
            biased;
            () = ctx.cancel.cancelled() => return PumpEnd::Cancelled,
            frame = channel.recv() => frame,
        };

        match frame {
            Some(Ok(PushFrame::Text(text))) => (ctx.on_text)(&text),
            Some(Ok(PushFrame::Close { code, reason })) => {
                return if code == NORMAL_CLOSURE {
                    PumpEnd::CleanClose
                } else {
                    PumpEnd::Dropped(format!("closed with code {code}: {reason}"))
                };
            }
            Some(Err(e)) => return PumpEnd::Dropped(e.to_string()),
            None => return PumpEnd::Dropped("stream ended without a close frame".into()),
        }
    }
}
