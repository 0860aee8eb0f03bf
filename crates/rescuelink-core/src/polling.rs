// ── Polling scheduler ──
//
// Fetches full snapshots on a fixed interval as a fallback and
// consistency check for the push channel. The first fetch after `start`
// runs immediately and is flagged `initial` until one succeeds. At most
// one fetch is in flight: manual refreshes during a fetch are dropped.
// While the view is hidden no fetches run and manual refreshes are
// dropped; becoming visible triggers exactly one immediate fetch and
// restarts the interval from there.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tokio::sync::{Mutex, Notify, broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::CoreError;
use crate::event::Signal;
use crate::model::Visibility;

/// One poll cycle. The flag is `true` for the initial fetch after start.
pub type PollFn = Arc<dyn Fn(bool) -> BoxFuture<'static, Result<(), CoreError>> + Send + Sync>;

/// Observable scheduler state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PollState {
    /// The interval loop is active (paused-while-hidden still counts).
    pub running: bool,
    pub in_flight: bool,
    pub interval: Duration,
    pub last_fetch_at: Option<DateTime<Utc>>,
    /// Error of the most recent cycle, cleared by the next success.
    pub last_error: Option<String>,
    /// Successful cycles since construction.
    pub fetches: u64,
}

#[derive(Clone)]
struct PollCtx {
    fetch: PollFn,
    state: Arc<watch::Sender<PollState>>,
    in_flight: Arc<AtomicBool>,
    signals: Option<broadcast::Sender<Signal>>,
}

struct RunHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
    refresh: Arc<Notify>,
}

pub struct PollingScheduler {
    ctx: PollCtx,
    visibility: watch::Receiver<Visibility>,
    run: Mutex<Option<RunHandle>>,
}

impl PollingScheduler {
    pub fn new(fetch: PollFn, visibility: watch::Receiver<Visibility>) -> Self {
        let (state, _) = watch::channel(PollState::default());
        Self {
            ctx: PollCtx {
                fetch,
                state: Arc::new(state),
                in_flight: Arc::new(AtomicBool::new(false)),
                signals: None,
            },
            visibility,
            run: Mutex::new(None),
        }
    }

    pub(crate) fn with_signals(mut self, signals: broadcast::Sender<Signal>) -> Self {
        self.ctx.signals = Some(signals);
        self
    }

    // ── Observation ──────────────────────────────────────────────────

    pub fn state(&self) -> PollState {
        self.ctx.state.borrow().clone()
    }

    pub fn watch_state(&self) -> watch::Receiver<PollState> {
        self.ctx.state.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.ctx.state.borrow().running
    }

    pub fn is_in_flight(&self) -> bool {
        self.ctx.in_flight.load(Ordering::Acquire)
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// (Re)start the interval loop. A zero interval or `enabled = false`
    /// leaves the scheduler stopped.
    pub async fn start(&self, interval: Duration, enabled: bool) {
        self.launch(interval, enabled, true).await;
    }

    /// Like [`start`](Self::start), but the first fetch is not flagged
    /// `initial`. For taking over from a feed that was already live.
    pub async fn start_warm(&self, interval: Duration) {
        self.launch(interval, true, false).await;
    }

    async fn launch(&self, interval: Duration, enabled: bool, initial: bool) {
        let mut run = self.run.lock().await;
        Self::stop_inner(&mut run).await;

        if !enabled || interval.is_zero() {
            debug!(?interval, enabled, "polling disabled");
            self.ctx.state.send_modify(|s| {
                s.running = false;
                s.interval = interval;
            });
            return;
        }

        info!(interval_secs = interval.as_secs_f64(), initial, "polling started");
        self.ctx.state.send_modify(|s| {
            s.running = true;
            s.interval = interval;
        });

        let cancel = CancellationToken::new();
        let refresh = Arc::new(Notify::new());
        let task = tokio::spawn(poll_loop(
            self.ctx.clone(),
            interval,
            initial,
            self.visibility.clone(),
            Arc::clone(&refresh),
            cancel.clone(),
        ));
        *run = Some(RunHandle {
            cancel,
            task,
            refresh,
        });
    }

    /// Stop the loop, abandoning any fetch in flight. Idempotent.
    pub async fn stop(&self) {
        let mut run = self.run.lock().await;
        if Self::stop_inner(&mut run).await {
            info!("polling stopped");
        }
        self.ctx.state.send_if_modified(|s| {
            let was_running = s.running;
            s.running = false;
            was_running
        });
    }

    async fn stop_inner(run: &mut Option<RunHandle>) -> bool {
        let Some(handle) = run.take() else {
            return false;
        };
        handle.cancel.cancel();
        if let Err(e) = handle.task.await {
            if e.is_panic() {
                warn!(error = %e, "poll loop panicked");
            }
        }
        true
    }

    /// Fetch now instead of waiting for the next tick.
    ///
    /// When the loop is running this nudges it and returns at once;
    /// otherwise one cycle runs inline and its error is returned.
    /// Returns `Ok(false)` (and does nothing) while a fetch is in flight
    /// or while the running loop is paused for a hidden view.
    pub async fn refresh_now(&self) -> Result<bool, CoreError> {
        let refresh = {
            let run = self.run.lock().await;
            run.as_ref()
                .filter(|h| !h.task.is_finished())
                .map(|h| Arc::clone(&h.refresh))
        };

        if self.is_in_flight() {
            debug!("refresh ignored: fetch already in flight");
            return Ok(false);
        }

        if let Some(refresh) = refresh {
            if *self.visibility.borrow() == Visibility::Hidden {
                debug!("refresh ignored: view hidden");
                return Ok(false);
            }
            refresh.notify_one();
            return Ok(true);
        }

        let initial = self.ctx.state.borrow().last_fetch_at.is_none();
        match run_cycle(&self.ctx, initial).await {
            None => Ok(false),
            Some(result) => result.map(|()| true),
        }
    }
}

// ── Cycle ────────────────────────────────────────────────────────────

/// Clears the in-flight flag however the cycle ends, including
/// cancellation mid-fetch.
struct InFlightGuard<'a>(&'a PollCtx);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.in_flight.store(false, Ordering::Release);
        self.0.state.send_if_modified(|s| {
            let was = s.in_flight;
            s.in_flight = false;
            was
        });
    }
}

/// Run one fetch. `None` when another fetch was already in flight.
async fn run_cycle(ctx: &PollCtx, initial: bool) -> Option<Result<(), CoreError>> {
    if ctx.in_flight.swap(true, Ordering::AcqRel) {
        debug!("fetch already in flight; cycle skipped");
        return None;
    }
    let _guard = InFlightGuard(ctx);
    ctx.state.send_modify(|s| s.in_flight = true);

    debug!(initial, "poll cycle");
    let result = (ctx.fetch)(initial).await;
    match &result {
        Ok(()) => {
            ctx.state.send_modify(|s| {
                s.last_fetch_at = Some(Utc::now());
                s.last_error = None;
                s.fetches += 1;
            });
        }
        Err(e) if e.is_auth() => {
            warn!(error = %e, "snapshot fetch rejected the session");
            ctx.state.send_modify(|s| s.last_error = Some(e.to_string()));
            if let Some(signals) = &ctx.signals {
                // No receivers just means nobody is supervising.
                let _ = signals.send(Signal::AuthRejected {
                    origin: "poll",
                    message: e.to_string(),
                });
            }
        }
        Err(e) => {
            warn!(error = %e, "poll cycle failed");
            ctx.state.send_modify(|s| s.last_error = Some(e.to_string()));
        }
    }
    Some(result)
}

// ── Background loop ──────────────────────────────────────────────────

enum Resume {
    Visible,
    Cancelled,
    SenderGone,
}

async fn poll_loop(
    ctx: PollCtx,
    interval: Duration,
    initial: bool,
    mut visibility: watch::Receiver<Visibility>,
    refresh: Arc<Notify>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut initial = initial;
    let mut watching = true;

    loop {
        if watching && *visibility.borrow_and_update() == Visibility::Hidden {
            debug!("view hidden; polling paused");
            match wait_until_visible(&mut visibility, &cancel).await {
                Resume::Cancelled => break,
                Resume::Visible => debug!("view visible; polling resumed"),
                Resume::SenderGone => watching = false,
            }
            // A nudge that raced the pause must not add a second fetch.
            if refresh.notified().now_or_never().is_some() {
                debug!("stale refresh dropped on resume");
            }
            ticker.reset_immediately();
            continue;
        }

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            changed = visibility.changed(), if watching => {
                if changed.is_err() {
                    watching = false;
                }
                continue;
            }
            _ = ticker.tick() => {}
            () = refresh.notified() => debug!("manual refresh"),
        }

        let end = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            end = run_cycle(&ctx, initial) => end,
        };
        match end {
            Some(Ok(())) => initial = false,
            Some(Err(e)) if e.is_auth() => break,
            Some(Err(_)) | None => {}
        }
    }

    ctx.state.send_modify(|s| s.running = false);
    debug!("poll loop exiting");
}

async fn wait_until_visible(
    visibility: &mut watch::Receiver<Visibility>,
    cancel: &CancellationToken,
) -> Resume {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return Resume::Cancelled,
            changed = visibility.changed() => {
                if changed.is_err() {
                    return Resume::SenderGone;
                }
                if *visibility.borrow_and_update() == Visibility::Visible {
                    return Resume::Visible;
                }
            }
        }
    }
}
