#![allow(clippy::unwrap_used)]
// Scheduling tests for `PollingScheduler`, on a paused clock.

mod support;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::BoxFuture;
use pretty_assertions::assert_eq;
use rescuelink_core::polling::PollFn;
use rescuelink_core::{CoreError, PollingScheduler, Visibility};
use tokio::sync::watch;
use tokio::time::{Instant, sleep_until};

use support::settle;

/// Records `(seconds since start, initial flag)` for every cycle.
struct FetchLog {
    start: Instant,
    calls: Arc<Mutex<Vec<(u64, bool)>>>,
    outcome: Arc<Mutex<Result<(), CoreError>>>,
}

impl FetchLog {
    fn new() -> Self {
        Self {
            start: Instant::now(),
            calls: Arc::new(Mutex::new(Vec::new())),
            outcome: Arc::new(Mutex::new(Ok(()))),
        }
    }

    fn fetch(&self, delay: Duration) -> PollFn {
        let start = self.start;
        let calls = Arc::clone(&self.calls);
        let outcome = Arc::clone(&self.outcome);
        Arc::new(move |initial: bool| -> BoxFuture<'static, Result<(), CoreError>> {
            calls
                .lock()
                .unwrap()
                .push((start.elapsed().as_secs(), initial));
            let result = outcome.lock().unwrap().clone();
            Box::pin(async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                result
            })
        })
    }

    fn fail_with(&self, error: CoreError) {
        *self.outcome.lock().unwrap() = Err(error);
    }

    fn succeed(&self) {
        *self.outcome.lock().unwrap() = Ok(());
    }

    fn calls(&self) -> Vec<(u64, bool)> {
        self.calls.lock().unwrap().clone()
    }

    fn times(&self) -> Vec<u64> {
        self.calls().into_iter().map(|(t, _)| t).collect()
    }

    async fn at(&self, secs: u64) {
        sleep_until(self.start + Duration::from_secs(secs) + Duration::from_millis(500)).await;
    }
}

fn scheduler(log: &FetchLog, delay: Duration) -> (PollingScheduler, watch::Sender<Visibility>) {
    let (visibility, rx) = watch::channel(Visibility::Visible);
    (PollingScheduler::new(log.fetch(delay), rx), visibility)
}

// ── Interval ────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn first_fetch_is_immediate_and_initial() {
    let log = FetchLog::new();
    let (poller, _visibility) = scheduler(&log, Duration::ZERO);

    poller.start(Duration::from_secs(10), true).await;
    log.at(25).await;

    assert_eq!(log.calls(), [(0, true), (10, false), (20, false)]);
    assert!(poller.is_running());
    assert_eq!(poller.state().fetches, 3);
    assert!(poller.state().last_fetch_at.is_some());
}

#[tokio::test(start_paused = true)]
async fn initial_flag_survives_until_a_fetch_succeeds() {
    let log = FetchLog::new();
    log.fail_with(CoreError::Fetch {
        message: "maintenance".into(),
        status: Some(503),
    });
    let (poller, _visibility) = scheduler(&log, Duration::ZERO);

    poller.start(Duration::from_secs(10), true).await;
    log.at(5).await;
    assert!(poller.state().last_error.is_some());

    log.succeed();
    log.at(25).await;

    assert_eq!(log.calls(), [(0, true), (10, true), (20, false)]);
    assert_eq!(poller.state().last_error, None);
}

#[tokio::test(start_paused = true)]
async fn warm_start_is_never_initial() {
    let log = FetchLog::new();
    let (poller, _visibility) = scheduler(&log, Duration::ZERO);

    poller.start_warm(Duration::from_secs(10)).await;
    log.at(15).await;
    poller.stop().await;

    assert_eq!(log.calls(), [(0, false), (10, false)]);
}

#[tokio::test(start_paused = true)]
async fn zero_interval_or_disabled_is_a_no_op() {
    let log = FetchLog::new();
    let (poller, _visibility) = scheduler(&log, Duration::ZERO);

    poller.start(Duration::ZERO, true).await;
    poller.start(Duration::from_secs(5), false).await;
    log.at(30).await;

    assert!(log.calls().is_empty());
    assert!(!poller.is_running());
}

#[tokio::test(start_paused = true)]
async fn stop_is_idempotent_and_restart_fetches_again() {
    let log = FetchLog::new();
    let (poller, _visibility) = scheduler(&log, Duration::ZERO);

    poller.start(Duration::from_secs(10), true).await;
    log.at(5).await;
    poller.stop().await;
    poller.stop().await;
    assert!(!poller.is_running());

    log.at(40).await;
    assert_eq!(log.times(), [0]);

    poller.start(Duration::from_secs(10), true).await;
    settle().await;
    assert_eq!(log.times(), [0, 40]);
}

// ── Visibility ──────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn hidden_view_pauses_and_visible_fetches_at_once() {
    let log = FetchLog::new();
    let (poller, visibility) = scheduler(&log, Duration::ZERO);

    poller.start(Duration::from_secs(10), true).await;
    log.at(2).await;
    visibility.send_replace(Visibility::Hidden);

    log.at(24).await;
    assert_eq!(log.times(), [0], "no fetches while hidden");
    assert!(poller.is_running(), "paused still counts as running");

    visibility.send_replace(Visibility::Visible);
    log.at(36).await;

    // Immediate fetch on becoming visible, then the interval restarts.
    assert_eq!(log.times(), [0, 24, 34]);
}

#[tokio::test(start_paused = true)]
async fn starting_hidden_waits_for_visibility() {
    let log = FetchLog::new();
    let (poller, visibility) = scheduler(&log, Duration::ZERO);
    visibility.send_replace(Visibility::Hidden);

    poller.start(Duration::from_secs(10), true).await;
    log.at(30).await;
    assert!(log.calls().is_empty());

    visibility.send_replace(Visibility::Visible);
    settle().await;
    assert_eq!(log.calls(), [(30, true)]);
}

#[tokio::test(start_paused = true)]
async fn refresh_while_hidden_does_not_double_fetch_on_resume() {
    let log = FetchLog::new();
    let (poller, visibility) = scheduler(&log, Duration::ZERO);

    poller.start(Duration::from_secs(60), true).await;
    log.at(1).await;
    visibility.send_replace(Visibility::Hidden);
    settle().await;

    assert!(!poller.refresh_now().await.unwrap());
    log.at(5).await;
    visibility.send_replace(Visibility::Visible);
    log.at(10).await;

    assert_eq!(log.times(), [0, 5]);
}

// ── Refresh ─────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn refresh_during_fetch_is_dropped() {
    let log = FetchLog::new();
    let (poller, _visibility) = scheduler(&log, Duration::from_secs(5));

    poller.start(Duration::from_secs(60), true).await;
    log.at(1).await;
    assert!(poller.is_in_flight());

    assert!(!poller.refresh_now().await.unwrap());
    log.at(6).await;
    assert!(!poller.is_in_flight());
    assert_eq!(log.times(), [0]);

    assert!(poller.refresh_now().await.unwrap());
    log.at(7).await;
    assert_eq!(log.times(), [0, 6]);
}

#[tokio::test(start_paused = true)]
async fn refresh_while_stopped_runs_inline() {
    let log = FetchLog::new();
    let (poller, _visibility) = scheduler(&log, Duration::ZERO);

    assert!(poller.refresh_now().await.unwrap());
    assert!(poller.refresh_now().await.unwrap());
    assert_eq!(log.calls(), [(0, true), (0, false)]);
    assert!(!poller.is_running());

    log.fail_with(CoreError::Fetch {
        message: "maintenance".into(),
        status: Some(503),
    });
    let err = poller.refresh_now().await.unwrap_err();
    assert!(matches!(err, CoreError::Fetch { status: Some(503), .. }));
}

// ── Auth ────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn auth_rejection_stops_the_loop() {
    let log = FetchLog::new();
    log.fail_with(CoreError::AuthenticationFailed {
        message: "Token expired".into(),
    });
    let (poller, _visibility) = scheduler(&log, Duration::ZERO);

    poller.start(Duration::from_secs(10), true).await;
    log.at(60).await;

    assert_eq!(log.times(), [0]);
    assert!(!poller.is_running());
    assert!(poller.state().last_error.unwrap().contains("Token expired"));
}
