// ── Sync facade ──
//
// The one entry point the UI uses. Wires the push channel, the polling
// scheduler and the two reconcilers together, supervises them, and
// exposes a single status. A supervisor task watches the components:
//
// - push channel `Failed` → start polling as a fallback (`degraded`);
//   if the channel had been live the fallback continues from it rather
//   than starting over as an initial load
// - push channel `Connected` again → stop fallback polling
// - any auth rejection → stop everything and report `auth_rejected`

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};

use chrono::Utc;
use futures_util::future::BoxFuture;
use rescuelink_api::websocket::authorized_url;
use rescuelink_api::{PushClient, RestClient};
use secrecy::SecretString;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{DEFAULT_POLL_INTERVAL, SyncConfig};
use crate::connection::{ConnectionManager, FrameHandler};
use crate::error::CoreError;
use crate::event::{Signal, SyncEvent};
use crate::model::{Collection, ConnectionState, Record, Role, SyncStatus, Viewer, Visibility};
use crate::polling::{PollFn, PollingScheduler};
use crate::registry::{Subscription, SubscriptionRegistry, Topic};
use crate::router::Router;
use crate::stream::RecordStream;
use crate::transport::{PushConnector, SnapshotSource};

const SIGNAL_CHANNEL_SIZE: usize = 16;

// ── Session ─────────────────────────────────────────────────────────

/// Supplies the bearer token. Asked on every connect and every poll so a
/// rotated token is picked up without restarting.
pub trait SessionProvider: Send + Sync + 'static {
    fn token(&self) -> Option<SecretString>;

    /// Role of the signed-in account. Decides which device list is polled.
    fn role(&self) -> Role {
        Role::Operator
    }

    /// The backend refused the token. The sync layer has already stopped.
    fn on_auth_rejected(&self, _reason: &str) {}
}

/// A fixed token, e.g. from the CLI's config or keyring.
pub struct StaticSession {
    token: SecretString,
    role: Role,
    rejected: AtomicBool,
}

impl StaticSession {
    pub fn new(token: SecretString) -> Self {
        Self {
            token,
            role: Role::Operator,
            rejected: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    pub fn is_rejected(&self) -> bool {
        self.rejected.load(Ordering::Acquire)
    }
}

impl SessionProvider for StaticSession {
    fn token(&self) -> Option<SecretString> {
        Some(self.token.clone())
    }

    fn role(&self) -> Role {
        self.role
    }

    fn on_auth_rejected(&self, reason: &str) {
        debug!(reason, "static session marked rejected");
        self.rejected.store(true, Ordering::Release);
    }
}

// ── SyncFacade ──────────────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<FacadeInner>`. Nothing runs until
/// [`start()`](Self::start); [`stop()`](Self::stop) tears everything down
/// and empties the canonical sets.
#[derive(Clone)]
pub struct SyncFacade {
    inner: Arc<FacadeInner>,
}

#[derive(Debug, Default)]
struct Flags {
    degraded: bool,
    auth_rejected: bool,
    /// Polling was requested by configuration, not by the fallback.
    explicit_polling: bool,
    /// The push channel reached `Connected` since the last start.
    push_was_live: bool,
    last_error: Option<String>,
}

struct FacadeInner {
    config: SyncConfig,
    session: Arc<dyn SessionProvider>,
    registry: SubscriptionRegistry<SyncEvent>,
    router: Arc<Router>,
    connection: ConnectionManager,
    polling: PollingScheduler,
    visibility: watch::Sender<Visibility>,
    status: watch::Sender<SyncStatus>,
    signals: broadcast::Sender<Signal>,
    flags: StdMutex<Flags>,
    supervisor: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
    /// Serializes start-up against teardown so a rejection raised while
    /// starting cannot be undone by the rest of `start`.
    lifecycle: Mutex<()>,
}

impl SyncFacade {
    /// Build with the real REST and WebSocket transports.
    pub fn new(config: SyncConfig, session: Arc<dyn SessionProvider>) -> Result<Self, CoreError> {
        let rest = RestClient::new(config.api_url.as_str(), &config.transport())?;
        let push = PushClient::default();
        Ok(Self::with_transports(
            config,
            session,
            Arc::new(push),
            Arc::new(rest),
        ))
    }

    /// Build with caller-supplied transports.
    pub fn with_transports(
        config: SyncConfig,
        session: Arc<dyn SessionProvider>,
        push: Arc<dyn PushConnector>,
        source: Arc<dyn SnapshotSource>,
    ) -> Self {
        let registry = SubscriptionRegistry::new();
        let reconciler = |collection| {
            Arc::new(crate::store::Reconciler::new(
                collection,
                config.conflict_policy,
                config.prune_missing,
                registry.clone(),
            ))
        };
        let router = Arc::new(Router::new(
            reconciler(Collection::Alerts),
            reconciler(Collection::Devices),
            registry.clone(),
        ));

        let (signals, _) = broadcast::channel(SIGNAL_CHANNEL_SIZE);
        let (visibility, visibility_rx) = watch::channel(Visibility::Visible);
        let (status, _) = watch::channel(SyncStatus::default());

        let on_text: FrameHandler = {
            let router = Arc::clone(&router);
            Arc::new(move |text: &str| router.handle_text(text))
        };
        let connection =
            ConnectionManager::new(push, config.retry, on_text).with_signals(signals.clone());

        let fetch: PollFn = {
            let router = Arc::clone(&router);
            let session = Arc::clone(&session);
            Arc::new(move |initial: bool| -> BoxFuture<'static, Result<(), CoreError>> {
                let router = Arc::clone(&router);
                let source = Arc::clone(&source);
                let session = Arc::clone(&session);
                Box::pin(async move {
                    router
                        .poll_cycle(source.as_ref(), session.as_ref(), initial)
                        .await
                })
            })
        };
        let polling = PollingScheduler::new(fetch, visibility_rx).with_signals(signals.clone());

        Self {
            inner: Arc::new(FacadeInner {
                config,
                session,
                registry,
                router,
                connection,
                polling,
                visibility,
                status,
                signals,
                flags: StdMutex::new(Flags::default()),
                supervisor: Mutex::new(None),
                lifecycle: Mutex::new(()),
            }),
        }
    }

    /// Access the sync configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    fn flags(&self) -> MutexGuard<'_, Flags> {
        self.inner.flags.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn token(&self) -> Result<SecretString, CoreError> {
        self.inner
            .session
            .token()
            .ok_or_else(|| CoreError::AuthenticationFailed {
                message: "no session token".into(),
            })
    }

    fn poll_interval(&self) -> std::time::Duration {
        if self.inner.config.poll_interval.is_zero() {
            DEFAULT_POLL_INTERVAL
        } else {
            self.inner.config.poll_interval
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Open the push channel and start polling, per configuration.
    /// Idempotent while running.
    pub async fn start(&self) -> Result<(), CoreError> {
        let _lifecycle = self.inner.lifecycle.lock().await;
        let mut supervisor = self.inner.supervisor.lock().await;
        if supervisor
            .as_ref()
            .is_some_and(|(_, task)| !task.is_finished())
        {
            debug!("sync already started");
            return Ok(());
        }

        let token = self.token()?;
        let config = &self.inner.config;
        let explicit_polling = config.polling_enabled && !config.poll_interval.is_zero();
        {
            let mut flags = self.flags();
            *flags = Flags {
                explicit_polling,
                ..Flags::default()
            };
        }

        // Subscribe before anything can raise a signal.
        let cancel = CancellationToken::new();
        let task = tokio::spawn(supervisor_task(
            self.clone(),
            self.inner.signals.subscribe(),
            cancel.clone(),
        ));
        *supervisor = Some((cancel, task));
        drop(supervisor);

        if config.push_enabled {
            self.inner
                .connection
                .connect(authorized_url(&config.push_url, &token))
                .await?;
        }
        if explicit_polling {
            self.inner.polling.start(config.poll_interval, true).await;
        }
        if !config.push_enabled && !explicit_polling {
            warn!("push and polling are both disabled; call refresh() to sync");
        }

        info!(
            push = config.push_enabled,
            polling = explicit_polling,
            "sync started"
        );
        self.publish_status();
        Ok(())
    }

    /// Close the channel, stop polling and empty the canonical sets.
    /// Idempotent.
    pub async fn stop(&self) {
        let supervisor = self.inner.supervisor.lock().await.take();
        if let Some((cancel, task)) = supervisor {
            cancel.cancel();
            let _ = task.await;
        }

        let _lifecycle = self.inner.lifecycle.lock().await;
        self.halt().await;
        {
            let mut flags = self.flags();
            flags.degraded = false;
            flags.explicit_polling = false;
            flags.push_was_live = false;
        }
        self.publish_status();
        debug!("sync stopped");
    }

    async fn halt(&self) {
        self.inner.connection.disconnect().await;
        self.inner.polling.stop().await;
        self.inner.router.clear();
    }

    /// Fetch a snapshot now. Also reopens a `Failed` push channel.
    ///
    /// Returns `Ok(false)` when a fetch was already in flight.
    pub async fn refresh(&self) -> Result<bool, CoreError> {
        if self.inner.connection.state() == ConnectionState::Failed {
            self.reconnect().await?;
        }
        let fetched = self.inner.polling.refresh_now().await;
        self.publish_status();
        fetched
    }

    /// Reopen the push channel with a fresh retry budget and token.
    pub async fn reconnect(&self) -> Result<(), CoreError> {
        if !self.is_started().await {
            return Err(CoreError::NotStarted);
        }
        let token = self.token()?;
        self.inner
            .connection
            .reconnect_to(authorized_url(&self.inner.config.push_url, &token))
            .await;
        Ok(())
    }

    async fn is_started(&self) -> bool {
        self.inner
            .supervisor
            .lock()
            .await
            .as_ref()
            .is_some_and(|(_, task)| !task.is_finished())
    }

    /// Pause polling while the view is hidden.
    pub fn set_visibility(&self, visibility: Visibility) {
        self.inner.visibility.send_if_modified(|v| {
            let changed = *v != visibility;
            *v = visibility;
            changed
        });
    }

    // ── Reads ────────────────────────────────────────────────────────

    /// Records of `collection` that `viewer` may see, newest first.
    pub fn snapshot(&self, collection: Collection, viewer: &Viewer) -> Vec<Arc<Record>> {
        self.inner.router.reconciler(collection).visible_to(viewer)
    }

    pub fn alerts(&self) -> RecordStream {
        self.inner.router.reconciler(Collection::Alerts).stream()
    }

    pub fn devices(&self) -> RecordStream {
        self.inner.router.reconciler(Collection::Devices).stream()
    }

    /// Register a callback for a topic (`"*"` for everything).
    pub fn subscribe<F>(&self, topic: impl Into<Topic>, callback: F) -> Subscription
    where
        F: Fn(&SyncEvent) + Send + Sync + 'static,
    {
        self.inner.registry.subscribe(topic, callback)
    }

    pub fn status(&self) -> SyncStatus {
        let poll = self.inner.polling.state();
        let flags = self.flags();
        SyncStatus {
            connection: self.inner.connection.state(),
            is_polling: poll.running,
            last_update: self.inner.router.last_update(),
            last_error: flags.last_error.clone().or(poll.last_error),
            auth_rejected: flags.auth_rejected,
            degraded: flags.degraded,
        }
    }

    /// Subscribe to status changes. Updated by the supervisor while running.
    pub fn watch_status(&self) -> watch::Receiver<SyncStatus> {
        self.inner.status.subscribe()
    }

    fn publish_status(&self) {
        let next = self.status();
        self.inner.status.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }

    // ── One-shot convenience ─────────────────────────────────────────

    /// One-shot: fetch one snapshot, run closure, stop.
    ///
    /// Disables push and interval polling since only a single fetch is
    /// needed.
    pub async fn oneshot<F, Fut, T>(
        config: SyncConfig,
        session: Arc<dyn SessionProvider>,
        f: F,
    ) -> Result<T, CoreError>
    where
        F: FnOnce(SyncFacade) -> Fut,
        Fut: std::future::Future<Output = Result<T, CoreError>>,
    {
        let mut cfg = config;
        cfg.push_enabled = false;
        cfg.polling_enabled = false;

        let facade = SyncFacade::new(cfg, session)?;
        facade.refresh().await?;
        let result = f(facade.clone()).await;
        facade.stop().await;
        result
    }

    // ── Supervisor reactions ─────────────────────────────────────────

    async fn on_connection_state(&self, state: ConnectionState) {
        match state {
            ConnectionState::Failed => {
                let warm = {
                    let mut flags = self.flags();
                    flags.degraded = true;
                    flags.last_error = Some(format!(
                        "push channel gave up after {} reconnect attempts",
                        self.inner.config.retry.max_attempts
                    ));
                    flags.push_was_live
                };
                if self.inner.polling.is_running() {
                    warn!("push channel failed; polling already running");
                } else if warm {
                    warn!("push channel failed; falling back to polling");
                    self.inner.polling.start_warm(self.poll_interval()).await;
                } else {
                    warn!("push channel failed before connecting; falling back to polling");
                    self.inner.polling.start(self.poll_interval(), true).await;
                }
            }
            ConnectionState::Connected => {
                let stop_fallback = {
                    let mut flags = self.flags();
                    let was_degraded = std::mem::take(&mut flags.degraded);
                    flags.last_error = None;
                    flags.push_was_live = true;
                    was_degraded && !flags.explicit_polling
                };
                self.inner.router.mark_live(Utc::now());
                if stop_fallback {
                    info!("push channel restored; stopping fallback polling");
                    self.inner.polling.stop().await;
                }
            }
            _ => {}
        }
    }

    async fn on_auth_rejected(&self, origin: &str, message: &str) {
        error!(origin, message, "session rejected; stopping sync");
        {
            let mut flags = self.flags();
            flags.auth_rejected = true;
            flags.degraded = false;
            flags.last_error = Some(message.to_owned());
        }
        let _lifecycle = self.inner.lifecycle.lock().await;
        self.halt().await;
        self.inner.session.on_auth_rejected(message);
    }
}

// ── Supervisor task ──────────────────────────────────────────────────

async fn supervisor_task(
    facade: SyncFacade,
    mut signals: broadcast::Receiver<Signal>,
    cancel: CancellationToken,
) {
    let mut connection = facade.inner.connection.watch_state();
    let mut polling = facade.inner.polling.watch_state();
    let mut updates = facade.inner.router.watch_last_update();

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            signal = signals.recv() => match signal {
                Ok(Signal::AuthRejected { origin, message }) => {
                    facade.on_auth_rejected(origin, &message).await;
                    facade.publish_status();
                    break;
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "supervisor lagged on signals"),
                Err(RecvError::Closed) => break,
            },
            changed = connection.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *connection.borrow_and_update();
                debug!(%state, "push channel state");
                facade.on_connection_state(state).await;
            }
            changed = polling.changed() => {
                if changed.is_err() {
                    break;
                }
                polling.borrow_and_update();
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                updates.borrow_and_update();
            }
        }
        facade.publish_status();
    }

    debug!("supervisor exiting");
}
