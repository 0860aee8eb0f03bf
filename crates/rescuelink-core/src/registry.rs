// ── Topic-keyed subscription registry ──
//
// Callbacks register for one topic or for every topic (`*`). Dispatch is
// synchronous on the publishing thread: exact-topic subscribers first,
// then wildcard subscribers, each group in registration order. A
// panicking callback is logged and skipped; later callbacks still run.
//
// The entry list is snapshotted before dispatch, so callbacks may
// subscribe or unsubscribe (even themselves) without deadlocking.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::{error, trace};

use crate::event::topics;

/// What a subscription listens to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    Exact(String),
    Any,
}

impl From<&str> for Topic {
    fn from(topic: &str) -> Self {
        if topic == topics::WILDCARD {
            Self::Any
        } else {
            Self::Exact(topic.to_owned())
        }
    }
}

impl From<String> for Topic {
    fn from(topic: String) -> Self {
        if topic == topics::WILDCARD {
            Self::Any
        } else {
            Self::Exact(topic)
        }
    }
}

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Entry<T> {
    id: u64,
    topic: Topic,
    callback: Callback<T>,
}

struct RegistryInner<T> {
    next_id: AtomicU64,
    entries: Mutex<Vec<Entry<T>>>,
}

impl<T> RegistryInner<T> {
    fn entries(&self) -> MutexGuard<'_, Vec<Entry<T>>> {
        // Callbacks never run under this lock, so poisoning cannot leave
        // the list half-updated.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Detaches one entry. Object-safe so `Subscription` needs no type parameter.
trait Detach: Send + Sync {
    fn detach(&self, id: u64);
}

impl<T: 'static> Detach for RegistryInner<T> {
    fn detach(&self, id: u64) {
        self.entries().retain(|e| e.id != id);
    }
}

// ── SubscriptionRegistry ────────────────────────────────────────────

/// Publish/subscribe hub. Cloning shares the same subscriber list.
pub struct SubscriptionRegistry<T> {
    inner: Arc<RegistryInner<T>>,
}

impl<T> Clone for SubscriptionRegistry<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: 'static> Default for SubscriptionRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> SubscriptionRegistry<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                next_id: AtomicU64::new(1),
                entries: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Register `callback` for `topic` (`"*"` for every topic).
    ///
    /// The callback stays registered until the returned handle is
    /// dropped or [`Subscription::unsubscribe`] is called.
    pub fn subscribe<F>(&self, topic: impl Into<Topic>, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
        T: Send + Sync,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let topic = topic.into();
        trace!(id, ?topic, "subscribe");
        self.inner.entries().push(Entry {
            id,
            topic,
            callback: Arc::new(callback),
        });

        let registry: Weak<dyn Detach> = Arc::downgrade(&self.inner) as Weak<dyn Detach>;
        Subscription {
            id,
            registry,
            released: AtomicBool::new(false),
        }
    }

    /// Deliver `payload` to subscribers of `topic` and to wildcard
    /// subscribers. Returns how many callbacks ran without panicking.
    pub fn publish(&self, topic: &str, payload: &T) -> usize {
        let targets: Vec<Callback<T>> = {
            let entries = self.inner.entries();
            let exact = entries
                .iter()
                .filter(|e| matches!(&e.topic, Topic::Exact(t) if t == topic));
            let wildcard = entries.iter().filter(|e| e.topic == Topic::Any);
            exact.chain(wildcard).map(|e| Arc::clone(&e.callback)).collect()
        };
        dispatch(topic, &targets, payload)
    }

    /// Deliver `payload` to wildcard subscribers only.
    ///
    /// Used for frames whose type has no dedicated topic.
    pub fn publish_wildcard(&self, topic: &str, payload: &T) -> usize {
        let targets: Vec<Callback<T>> = self
            .inner
            .entries()
            .iter()
            .filter(|e| e.topic == Topic::Any)
            .map(|e| Arc::clone(&e.callback))
            .collect();
        dispatch(topic, &targets, payload)
    }

    /// Number of live subscriptions.
    pub fn len(&self) -> usize {
        self.inner.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn dispatch<T>(topic: &str, targets: &[Callback<T>], payload: &T) -> usize {
    let mut delivered = 0;
    for callback in targets {
        match panic::catch_unwind(AssertUnwindSafe(|| callback(payload))) {
            Ok(()) => delivered += 1,
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_owned())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "non-string panic payload".into());
                error!(topic, reason = %reason, "subscriber panicked; continuing");
            }
        }
    }
    delivered
}

// ── Subscription ────────────────────────────────────────────────────

/// Handle for one registered callback. Dropping it unsubscribes.
///
/// Unsubscribing is idempotent and safe after the registry is gone.
pub struct Subscription {
    id: u64,
    registry: Weak<dyn Detach>,
    released: AtomicBool,
}

impl Subscription {
    pub fn unsubscribe(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(registry) = self.registry.upgrade() {
            registry.detach(self.id);
            trace!(id = self.id, "unsubscribe");
        }
    }

    pub fn is_active(&self) -> bool {
        !self.released.load(Ordering::Acquire) && self.registry.strong_count() > 0
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

// ── Tests ────────────────────────────────────────────────────────────
