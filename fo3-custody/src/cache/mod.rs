//! Reactive caching infrastructure
//!
//! Provides a key-keyed in-memory cache that deduplicates concurrent fetches
//! and decides staleness through a pluggable refresh policy. Scoped policies
//! are flushed by application lifecycle events published on a `LifecycleBus`.

pub mod reactive;

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::debug;

pub use reactive::ReactiveCache;

/// Application lifecycle events that can flush scoped caches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEvent {
    Login,
    Logout,
    Transaction,
    KycStatusChanged,
    DashboardRefresh,
}

/// When a cached value stops being served
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshPolicy {
    /// Fresh until explicitly invalidated
    Perpetual,
    /// Stale once the interval has elapsed since the last fetch
    Periodic(Duration),
    /// Flushed whenever one of the events is published
    Scoped(Vec<LifecycleEvent>),
}

impl RefreshPolicy {
    pub fn on_login_logout() -> Self {
        Self::Scoped(vec![LifecycleEvent::Login, LifecycleEvent::Logout])
    }

    pub fn on_login_logout_transaction() -> Self {
        Self::Scoped(vec![
            LifecycleEvent::Login,
            LifecycleEvent::Logout,
            LifecycleEvent::Transaction,
        ])
    }

    /// Whether a value fetched at `fetched_at` must be refetched
    pub fn is_stale(&self, fetched_at: Instant) -> bool {
        match self {
            Self::Perpetual | Self::Scoped(_) => false,
            Self::Periodic(interval) => fetched_at.elapsed() >= *interval,
        }
    }

    pub fn interval(&self) -> Option<Duration> {
        match self {
            Self::Periodic(interval) => Some(*interval),
            _ => None,
        }
    }

    pub fn flushes_on(&self, event: LifecycleEvent) -> bool {
        match self {
            Self::Scoped(events) => events.contains(&event),
            _ => false,
        }
    }
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self::Perpetual
    }
}

/// Receives lifecycle events synchronously from `LifecycleBus::publish`
#[async_trait]
pub trait LifecycleListener: Send + Sync {
    async fn on_lifecycle_event(&self, event: LifecycleEvent);
}

type ListenerRegistry = Arc<Mutex<Vec<Weak<dyn LifecycleListener>>>>;

/// Delivers lifecycle events to registered scoped caches and to any
/// broadcast subscribers.
///
/// Registered listeners have finished handling an event by the time
/// `publish` returns. The bus holds them weakly, so dropping a cache
/// unregisters it.
#[derive(Clone)]
pub struct LifecycleBus {
    sender: broadcast::Sender<LifecycleEvent>,
    listeners: ListenerRegistry,
}

impl LifecycleBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            listeners: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn register(&self, listener: Weak<dyn LifecycleListener>) {
        self.registry().push(listener);
    }

    fn registry(&self) -> MutexGuard<'_, Vec<Weak<dyn LifecycleListener>>> {
        // The registry is only pushed to and pruned, so a poisoned guard is still consistent
        match self.listeners.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Deliver `event` to every live listener, then broadcast it. Returns how
    /// many registered listeners and subscribers received it.
    pub async fn publish(&self, event: LifecycleEvent) -> usize {
        let listeners: Vec<Arc<dyn LifecycleListener>> = {
            let mut registry = self.registry();
            registry.retain(|listener| listener.strong_count() > 0);
            registry.iter().filter_map(Weak::upgrade).collect()
        };
        for listener in &listeners {
            listener.on_lifecycle_event(event).await;
        }

        let subscribers = self.sender.send(event).unwrap_or(0);
        debug!(
            "Published {:?} to {} listener(s) and {} subscriber(s)",
            event,
            listeners.len(),
            subscribers
        );
        listeners.len() + subscribers
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.sender.subscribe()
    }
}

impl fmt::Debug for LifecycleBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleBus")
            .field("listeners", &self.registry().len())
            .field("subscribers", &self.sender.receiver_count())
            .finish()
    }
}

impl Default for LifecycleBus {
    fn default() -> Self {
        Self::new(64)
    }
}
