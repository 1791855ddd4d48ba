//! Deduplicating reactive cache

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared, WeakShared};
use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::{broadcast, Mutex};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, warn};

use super::{LifecycleBus, LifecycleEvent, LifecycleListener, RefreshPolicy};
use crate::error::CacheError;

/// Ids are global so a completion can never be mistaken for a later fetch
static NEXT_FETCH_ID: AtomicU64 = AtomicU64::new(1);

type Fetcher<K, V, E> = Arc<dyn Fn(K) -> BoxFuture<'static, Result<V, E>> + Send + Sync>;
type FetchFuture<V, E> = BoxFuture<'static, Result<V, CacheError<E>>>;

struct StoredValue<V, E> {
    result: Result<V, CacheError<E>>,
    fetched_at: Instant,
    version: u64,
}

struct InFlight<V, E> {
    id: u64,
    fetch: WeakShared<FetchFuture<V, E>>,
}

struct CacheEntry<V, E> {
    value: Option<StoredValue<V, E>>,
    in_flight: Option<InFlight<V, E>>,
}

impl<V, E> Default for CacheEntry<V, E> {
    fn default() -> Self {
        Self {
            value: None,
            in_flight: None,
        }
    }
}

#[derive(Debug, Clone)]
enum CacheUpdate<K> {
    Stored(K),
    /// `None` means every key
    Invalidated(Option<K>),
}

struct Inner<K, V, E> {
    entries: Mutex<HashMap<K, CacheEntry<V, E>>>,
    fetcher: Fetcher<K, V, E>,
    policy: RefreshPolicy,
    updates: broadcast::Sender<CacheUpdate<K>>,
    next_version: AtomicU64,
}

impl<K, V, E> Inner<K, V, E>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    async fn complete(&self, key: K, id: u64, result: Result<V, CacheError<E>>) {
        let mut entries = self.entries.lock().await;
        let Some(entry) = entries.get_mut(&key) else {
            debug!("Discarding fetch {} for an invalidated key", id);
            return;
        };
        if entry.in_flight.as_ref().map(|f| f.id) != Some(id) {
            debug!("Discarding superseded fetch {}", id);
            return;
        }

        entry.in_flight = None;
        entry.value = Some(StoredValue {
            result,
            fetched_at: Instant::now(),
            version: self.next_version.fetch_add(1, Ordering::Relaxed),
        });
        drop(entries);

        let _ = self.updates.send(CacheUpdate::Stored(key));
    }

    async fn clear(&self) {
        self.entries.lock().await.clear();
        let _ = self.updates.send(CacheUpdate::Invalidated(None));
    }
}

#[async_trait]
impl<K, V, E> LifecycleListener for Inner<K, V, E>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    async fn on_lifecycle_event(&self, event: LifecycleEvent) {
        if self.policy.flushes_on(event) {
            debug!("Flushing scoped cache on {:?}", event);
            self.clear().await;
        }
    }
}

/// Snapshot of a stored value
struct Snapshot<V, E> {
    result: Result<V, CacheError<E>>,
    fetched_at: Instant,
    version: u64,
}

/// A key-keyed cache with at most one in-flight fetch per key.
///
/// Concurrent `get`s for a missing or stale key share a single fetch. The
/// cache only keeps a weak handle to that fetch: once every waiter has been
/// dropped the fetch is cancelled and the next `get` starts a new one.
/// Failures are stored like values and replayed until the policy refreshes
/// them.
pub struct ReactiveCache<K, V, E> {
    inner: Arc<Inner<K, V, E>>,
}

impl<K, V, E> Clone for ReactiveCache<K, V, E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<K, V, E> ReactiveCache<K, V, E>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Create a cache. A `Scoped` policy created this way is only flushed by
    /// explicit invalidation; use `with_lifecycle` to bind it to a bus.
    pub fn new<F, Fut>(policy: RefreshPolicy, fetcher: F) -> Self
    where
        F: Fn(K) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        if matches!(policy, RefreshPolicy::Scoped(_)) {
            warn!("Scoped cache created without a lifecycle bus");
        }
        Self::build(policy, fetcher)
    }

    /// Create a cache whose scoped policy is flushed by events on `bus`.
    /// The flush has completed by the time `LifecycleBus::publish` returns.
    pub fn with_lifecycle<F, Fut>(policy: RefreshPolicy, bus: &LifecycleBus, fetcher: F) -> Self
    where
        F: Fn(K) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let cache = Self::build(policy, fetcher);
        if matches!(cache.inner.policy, RefreshPolicy::Scoped(_)) {
            let listener: Arc<dyn LifecycleListener> = cache.inner.clone();
            bus.register(Arc::downgrade(&listener));
        }
        cache
    }

    fn build<F, Fut>(policy: RefreshPolicy, fetcher: F) -> Self
    where
        F: Fn(K) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let (updates, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(Inner {
                entries: Mutex::new(HashMap::new()),
                fetcher: Arc::new(move |key: K| fetcher(key).boxed()),
                policy,
                updates,
                next_version: AtomicU64::new(1),
            }),
        }
    }

    pub fn policy(&self) -> &RefreshPolicy {
        &self.inner.policy
    }

    /// Fresh cached value, or the result of a single shared fetch
    pub async fn get(&self, key: K) -> Result<V, CacheError<E>> {
        self.get_with(key, false).await
    }

    /// Like `get`; `force_fetch` ignores the stored value but still joins a
    /// fetch that is already in flight.
    pub async fn get_with(&self, key: K, force_fetch: bool) -> Result<V, CacheError<E>> {
        let fetch = {
            let mut entries = self.inner.entries.lock().await;
            let entry = entries.entry(key.clone()).or_default();

            if !force_fetch {
                if let Some(stored) = &entry.value {
                    if !self.inner.policy.is_stale(stored.fetched_at) {
                        debug!("Cache hit (version {})", stored.version);
                        return stored.result.clone();
                    }
                }
            }

            match entry.in_flight.as_ref().and_then(|f| f.fetch.upgrade()) {
                Some(fetch) => {
                    debug!("Joining in-flight fetch");
                    fetch
                }
                None => {
                    let id = NEXT_FETCH_ID.fetch_add(1, Ordering::Relaxed);
                    debug!("Cache miss, starting fetch {}", id);
                    let fetch = self.start_fetch(key, id);
                    entry.in_flight = fetch.downgrade().map(|weak| InFlight { id, fetch: weak });
                    fetch
                }
            }
        };

        fetch.await
    }

    fn start_fetch(&self, key: K, id: u64) -> Shared<FetchFuture<V, E>> {
        let fetcher = self.inner.fetcher.clone();
        let inner = Arc::downgrade(&self.inner);

        async move {
            let result = fetcher(key.clone()).await.map_err(CacheError::Fetch);
            if let Some(inner) = inner.upgrade() {
                inner.complete(key, id, result.clone()).await;
            }
            result
        }
        .boxed()
        .shared()
    }

    /// Drop the stored value and in-flight tracking for `key`
    pub async fn invalidate(&self, key: &K) {
        self.inner.entries.lock().await.remove(key);
        let _ = self.inner.updates.send(CacheUpdate::Invalidated(Some(key.clone())));
    }

    pub async fn invalidate_all(&self) {
        self.inner.clear().await;
    }

    /// The stored result for `key` regardless of staleness, without fetching
    pub async fn peek(&self, key: &K) -> Option<Result<V, CacheError<E>>> {
        self.snapshot(key).await.map(|s| s.result)
    }

    async fn snapshot(&self, key: &K) -> Option<Snapshot<V, E>> {
        let entries = self.inner.entries.lock().await;
        entries.get(key).and_then(|entry| entry.value.as_ref()).map(|stored| Snapshot {
            result: stored.result.clone(),
            fetched_at: stored.fetched_at,
            version: stored.version,
        })
    }

    /// Emits the current value for `key`, then again whenever a new value is
    /// stored, the key is invalidated, or the periodic window elapses.
    pub fn stream(&self, key: K) -> BoxStream<'static, Result<V, CacheError<E>>> {
        let state = StreamState {
            cache: self.clone(),
            updates: self.inner.updates.subscribe(),
            key,
            last_version: None,
            started: false,
        };

        stream::unfold(state, |mut state| async move {
            if !state.started {
                state.started = true;
                let result = state.refresh().await;
                return Some((result, state));
            }

            loop {
                let deadline = match state.cache.inner.policy.interval() {
                    Some(interval) => state.cache.snapshot(&state.key).await.map(|s| s.fetched_at + interval),
                    None => None,
                };

                tokio::select! {
                    update = state.updates.recv() => match update {
                        Ok(CacheUpdate::Stored(key)) if key == state.key => {
                            if let Some(snapshot) = state.cache.snapshot(&state.key).await {
                                if state.last_version != Some(snapshot.version) {
                                    state.last_version = Some(snapshot.version);
                                    return Some((snapshot.result, state));
                                }
                            }
                        }
                        Ok(CacheUpdate::Invalidated(scope)) if scope.as_ref().map_or(true, |k| *k == state.key) => {
                            let result = state.refresh().await;
                            return Some((result, state));
                        }
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(_)) => {
                            let result = state.refresh().await;
                            return Some((result, state));
                        }
                        Err(broadcast::error::RecvError::Closed) => return None,
                    },
                    _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                        let result = state.refresh().await;
                        return Some((result, state));
                    }
                }
            }
        })
        .boxed()
    }
}

struct StreamState<K, V, E> {
    cache: ReactiveCache<K, V, E>,
    updates: broadcast::Receiver<CacheUpdate<K>>,
    key: K,
    last_version: Option<u64>,
    started: bool,
}

impl<K, V, E> StreamState<K, V, E>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    async fn refresh(&mut self) -> Result<V, CacheError<E>> {
        let result = self.cache.get(self.key.clone()).await;
        if let Some(snapshot) = self.cache.snapshot(&self.key).await {
            self.last_version = Some(snapshot.version);
        }
        result
    }
}
