//! Shared query cache keyed by endpoint and parameters.
//!
//! Fresh entries are served from memory; concurrent reads of the same key
//! share one in-flight request; mutations invalidate by key or prefix.
//! [`RequestScope`] ties spawned requests to the lifetime of their owner.

use crate::common::error::ApiError;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::task::{AbortHandle, JoinHandle};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    endpoint: String,
    params: BTreeMap<String, String>,
}

impl QueryKey {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into().trim_matches('/').to_string(),
            params: BTreeMap::new(),
        }
    }

    pub fn param(mut self, name: &str, value: impl ToString) -> Self {
        self.params.insert(name.to_string(), value.to_string());
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.endpoint)?;
        for (i, (k, v)) in self.params.iter().enumerate() {
            write!(f, "{}{}={}", if i == 0 { '?' } else { '&' }, k, v)?;
        }
        Ok(())
    }
}

type SharedFetch = Shared<BoxFuture<'static, Result<serde_json::Value, ApiError>>>;

struct Entry {
    value: serde_json::Value,
    fetched_at: Instant,
}

struct InFlight {
    id: u64,
    epoch: u64,
    fetch: SharedFetch,
}

#[derive(Default)]
struct CacheInner {
    entries: HashMap<String, Entry>,
    in_flight: HashMap<String, InFlight>,
    next_id: u64,
    /// Bumped by every invalidation; fetches started before it are not stored.
    epoch: u64,
}

impl CacheInner {
    /// Inserts a fresh entry after dropping every expired one.
    fn store(&mut self, key: String, value: serde_json::Value, ttl: Duration) {
        let before = self.entries.len();
        self.entries.retain(|_, e| e.fetched_at.elapsed() < ttl);
        let evicted = before - self.entries.len();
        if evicted > 0 {
            log::trace!("[CACHE] evicted {} expired entries", evicted);
        }
        self.entries.insert(key, Entry { value, fetched_at: Instant::now() });
    }
}

#[derive(Clone)]
pub struct QueryCache {
    ttl: Duration,
    inner: Arc<Mutex<CacheInner>>,
}

fn decode<T: DeserializeOwned>(value: serde_json::Value) -> Result<T, ApiError> {
    serde_json::from_value(value).map_err(|e| ApiError::Decode(e.to_string()))
}

impl QueryCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: Arc::new(Mutex::new(CacheInner::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Returns the cached value for `key` if it is younger than the TTL,
    /// otherwise runs `fetch`, joining an identical request already in flight.
    pub async fn get_or_fetch<T, F, Fut>(&self, key: &QueryKey, fetch: F) -> Result<T, ApiError>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        let k = key.to_string();
        let (id, epoch, shared) = {
            let mut inner = self.lock();
            if let Some(entry) = inner.entries.get(&k) {
                if entry.fetched_at.elapsed() < self.ttl {
                    log::trace!("[CACHE] hit {}", k);
                    return decode(entry.value.clone());
                }
                inner.entries.remove(&k);
            }
            match inner.in_flight.get(&k) {
                Some(running) => {
                    log::trace!("[CACHE] joining in-flight {}", k);
                    (running.id, running.epoch, running.fetch.clone())
                }
                None => {
                    inner.next_id += 1;
                    let id = inner.next_id;
                    let epoch = inner.epoch;
                    let fut = fetch();
                    let shared = async move {
                        let value = fut.await?;
                        serde_json::to_value(value).map_err(|e| ApiError::Decode(e.to_string()))
                    }
                    .boxed()
                    .shared();
                    inner.in_flight.insert(k.clone(), InFlight { id, epoch, fetch: shared.clone() });
                    (id, epoch, shared)
                }
            }
        };

        let result = shared.await;

        {
            let mut inner = self.lock();
            if inner.in_flight.get(&k).map(|f| f.id) == Some(id) {
                inner.in_flight.remove(&k);
            }
            if let Ok(value) = &result {
                if inner.epoch == epoch {
                    inner.store(k, value.clone(), self.ttl);
                }
            }
        }

        decode(result?)
    }

    pub fn get<T: DeserializeOwned>(&self, key: &QueryKey) -> Option<T> {
        let k = key.to_string();
        let mut inner = self.lock();
        let entry = inner.entries.get(&k)?;
        if entry.fetched_at.elapsed() >= self.ttl {
            inner.entries.remove(&k);
            return None;
        }
        decode(entry.value.clone()).ok()
    }

    pub fn set<T: Serialize>(&self, key: &QueryKey, value: &T) {
        match serde_json::to_value(value) {
            Ok(value) => {
                self.lock().store(key.to_string(), value, self.ttl);
            }
            Err(e) => log::warn!("[CACHE] Could not store {}: {}", key, e),
        }
    }

    pub fn invalidate(&self, key: &QueryKey) {
        let k = key.to_string();
        let mut inner = self.lock();
        inner.epoch += 1;
        inner.entries.remove(&k);
        inner.in_flight.remove(&k);
    }

    /// Drops every entry whose endpoint starts with `prefix`.
    pub fn invalidate_prefix(&self, prefix: &str) {
        let prefix = prefix.trim_matches('/');
        let mut inner = self.lock();
        inner.epoch += 1;
        inner.entries.retain(|k, _| !k.starts_with(prefix));
        inner.in_flight.retain(|k, _| !k.starts_with(prefix));
        log::debug!("[CACHE] invalidated {}*", prefix);
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.epoch += 1;
        inner.entries.clear();
        inner.in_flight.clear();
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Owner-scoped requests. Dropping or cancelling the scope aborts every
/// request it spawned, so late responses never reach a discarded owner.
#[derive(Default)]
pub struct RequestScope {
    handles: Mutex<Vec<AbortHandle>>,
}

pub struct ScopedRequest<T> {
    handle: JoinHandle<Result<T, ApiError>>,
}

impl<T> ScopedRequest<T> {
    pub async fn join(self) -> Result<T, ApiError> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(ApiError::Cancelled),
            Err(e) => Err(ApiError::Transport(format!("request task failed: {}", e))),
        }
    }
}

impl RequestScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn<T, Fut>(&self, fut: Fut) -> ScopedRequest<T>
    where
        T: Send + 'static,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        let handle = tokio::spawn(fut);
        let mut handles = match self.handles.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        handles.retain(|h| !h.is_finished());
        handles.push(handle.abort_handle());
        ScopedRequest { handle }
    }

    pub fn cancel(&self) {
        let mut handles = match self.handles.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        for handle in handles.drain(..) {
            handle.abort();
        }
    }
}

impl Drop for RequestScope {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn keys_sort_their_params() {
        let a = QueryKey::new("/posts").param("sort", "newest").param("page", 2);
        let b = QueryKey::new("posts").param("page", 2).param("sort", "newest");
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "posts?page=2&sort=newest");
    }

    #[tokio::test]
    async fn fresh_values_are_served_from_memory() {
        let cache = QueryCache::new(Duration::from_secs(60));
        let calls = Arc::new(AtomicUsize::new(0));
        let key = QueryKey::new("likes/status/post/p1");

        for _ in 0..3 {
            let calls = calls.clone();
            let value: u32 = cache
                .get_or_fetch(&key, move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(7u32)
                })
                .await
                .unwrap();
            assert_eq!(value, 7);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_reads_share_one_request() {
        let cache = QueryCache::new(Duration::from_secs(60));
        let calls = Arc::new(AtomicUsize::new(0));
        let key = QueryKey::new("posts").param("page", 1);

        let fetch = |calls: Arc<AtomicUsize>| {
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(vec!["a".to_string()])
            }
        };
        let (a, b) = tokio::join!(
            cache.get_or_fetch::<Vec<String>, _, _>(&key, fetch(calls.clone())),
            cache.get_or_fetch::<Vec<String>, _, _>(&key, fetch(calls.clone())),
        );
        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let cache = QueryCache::new(Duration::from_secs(60));
        let key = QueryKey::new("posts/p1");
        let err = cache
            .get_or_fetch::<u32, _, _>(&key, || async { Err(ApiError::NotFound) })
            .await
            .unwrap_err();
        assert_eq!(err, ApiError::NotFound);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn invalidate_prefix_forces_refetch() {
        let cache = QueryCache::new(Duration::from_secs(60));
        cache.set(&QueryKey::new("saves/status/p1"), &true);
        cache.set(&QueryKey::new("saves/user"), &vec!["p1"]);
        cache.set(&QueryKey::new("posts/p1"), &1u32);

        cache.invalidate_prefix("saves/");
        assert!(cache.get::<bool>(&QueryKey::new("saves/status/p1")).is_none());
        assert_eq!(cache.get::<u32>(&QueryKey::new("posts/p1")), Some(1));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn expired_entries_are_evicted() {
        let cache = QueryCache::new(Duration::ZERO);
        cache.set(&QueryKey::new("posts/p1"), &1u32);
        cache.set(&QueryKey::new("posts/p2"), &2u32);
        assert_eq!(cache.len(), 1);

        assert_eq!(cache.get::<u32>(&QueryKey::new("posts/p2")), None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn dropping_a_scope_cancels_its_requests() {
        let scope = RequestScope::new();
        let request = scope.spawn(async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok::<_, ApiError>(1u32)
        });
        drop(scope);
        assert_eq!(request.join().await.unwrap_err(), ApiError::Cancelled);
    }
}
