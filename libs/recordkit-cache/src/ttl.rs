use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry as MapEntry;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::FetchError;

type SharedFetch<T> = Shared<BoxFuture<'static, Result<T, FetchError>>>;

struct Slot<T> {
    value: T,
    last_access: Instant,
}

struct InFlight<T> {
    id: u64,
    fetch: SharedFetch<T>,
}

struct Inner<T> {
    ttl: Duration,
    values: DashMap<String, Slot<T>>,
    in_flight: DashMap<String, InFlight<T>>,
    next_fetch_id: AtomicU64,
}

impl<T> Inner<T> {
    fn is_live(&self, slot: &Slot<T>, now: Instant) -> bool {
        now.saturating_duration_since(slot.last_access) < self.ttl
    }
}

/// String-keyed cache with a sliding TTL and single-flight fetches.
///
/// Cloning is cheap; clones share state. Expired values are evicted when
/// read, by [`TtlCache::purge_expired`], or by a sweeper task.
///
/// # Example
///
/// ```
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), recordkit_cache::FetchError> {
/// use std::time::Duration;
/// use recordkit_cache::TtlCache;
///
/// let roles: TtlCache<String> = TtlCache::new(Duration::from_secs(60));
/// let role = roles
///     .first_get_then_fetch("r-1", || async { Ok("admin".to_owned()) })
///     .await?;
/// assert_eq!(role, "admin");
/// assert_eq!(roles.get("r-1").as_deref(), Some("admin"));
/// # Ok(())
/// # }
/// ```
pub struct TtlCache<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for TtlCache<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> std::fmt::Debug for TtlCache<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlCache")
            .field("ttl", &self.inner.ttl)
            .field("len", &self.inner.values.len())
            .field("in_flight", &self.inner.in_flight.len())
            .finish_non_exhaustive()
    }
}

impl<T> TtlCache<T>
where
    T: Clone + Send + Sync + 'static,
{
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                ttl,
                values: DashMap::new(),
                in_flight: DashMap::new(),
                next_fetch_id: AtomicU64::new(0),
            }),
        }
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.inner.ttl
    }

    /// Store `value`, restarting its expiry.
    pub fn set(&self, key: impl Into<String>, value: T) {
        self.inner.values.insert(
            key.into(),
            Slot {
                value,
                last_access: Instant::now(),
            },
        );
    }

    /// The live value for `key`. A hit restarts the expiry; an expired
    /// value is evicted.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<T> {
        let now = Instant::now();
        {
            let mut slot = self.inner.values.get_mut(key)?;
            if self.inner.is_live(&slot, now) {
                slot.last_access = now;
                return Some(slot.value.clone());
            }
        }
        self.inner
            .values
            .remove_if(key, |_, slot| !self.inner.is_live(slot, now));
        None
    }

    /// Remove `key`, returning the stored value even if expired.
    pub fn delete(&self, key: &str) -> Option<T> {
        self.inner.values.remove(key).map(|(_, slot)| slot.value)
    }

    /// Number of stored values, including expired ones not yet evicted.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.values.is_empty()
    }

    /// Evict every expired value. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.inner.values.len();
        self.inner
            .values
            .retain(|_, slot| self.inner.is_live(slot, now));
        before.saturating_sub(self.inner.values.len())
    }

    /// Run [`TtlCache::purge_expired`] every `interval` until `cancel` fires.
    #[must_use = "dropping the handle detaches the sweeper; keep it to await shutdown"]
    pub fn spawn_sweeper(&self, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let evicted = cache.purge_expired();
                        if evicted > 0 {
                            tracing::trace!(evicted, "cache sweeper evicted expired values");
                        }
                    }
                }
            }
            tracing::debug!("cache sweeper stopped");
        })
    }

    /// Cached value, else join the in-flight fetch, else start one.
    ///
    /// A successful fetch is cached before the in-flight registration is
    /// cleared. Failures reach every waiting caller and nothing is cached.
    ///
    /// # Errors
    /// [`FetchError`] wrapping the fetch function's error.
    pub async fn first_get_then_fetch<F, Fut>(&self, key: &str, fetch: F) -> Result<T, FetchError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }
        self.join_or_start(key, fetch, true).await
    }

    /// Stale-while-revalidate read.
    ///
    /// - fetch in flight: the cached value if present, else wait for the fetch;
    /// - cached: return it and refresh in the background;
    /// - cold: behave like [`TtlCache::first_get_then_fetch`].
    ///
    /// # Errors
    /// [`FetchError`] when no cached value exists and the fetch fails.
    pub async fn first_fetch_then_refresh<F, Fut>(
        &self,
        key: &str,
        fetch: F,
    ) -> Result<T, FetchError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let pending = self
            .inner
            .in_flight
            .get(key)
            .map(|in_flight| in_flight.fetch.clone());
        if let Some(pending) = pending {
            if let Some(value) = self.get(key) {
                return Ok(value);
            }
            return pending.await;
        }

        if let Some(value) = self.get(key) {
            // The refresh task owns its result; dropping the handle does not cancel it.
            drop(self.join_or_start(key, fetch, false));
            return Ok(value);
        }
        self.join_or_start(key, fetch, true).await
    }

    /// Join the in-flight fetch for `key` or start one.
    ///
    /// With `reuse_cached`, a value stored while the caller was between its
    /// miss and this call is returned instead of fetching again. A finished
    /// fetch stores its value before leaving `in_flight`, so the check under
    /// the vacant entry guard cannot miss it.
    fn join_or_start<F, Fut>(&self, key: &str, fetch: F, reuse_cached: bool) -> SharedFetch<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        if let Some(in_flight) = self.inner.in_flight.get(key) {
            return in_flight.fetch.clone();
        }

        // Build the future outside the map lock; it is inert until spawned.
        let work = fetch();
        match self.inner.in_flight.entry(key.to_owned()) {
            MapEntry::Occupied(existing) => existing.get().fetch.clone(),
            MapEntry::Vacant(slot) => {
                if reuse_cached && let Some(value) = self.get(key) {
                    return futures::future::ready(Ok(value)).boxed().shared();
                }
                let id = self.inner.next_fetch_id.fetch_add(1, Ordering::Relaxed);
                let shared = self.spawn_fetch(key.to_owned(), id, work);
                slot.insert(InFlight {
                    id,
                    fetch: shared.clone(),
                });
                shared
            }
        }
    }

    fn spawn_fetch<Fut>(&self, key: String, id: u64, work: Fut) -> SharedFetch<T>
    where
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        let task_key = key.clone();
        let handle = tokio::spawn(async move {
            let result = work.await;
            let outcome = match result {
                Ok(value) => {
                    inner.values.insert(
                        task_key.clone(),
                        Slot {
                            value: value.clone(),
                            last_access: Instant::now(),
                        },
                    );
                    Ok(value)
                }
                Err(cause) => {
                    tracing::warn!(cache_key = %task_key, error = %cause, "cache fetch failed");
                    Err(FetchError::new(task_key.clone(), cause))
                }
            };
            inner.in_flight.remove_if(&task_key, |_, f| f.id == id);
            outcome
        });

        async move {
            match handle.await {
                Ok(outcome) => outcome,
                Err(join_error) => Err(FetchError::new(
                    key,
                    anyhow::anyhow!("fetch task did not complete: {join_error}"),
                )),
            }
        }
        .boxed()
        .shared()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test(start_paused = true)]
    async fn reads_slide_the_expiry() {
        let cache = TtlCache::new(Duration::from_secs(10));
        cache.set("k", 1);

        tokio::time::advance(Duration::from_secs(8)).await;
        assert_eq!(cache.get("k"), Some(1));

        tokio::time::advance(Duration::from_secs(8)).await;
        assert_eq!(cache.get("k"), Some(1));

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(cache.get("k"), None);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn set_restarts_expiry_and_delete_removes() {
        let cache = TtlCache::new(Duration::from_secs(5));
        cache.set("k", "a");
        tokio::time::advance(Duration::from_secs(4)).await;
        cache.set("k", "b");
        tokio::time::advance(Duration::from_secs(4)).await;

        assert_eq!(cache.get("k"), Some("b"));
        assert_eq!(cache.delete("k"), Some("b"));
        assert_eq!(cache.get("k"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn purge_evicts_only_expired() {
        let cache = TtlCache::new(Duration::from_secs(5));
        cache.set("old", 1);
        tokio::time::advance(Duration::from_secs(3)).await;
        cache.set("new", 2);
        tokio::time::advance(Duration::from_secs(3)).await;

        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("new"), Some(2));
    }

    #[tokio::test]
    async fn failed_fetch_is_not_cached() {
        let cache: TtlCache<u32> = TtlCache::new(Duration::from_secs(5));
        let err = cache
            .first_get_then_fetch("k", || async { Err(anyhow::anyhow!("boom")) })
            .await
            .unwrap_err();

        assert_eq!(err.key(), "k");
        assert!(cache.get("k").is_none());

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let value = cache
            .first_get_then_fetch("k", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(7)
            })
            .await
            .unwrap();
        assert_eq!(value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn value_stored_after_a_miss_is_reused_instead_of_refetched() {
        let cache: TtlCache<u32> = TtlCache::new(Duration::from_secs(5));
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        // A fetch finishing between the caller's miss and its registration.
        cache.set("k", 3);
        let value = cache
            .join_or_start(
                "k",
                move || async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(9)
                },
                true,
            )
            .await
            .unwrap();

        assert_eq!(value, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(cache.inner.in_flight.is_empty());
    }
}
