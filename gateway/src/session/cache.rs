//! Per-session network cache.
//!
//! Each channel name maps to a slot that is filled at most once. Callers for
//! the same name wait on the slot while one of them resolves it; callers for
//! different names never wait on each other because the map lock is only held
//! to find or create a slot, never across a resolution.
//!
//! Resolutions and the final drain run on spawned tasks, so a caller that
//! stops waiting cannot strand half-opened connections: the work still ends
//! either cached, rolled back, or released.

use crate::error::{GatewayError, GatewayResult};
use async_trait::async_trait;
use futures::future::{join_all, BoxFuture, Shared};
use futures::FutureExt;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::OnceCell;
use tokio::task::JoinError;
use tracing::debug;

/// Releases the resources behind a cached value. Must tolerate repeat calls.
#[async_trait]
pub(crate) trait Release: Send + Sync {
    async fn release(&self);
}

type Slot<T> = Arc<OnceCell<Arc<T>>>;
type Drain = Shared<BoxFuture<'static, usize>>;

struct CacheState<T> {
    closed: bool,
    slots: HashMap<String, Slot<T>>,
    drain: Option<Drain>,
}

type SharedState<T> = Arc<Mutex<CacheState<T>>>;

pub(crate) struct NetworkCache<T> {
    state: SharedState<T>,
}

impl<T: Release + 'static> NetworkCache<T> {
    pub(crate) fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(CacheState {
                closed: false,
                slots: HashMap::new(),
                drain: None,
            })),
        }
    }

    /// Returns the cached value for `name`, running `resolve` if the slot is
    /// still empty. A failed resolution leaves no entry behind.
    pub(crate) async fn get_or_resolve<F, Fut>(
        &self,
        name: &str,
        resolve: F,
    ) -> GatewayResult<Arc<T>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = GatewayResult<T>> + Send + 'static,
    {
        let slot = {
            let mut state = lock(&self.state);
            if state.closed {
                return Err(GatewayError::Closed);
            }
            Arc::clone(state.slots.entry(name.to_string()).or_default())
        };
        if let Some(value) = slot.get() {
            return Ok(Arc::clone(value));
        }

        let state = Arc::clone(&self.state);
        let name = name.to_string();
        let task = tokio::spawn(async move {
            let resolved = slot
                .get_or_try_init(|| async { resolve().await.map(Arc::new) })
                .await
                .cloned();

            let value = match resolved {
                Ok(value) => value,
                Err(err) => {
                    forget_if_unused(&state, &name, &slot);
                    return Err(err);
                }
            };

            // A close that started while we were resolving may have missed
            // this slot; the value must not outlive the cache.
            let closed = lock(&state).closed;
            if closed {
                debug!(name = name.as_str(), "resolved after close, releasing");
                value.release().await;
                return Err(GatewayError::Closed);
            }
            Ok(value)
        });

        task.await.unwrap_or_else(|err| Err(join_failure(err)))
    }

    /// Marks the cache closed and returns every resolved value, emptying it.
    pub(crate) fn close(&self) -> Vec<Arc<T>> {
        let mut state = lock(&self.state);
        take_resolved(&mut state)
    }

    /// Closes the cache and releases every resolved value exactly once.
    /// Concurrent and repeated callers all wait for the same drain and get
    /// the number of values it released.
    pub(crate) async fn drain_and_close(&self) -> usize {
        let drain = {
            let mut state = lock(&self.state);
            if let Some(drain) = state.drain.clone() {
                drain
            } else {
                let values = take_resolved(&mut state);
                let task = tokio::spawn(async move {
                    join_all(values.iter().map(|value| value.release())).await;
                    values.len()
                });
                let drain = async move { task.await.unwrap_or(0) }.boxed().shared();
                state.drain = Some(drain.clone());
                drain
            }
        };
        drain.await
    }

    pub(crate) fn is_closed(&self) -> bool {
        lock(&self.state).closed
    }

    /// Names whose slot currently holds a resolved value.
    pub(crate) fn names(&self) -> Vec<String> {
        let state = lock(&self.state);
        let mut names: Vec<String> = state
            .slots
            .iter()
            .filter(|(_, slot)| slot.initialized())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    #[cfg(test)]
    fn slot_count(&self) -> usize {
        lock(&self.state).slots.len()
    }
}

fn lock<T>(state: &Mutex<CacheState<T>>) -> MutexGuard<'_, CacheState<T>> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn take_resolved<T>(state: &mut CacheState<T>) -> Vec<Arc<T>> {
    state.closed = true;
    std::mem::take(&mut state.slots)
        .into_values()
        .filter_map(|slot| slot.get().cloned())
        .collect()
}

/// Drops an empty slot after a failed resolution unless another caller is
/// still waiting on it; that caller retries and cleans up after itself.
fn forget_if_unused<T>(state: &Mutex<CacheState<T>>, name: &str, slot: &Slot<T>) {
    let mut state = lock(state);
    let unused = match state.slots.get(name) {
        // One reference held by the map, one by this resolution.
        Some(current) => Arc::ptr_eq(current, slot) && Arc::strong_count(slot) == 2,
        None => false,
    };
    if unused && !slot.initialized() {
        state.slots.remove(name);
    }
}

fn join_failure(err: JoinError) -> GatewayError {
    if err.is_panic() {
        std::panic::resume_unwind(err.into_panic());
    }
    // Only a shutting-down runtime cancels the task.
    GatewayError::Closed
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::oneshot;

    #[derive(Debug, Default)]
    struct Tracked {
        releases: Arc<AtomicUsize>,
        release_delay: Duration,
    }

    impl Tracked {
        fn counted(releases: &Arc<AtomicUsize>) -> Self {
            Self {
                releases: Arc::clone(releases),
                release_delay: Duration::ZERO,
            }
        }
    }

    #[async_trait]
    impl Release for Tracked {
        async fn release(&self) {
            if !self.release_delay.is_zero() {
                tokio::time::sleep(self.release_delay).await;
            }
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn counting(
        resolutions: &Arc<AtomicUsize>,
    ) -> impl FnOnce() -> BoxFuture<'static, GatewayResult<Tracked>> {
        let resolutions = Arc::clone(resolutions);
        move || {
            async move {
                resolutions.fetch_add(1, Ordering::SeqCst);
                Ok(Tracked::default())
            }
            .boxed()
        }
    }

    #[tokio::test]
    async fn second_lookup_returns_same_instance_without_resolving() {
        let cache = NetworkCache::<Tracked>::new();
        let resolutions = Arc::new(AtomicUsize::new(0));

        let first = cache
            .get_or_resolve("mychannel", counting(&resolutions))
            .await
            .unwrap();
        let second = cache
            .get_or_resolve("mychannel", counting(&resolutions))
            .await
            .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(resolutions.load(Ordering::SeqCst), 1);
        assert_eq!(cache.names(), vec!["mychannel"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_lookups_resolve_once() {
        let cache = Arc::new(NetworkCache::<Tracked>::new());
        let resolutions = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..32)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let resolutions = Arc::clone(&resolutions);
                tokio::spawn(async move {
                    cache
                        .get_or_resolve("assumed", move || async move {
                            resolutions.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            Ok(Tracked::default())
                        })
                        .await
                        .unwrap()
                })
            })
            .collect();

        let mut values = Vec::new();
        for task in tasks {
            values.push(task.await.unwrap());
        }

        assert_eq!(resolutions.load(Ordering::SeqCst), 1);
        assert!(values.iter().all(|v| Arc::ptr_eq(v, &values[0])));
    }

    #[tokio::test]
    async fn pending_resolution_does_not_block_other_names() {
        let cache = Arc::new(NetworkCache::<Tracked>::new());
        let (started_tx, started_rx) = oneshot::channel();
        let (resume_tx, resume_rx) = oneshot::channel::<()>();

        let slow = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move {
                cache
                    .get_or_resolve("a", || async move {
                        let _ = started_tx.send(());
                        let _ = resume_rx.await;
                        Ok(Tracked::default())
                    })
                    .await
            })
        };
        started_rx.await.unwrap();

        let other = tokio::time::timeout(
            Duration::from_secs(1),
            cache.get_or_resolve("b", || async { Ok(Tracked::default()) }),
        )
        .await
        .expect("lookup of b waited on a")
        .unwrap();
        assert!(!slow.is_finished());
        assert_eq!(cache.names(), vec!["b"]);

        resume_tx.send(()).unwrap();
        let slow = slow.await.unwrap().unwrap();
        assert!(!Arc::ptr_eq(&slow, &other));
        assert_eq!(cache.names(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn failed_resolution_leaves_no_entry() {
        let cache = NetworkCache::<Tracked>::new();

        let err = cache
            .get_or_resolve("ghost", || async {
                Err(GatewayError::ChannelNotFound("ghost".into()))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::ChannelNotFound(_)));
        assert!(cache.names().is_empty());
        assert_eq!(cache.slot_count(), 0);

        let retried = cache
            .get_or_resolve("ghost", || async { Ok(Tracked::default()) })
            .await;
        assert!(retried.is_ok());
        assert_eq!(cache.names(), vec!["ghost"]);
        assert_eq!(cache.slot_count(), 1);
    }

    #[tokio::test]
    async fn unknown_names_do_not_accumulate() {
        let cache = NetworkCache::<Tracked>::new();
        for i in 0..200 {
            let name = format!("typo-{i}");
            let missing = name.clone();
            let result = cache
                .get_or_resolve(&name, move || async move {
                    Err(GatewayError::ChannelNotFound(missing))
                })
                .await;
            assert!(result.is_err());
        }
        assert_eq!(cache.slot_count(), 0);
    }

    #[tokio::test]
    async fn abandoned_lookup_still_caches_its_result() {
        let cache = NetworkCache::<Tracked>::new();
        let resolutions = Arc::new(AtomicUsize::new(0));
        let releases = Arc::new(AtomicUsize::new(0));

        let slow = {
            let resolutions = Arc::clone(&resolutions);
            let releases = Arc::clone(&releases);
            move || async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                resolutions.fetch_add(1, Ordering::SeqCst);
                Ok(Tracked::counted(&releases))
            }
        };
        let abandoned =
            tokio::time::timeout(Duration::from_millis(10), cache.get_or_resolve("slow", slow)).await;
        assert!(abandoned.is_err());

        // The next caller joins the resolution that is still running.
        let value = cache
            .get_or_resolve("slow", counting(&resolutions))
            .await
            .unwrap();
        assert_eq!(resolutions.load(Ordering::SeqCst), 1);

        assert_eq!(cache.drain_and_close().await, 1);
        assert_eq!(value.releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn drain_releases_each_value_once_and_closes() {
        let cache = NetworkCache::<Tracked>::new();
        let a = cache
            .get_or_resolve("a", || async { Ok(Tracked::default()) })
            .await
            .unwrap();
        let b = cache
            .get_or_resolve("b", || async { Ok(Tracked::default()) })
            .await
            .unwrap();

        assert_eq!(cache.drain_and_close().await, 2);
        assert_eq!(cache.drain_and_close().await, 2);

        assert_eq!(a.releases.load(Ordering::SeqCst), 1);
        assert_eq!(b.releases.load(Ordering::SeqCst), 1);
        assert!(cache.is_closed());
        assert!(cache.names().is_empty());

        let err = cache
            .get_or_resolve("a", || async { Ok(Tracked::default()) })
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Closed));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_drains_wait_for_the_same_release() {
        let cache = Arc::new(NetworkCache::<Tracked>::new());
        let releases = Arc::new(AtomicUsize::new(0));
        let value = {
            let releases = Arc::clone(&releases);
            cache
                .get_or_resolve("slow", move || async move {
                    Ok(Tracked {
                        releases,
                        release_delay: Duration::from_millis(100),
                    })
                })
                .await
                .unwrap()
        };

        let first = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.drain_and_close().await })
        };
        while !cache.is_closed() {
            tokio::task::yield_now().await;
        }

        assert_eq!(cache.drain_and_close().await, 1);
        assert_eq!(value.releases.load(Ordering::SeqCst), 1);
        assert_eq!(first.await.unwrap(), 1);
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn value_resolved_after_close_is_released() {
        let cache = Arc::new(NetworkCache::<Tracked>::new());
        let (started_tx, started_rx) = oneshot::channel();
        let (resume_tx, resume_rx) = oneshot::channel::<()>();
        let releases = Arc::new(AtomicUsize::new(0));

        let lookup = {
            let cache = Arc::clone(&cache);
            let releases = Arc::clone(&releases);
            tokio::spawn(async move {
                cache
                    .get_or_resolve("late", || async move {
                        let _ = started_tx.send(());
                        let _ = resume_rx.await;
                        Ok(Tracked::counted(&releases))
                    })
                    .await
            })
        };

        started_rx.await.unwrap();
        assert_eq!(cache.drain_and_close().await, 0);
        resume_tx.send(()).unwrap();

        let result = lookup.await.unwrap();
        assert!(matches!(result, Err(GatewayError::Closed)));
        assert_eq!(releases.load(Ordering::SeqCst), 1);
        assert!(cache.names().is_empty());
    }
}
