//! Request coalescer (C4, spec §4.4): concurrent callers with the same key
//! within the staleness window share one in-flight computation.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

type PendingFuture<T, E> = Shared<BoxFuture<'static, Result<T, Arc<E>>>>;

struct Pending<T, E> {
    future: PendingFuture<T, E>,
    started_at: DateTime<Utc>,
}

impl<T, E> Clone for Pending<T, E> {
    fn clone(&self) -> Self {
        Self { future: self.future.clone(), started_at: self.started_at }
    }
}

/// Deduplicates concurrent identical calls within `window` (default 100ms,
/// spec §4.4). Every inserted entry is removed once its future settles, or
/// once a caller observes it past its window — whichever comes first.
pub struct Coalescer<T, E> {
    window: Duration,
    pending: DashMap<String, Pending<T, E>>,
}

impl<T, E> Coalescer<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    pub fn new(window: Duration) -> Self {
        Self { window, pending: DashMap::new() }
    }

    /// Runs `f()` at most once per `(key, window)`. Every caller sharing an
    /// entry observes the same resolution — success or failure alike.
    pub async fn execute<F, Fut>(&self, key: &str, f: F) -> Result<T, Arc<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let now = Utc::now();

        let fresh = self.pending.get(key).and_then(|entry| {
            if now - entry.started_at < chrono::Duration::from_std(self.window).unwrap() {
                Some(entry.future.clone())
            } else {
                None
            }
        });
        if let Some(future) = fresh {
            return future.await;
        }

        let started_at = now;
        let shared: PendingFuture<T, E> = f().map(|r| r.map_err(Arc::new)).boxed().shared();
        self.pending.insert(key.to_string(), Pending { future: shared.clone(), started_at });

        let result = shared.await;

        // Only remove the entry we inserted: a later caller may already
        // have replaced it with a fresh one after the window lapsed.
        if let Some(entry) = self.pending.get(key) {
            if entry.started_at == started_at {
                drop(entry);
                self.pending.remove(key);
            }
        }

        result
    }
}
