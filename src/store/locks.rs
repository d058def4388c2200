//! Named async lock registry.
//!
//! Grounded on the teacher's per-domain `Arc<RwLock<HashMap<String, DomainState>>>`
//! registry in `scrapers::rate_limiter`, generalized from "one entry per
//! domain" to "one entry per arbitrary lock name" and from a rate-limit
//! state machine to a plain mutual-exclusion lock. `tokio::sync::Mutex`
//! queues waiters in arrival order, which gives each name's lock the FIFO
//! fairness spec.md 4.1/4.4 require (`crawl:<origin>`, `crawler:<dataset>:<origin>`).

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard, OwnedMutexGuard};

/// A held named lock. Dropping it releases the lock and, if no other
/// locker is currently waiting, allows the registry to reap the entry.
pub struct LockGuard {
    _guard: OwnedMutexGuard<()>,
}

#[derive(Clone, Default)]
pub struct LockRegistry {
    locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the named lock, waiting in FIFO order behind any other
    /// holder/waiter of the same name.
    pub async fn lock(&self, name: &str) -> LockGuard {
        let entry = {
            let mut locks: MutexGuard<'_, HashMap<String, Arc<Mutex<()>>>> =
                self.locks.lock().await;
            locks.entry(name.to_string()).or_default().clone()
        };
        let guard = entry.clone().lock_owned().await;
        self.reap(name, &entry).await;
        LockGuard { _guard: guard }
    }

    /// Drop the registry entry for `name` if nobody else is currently
    /// waiting/holding it, so the map doesn't grow unbounded across the
    /// lifetime of a long-running process.
    async fn reap(&self, name: &str, entry: &Arc<Mutex<()>>) {
        // strong_count of 2 means: the local `entry` clone here, plus the
        // one stored in the map — i.e. no other waiter holds a clone.
        if Arc::strong_count(entry) <= 2 {
            let mut locks = self.locks.lock().await;
            if let Some(current) = locks.get(name) {
                if Arc::ptr_eq(current, entry) && Arc::strong_count(current) <= 2 {
                    locks.remove(name);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn serializes_same_name() {
        let registry = LockRegistry::new();
        let counter = Arc::new(AtomicU32::new(0));
        let max_seen = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let registry = registry.clone();
            let counter = counter.clone();
            let max_seen = max_seen.clone();
            handles.push(tokio::spawn(async move {
                let _guard = registry.lock("crawl:dat://a").await;
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(n, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                counter.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn distinct_names_do_not_contend() {
        let registry = LockRegistry::new();
        let a = registry.lock("crawl:dat://a").await;
        let b = tokio::time::timeout(Duration::from_millis(50), registry.lock("crawl:dat://b"))
            .await
            .expect("distinct lock names must not block on each other");
        drop(a);
        drop(b);
    }
}
