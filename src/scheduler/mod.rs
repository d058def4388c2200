//! C5 Crawl Scheduler (spec.md 4.5): a 5-second ticker that recomputes a
//! priority-ordered candidate list from the Index Store every tick and
//! dispatches the next `N` targets to the Coordinator.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::archive::{ArchiveHandle, UserRegistry};
use crate::coordinator::Coordinator;
use crate::ingest::{follows, published_sites};
use crate::store::IndexStore;

const TICK_PERIOD: Duration = Duration::from_secs(5);
const TARGETS_PER_TICK: usize = 10;

/// Resolves a canonical origin to a loaded archive handle, on demand
/// (spec.md 4.5 step 4). Out of scope in production (archive
/// discovery/swarming, spec.md 1) — implementations plug in the real
/// archive daemon client.
#[async_trait]
pub trait ArchiveLoader: Send + Sync {
    async fn load(&self, origin: &str) -> Option<Arc<dyn ArchiveHandle>>;
}

/// Runs once the active user is identified (spec.md 4.5). Owns an
/// in-memory cursor into the deduplicated candidate list, wrapping once
/// past the end.
pub struct Scheduler {
    store: IndexStore,
    coordinator: Arc<Coordinator>,
    users: Arc<dyn UserRegistry>,
    loader: Arc<dyn ArchiveLoader>,
    cursor: Mutex<usize>,
}

impl Scheduler {
    pub fn new(
        store: IndexStore,
        coordinator: Arc<Coordinator>,
        users: Arc<dyn UserRegistry>,
        loader: Arc<dyn ArchiveLoader>,
    ) -> Self {
        Self {
            store,
            coordinator,
            users,
            loader,
            cursor: Mutex::new(0),
        }
    }

    /// Runs the ticker until the process is torn down. Spawn this once at
    /// startup (spec.md 4.5's "user-session ticker").
    pub async fn run(self: Arc<Self>) {
        let mut interval = tokio::time::interval(TICK_PERIOD);
        loop {
            interval.tick().await;
            if let Err(e) = self.tick().await {
                tracing::warn!(error = %e, "scheduler tick failed");
            }
        }
    }

    async fn tick(&self) -> crate::error::Result<()> {
        let Some(active_user) = self.users.active_user_origin().await else {
            return Ok(());
        };

        let candidates = self.priority_candidates(&active_user).await?;
        if candidates.is_empty() {
            return Ok(());
        }

        let mut cursor = self.cursor.lock().await;
        let start = *cursor % candidates.len();
        *cursor = (start + TARGETS_PER_TICK) % candidates.len();
        drop(cursor);

        let selected: Vec<&String> = candidates
            .iter()
            .cycle()
            .skip(start)
            .take(TARGETS_PER_TICK.min(candidates.len()))
            .collect();

        let mut handles = Vec::with_capacity(selected.len());
        for origin in selected {
            let origin = origin.clone();
            let loader = Arc::clone(&self.loader);
            let coordinator = Arc::clone(&self.coordinator);
            handles.push(tokio::spawn(async move {
                match loader.load(&origin).await {
                    Some(archive) => coordinator.crawl(archive.as_ref()).await,
                    None => tracing::warn!(origin, "scheduler: could not load archive for crawl target"),
                }
            }));
        }
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "scheduler: crawl target task panicked");
            }
        }

        Ok(())
    }

    /// Step 1-2 of spec.md 4.5: self, then direct follows, then published
    /// sites, then friends-of-friends, deduplicated in first-seen order.
    async fn priority_candidates(&self, active_user: &str) -> crate::error::Result<Vec<String>> {
        let mut seen = HashSet::new();
        let mut ordered = Vec::new();

        for origin in std::iter::once(active_user.to_string())
            .chain(follows::list_dests(&self.store, active_user).await?)
            .chain(published_sites::list_dests(&self.store, active_user).await?)
        {
            if seen.insert(origin.clone()) {
                ordered.push(origin);
            }
        }

        let direct_follows = follows::list_dests(&self.store, active_user).await?;
        for follow in &direct_follows {
            for dest in follows::list_dests(&self.store, follow).await? {
                if seen.insert(dest.clone()) {
                    ordered.push(dest);
                }
            }
        }

        Ok(ordered)
    }
}
