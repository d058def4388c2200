//! C1 Crawl Coordinator (spec.md 4.1): owns the in-memory watch table
//! `origin -> debounced trigger`, serializes crawl sessions per archive via
//! the Index Store's named-lock registry, and fans out each crawl session
//! to every dataset ingester in parallel.

pub mod events;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::archive::{ArchiveEvent, ArchiveHandle, DnsStore};
use crate::error::Result;
use crate::ingest::{self, DatasetIngester};
use crate::store::{CrawlSourceState, IndexStore};
use events::{Event, EventBus};

const DEBOUNCE: Duration = Duration::from_secs(5);

struct WatchEntry {
    task: JoinHandle<()>,
}

/// Per-archive crawl lifecycle (spec.md 4.1). Cloned handles share the same
/// watch table, lock registry and event bus.
pub struct Coordinator {
    store: IndexStore,
    dns: Arc<dyn DnsStore>,
    events: EventBus,
    ingesters: Arc<Vec<Box<dyn DatasetIngester>>>,
    watches: Mutex<HashMap<String, WatchEntry>>,
}

impl Coordinator {
    pub fn new(store: IndexStore, dns: Arc<dyn DnsStore>) -> Arc<Self> {
        Arc::new(Self {
            store,
            dns,
            events: EventBus::new(),
            ingesters: Arc::new(ingest::all_ingesters()),
            watches: Mutex::new(HashMap::new()),
        })
    }

    pub fn events(&self) -> EventBus {
        self.events.clone()
    }

    /// `watch(archive)` (spec.md 4.1): idempotent. Installs a 5-second
    /// trailing-edge debounced trigger on the archive's invalidation
    /// stream and performs an immediate crawl.
    pub async fn watch(self: &Arc<Self>, archive: Arc<dyn ArchiveHandle>) {
        let origin = archive.url().to_string();
        {
            let watches = self.watches.lock().await;
            if watches.contains_key(&origin) {
                return;
            }
        }

        let this = Arc::clone(self);
        let task_archive = Arc::clone(&archive);
        let task = tokio::spawn(async move {
            this.debounce_loop(task_archive).await;
        });

        self.watches
            .lock()
            .await
            .insert(origin.clone(), WatchEntry { task });
        self.events.emit(Event::Watch {
            source_url: origin,
        });

        self.crawl(archive.as_ref()).await;
    }

    async fn debounce_loop(self: Arc<Self>, archive: Arc<dyn ArchiveHandle>) {
        let mut stream = archive.watch();
        loop {
            if stream.next().await.is_none() {
                return;
            }
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(DEBOUNCE) => break,
                    next = stream.next() => {
                        if next.is_none() {
                            return;
                        }
                    }
                }
            }
            self.crawl(archive.as_ref()).await;
        }
    }

    /// `unwatch(origin)` (spec.md 4.1): idempotent.
    pub async fn unwatch(&self, origin: &str) {
        if let Some(entry) = self.watches.lock().await.remove(origin) {
            entry.task.abort();
            self.events.emit(Event::Unwatch {
                source_url: origin.to_string(),
            });
        }
    }

    /// `crawl(archive)` (spec.md 4.1 steps 1-8). Never returns an error to
    /// the caller — failures are logged and surfaced only as `CrawlError`
    /// events, so a scheduler tick or a watch debounce never aborts on one
    /// bad archive.
    pub async fn crawl(&self, archive: &dyn ArchiveHandle) {
        if let Err(e) = self.crawl_inner(archive).await {
            tracing::warn!(source = archive.url(), error = %e, "crawl failed");
        }
    }

    async fn crawl_inner(&self, archive: &dyn ArchiveHandle) -> Result<()> {
        let origin = crate::archive::origin::canonicalize(archive.url())?;
        let _guard = self.store.lock(&format!("crawl:{origin}")).await;

        let mut source = self.store.resolve_source(&origin).await?;

        let current_key = archive.domain();
        let dns_changed = match current_key {
            Some(key) => match self.dns.get_current_by_key(key).await? {
                Some(binding) => source.dns_name_id != Some(binding.id),
                None => false,
            },
            None => false,
        };
        if dns_changed {
            self.store.mark_global_reset_required(source.id).await?;
            source.global_reset_required = true;
            self.events.emit(Event::CrawlDnsChange {
                source_url: origin.clone(),
            });
        }

        self.events.emit(Event::CrawlStart {
            source_url: origin.clone(),
        });

        let results = join_all(self.ingesters.iter().map(|ingester| {
            ingester.crawl_site(archive, &source, &self.store, &self.events)
        }))
        .await;

        let first_error = results.into_iter().find_map(|r| r.err());

        if let Some(e) = first_error {
            self.events.emit(Event::CrawlError {
                source_url: origin,
                error: e.to_string(),
            });
            return Ok(());
        }

        if dns_changed {
            if let Some(key) = current_key {
                if let Some(binding) = self.dns.get_current_by_key(key).await? {
                    self.store
                        .clear_global_reset_and_bind_dns(source.id, Some(binding.id))
                        .await?;
                }
            }
        }

        self.events.emit(Event::CrawlFinish { source_url: origin });
        Ok(())
    }

    /// Enqueue a crawl request for `archive` without waiting for it to
    /// finish (Design Note 9: mutation operations write their file then
    /// ask the Coordinator to crawl, expressed as a message rather than a
    /// recursive call back into `crawl`, so a writer never reenters the
    /// per-archive lock it might already be waiting on).
    pub fn enqueue_crawl(self: &Arc<Self>, archive: Arc<dyn ArchiveHandle>) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.crawl(archive.as_ref()).await;
        });
    }

    /// `resetSite(origin)` (spec.md 4.1, "Reset site").
    pub async fn reset_site(&self, origin: &str) -> Result<()> {
        let _guard = self.store.lock(&format!("crawl:{origin}")).await;
        self.store.reset_source(origin).await
    }

    /// `listCrawlStates()` (spec.md 4.1).
    pub async fn list_crawl_states(&self) -> Result<Vec<CrawlSourceState>> {
        self.store.list_crawl_states().await
    }
}

/// Marker re-export so callers matching on archive-level notifications
/// don't need to reach into `crate::archive` directly.
pub type WatchEvent = ArchiveEvent;
