//! C2 Ingester Framework: the common diff -> validate -> upsert ->
//! checkpoint pipeline every dataset ingester (C3) builds on (spec.md 4.2).

pub mod bookmarks;
pub mod comments;
pub mod discussions;
pub mod media;
pub mod posts;
pub mod published_sites;
pub mod reactions;
pub mod site_descriptions;
pub mod tags;
pub mod validate;
pub mod votes;

pub mod follows;
pub use follows::FollowsIngester;

use async_trait::async_trait;
use regex::Regex;

use crate::archive::{ArchiveHandle, DiffEntry};
use crate::coordinator::events::{Event, EventBus};
use crate::error::Result;
use crate::store::models::CrawlSourceRecord;
use crate::store::IndexStore;

/// The `{changes, resetRequired}` payload a dataset handler consumes
/// (spec.md 4.2 step 5).
pub struct ChangeWindow {
    pub changes: Vec<DiffEntry>,
    pub reset_required: bool,
    /// `start = storedCrawlSourceVersion + 1` (spec.md 4.2 step 3), for
    /// callers to report the actual range in `crawl-dataset-start`.
    pub start_version: u64,
    pub end_version: u64,
}

/// Every dataset ingester this crate ships, dispatched in parallel by the
/// Coordinator (spec.md 4.1 step 5).
#[async_trait]
pub trait DatasetIngester: Send + Sync {
    /// The dataset tag stored in `CrawlSourceMeta` (spec.md 3).
    fn dataset_tag(&self) -> &'static str;

    async fn crawl_site(
        &self,
        archive: &dyn ArchiveHandle,
        source: &CrawlSourceRecord,
        store: &IndexStore,
        events: &EventBus,
    ) -> Result<()>;
}

/// Steps 1-4 of spec.md 4.2: load the checkpoint, fold in
/// `globalResetRequired` and a dataset schema-version bump, read the
/// archive's current version, and pull the ordered diff for `start..end`.
///
/// The caller (a concrete dataset module) applies `changes` itself and is
/// responsible for truncating its table when `reset_required` is set
/// (spec.md 3 invariant 4) and for writing fine-grained per-entry
/// checkpoints as it goes (spec.md 4.3.1); [`close_window`] only writes
/// the final whole-window checkpoint once the handler returns `Ok`.
pub async fn open_window(
    store: &IndexStore,
    archive: &dyn ArchiveHandle,
    source: &CrawlSourceRecord,
    dataset: &str,
    table_version: i32,
    root_path: &str,
) -> Result<ChangeWindow> {
    let checkpoint = store.checkpoint(source.id, dataset).await?;
    let reset_required = source.global_reset_required
        || checkpoint
            .as_ref()
            .map(|c| c.crawl_dataset_version != table_version)
            .unwrap_or(false);

    let stored_version: u64 = if reset_required {
        0
    } else {
        checkpoint
            .map(|c| c.crawl_source_version.max(0) as u64)
            .unwrap_or(0)
    };

    let info = archive.get_info().await?;
    let end_version = info.version;
    let start_version = stored_version + 1;

    let changes = if start_version > end_version {
        Vec::new()
    } else {
        archive.diff_stream(stored_version, root_path).await?
    };

    Ok(ChangeWindow {
        changes,
        reset_required,
        start_version,
        end_version,
    })
}

/// Write the whole-window checkpoint after a dataset handler completes
/// (spec.md 4.2 step 5, "on completion"). Idempotent no-op to call again
/// with the same `end_version` (e.g. after a no-op window).
pub async fn close_window(
    store: &IndexStore,
    source: &CrawlSourceRecord,
    dataset: &str,
    table_version: i32,
    end_version: u64,
) -> Result<()> {
    store
        .write_checkpoint(source.id, dataset, end_version as i64, table_version)
        .await
}

/// `getMatchingChangesInOrder` (spec.md 4.2): filter by path regex, sort
/// ascending by version, stable.
pub fn matching_changes_in_order(changes: &[DiffEntry], regex: &Regex) -> Vec<DiffEntry> {
    let mut matched: Vec<DiffEntry> = changes
        .iter()
        .filter(|c| regex.is_match(&c.path))
        .cloned()
        .collect();
    matched.sort_by_key(|c| c.version);
    matched
}

/// `emitProgressEvent` (spec.md 4.2).
pub fn emit_progress(
    events: &EventBus,
    source_url: &str,
    dataset: &str,
    progress: usize,
    total: usize,
) {
    events.emit(Event::CrawlDatasetProgress {
        source_url: source_url.to_string(),
        dataset: dataset.to_string(),
        progress,
        total,
    });
}

/// The set of dataset ingesters this crate ships, in the order the
/// Coordinator fans out to them (spec.md 2, component table row C3).
pub fn all_ingesters() -> Vec<Box<dyn DatasetIngester>> {
    vec![
        Box::new(posts::PostsIngester),
        Box::new(bookmarks::BookmarksIngester),
        Box::new(discussions::DiscussionsIngester),
        Box::new(comments::CommentsIngester),
        Box::new(media::MediaIngester),
        Box::new(votes::VotesIngester),
        Box::new(reactions::ReactionsIngester),
        Box::new(FollowsIngester),
        Box::new(published_sites::PublishedSitesIngester),
        Box::new(site_descriptions::SiteDescriptionsIngester),
    ]
}
