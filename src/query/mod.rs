//! C6 Search & Query Surface (spec.md 4.6): typed `list`/`get` operations
//! per dataset, mutation operations that write a JSON file into the
//! caller's own archive and enqueue a crawl so the writer observes its
//! own data through the normal ingest path, federated search across
//! trust-scoped datasets, and the suggestions composition layer.

pub mod bookmarks;
pub mod comments;
pub mod discussions;
pub mod federated;
pub mod follows;
pub mod media;
pub mod posts;
pub mod published_sites;
pub mod reactions;
pub mod site_descriptions;
pub mod suggestions;
pub mod votes;

use std::sync::Arc;

use crate::archive::{origin, ArchiveHandle};
use crate::coordinator::Coordinator;
use crate::error::{IndexError, Result};
use crate::ingest::validate::ValidationError;
use crate::store::IndexStore;

/// Lift an ingest-time [`ValidationError`] into the write-time error kind
/// (spec.md 6.5: "at write time, validation failure raises an error to
/// the caller", vs. the ingest-time swallow-and-skip policy).
pub fn validation_failed(e: ValidationError) -> IndexError {
    IndexError::ValidationFailed(e.to_string())
}

/// Common `list(filters)` input (spec.md 4.6.1). Every field is optional
/// at the call site; [`ListFilters::validate`] is where `InvalidArgument`
/// surfaces for out-of-range values.
#[derive(Debug, Clone, Default)]
pub struct ListFilters {
    /// Author origin(s) to scope the result to; normalized to canonical
    /// origins before querying.
    pub authors: Vec<String>,
    /// Tag AND-filter: a record must carry every tag listed here
    /// (spec.md 4.6.1, Testable Property 9). Ignored by untagged datasets.
    pub tags: Vec<String>,
    pub offset: i64,
    pub limit: i64,
    pub reverse: bool,
}

impl ListFilters {
    pub fn new() -> Self {
        Self {
            limit: crate::config::DEFAULT_QUERY_LIMIT,
            ..Default::default()
        }
    }

    /// Validate and canonicalize. Mismatched/out-of-range inputs surface
    /// `InvalidArgument` (spec.md 4.6.1).
    fn validated(mut self) -> Result<Self> {
        if self.offset < 0 {
            return Err(IndexError::InvalidArgument(
                "offset must be >= 0".to_string(),
            ));
        }
        if self.limit <= 0 {
            return Err(IndexError::InvalidArgument(
                "limit must be > 0".to_string(),
            ));
        }
        self.authors = self
            .authors
            .iter()
            .map(|a| origin::canonicalize(a))
            .collect::<Result<Vec<_>>>()?;
        Ok(self)
    }
}

/// A hydrated author (spec.md 4.6.1: "authors are hydrated via
/// SiteDescription's `getBest`").
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Author {
    pub url: String,
    pub title: String,
}

/// Hydrate an author origin into a display name via the best available
/// `SiteDescription` for that subject, falling back to the bare origin
/// when no description is indexed yet (spec.md 5: query-time hydration
/// tolerates partial data from archives that haven't finished crawling).
pub async fn hydrate_author(store: &IndexStore, origin_url: &str) -> Result<Author> {
    let title = site_descriptions::get_best(store, origin_url)
        .await?
        .map(|d| d.title)
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| origin_url.to_string());
    Ok(Author {
        url: origin_url.to_string(),
        title,
    })
}

/// Render epoch milliseconds as ISO-8601 (spec.md 4.6.1, "timestamps are
/// rendered as ISO-8601").
pub fn render_timestamp(epoch_ms: i64) -> String {
    use chrono::TimeZone;
    chrono::Utc
        .timestamp_millis_opt(epoch_ms)
        .single()
        .unwrap_or_else(|| chrono::Utc.timestamp_opt(0, 0).single().unwrap())
        .to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Split a comma-joined tag/type string back into its parts, dropping
/// empties (spec.md 4.6.1, "tag strings are split").
pub fn split_joined(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

/// Tag AND-semantics (spec.md 4.6.1, Testable Property 9): keep only
/// records whose own tag set is a superset of `required`. Applied after
/// the SQL join rather than via a `HAVING COUNT(DISTINCT tag) = n`
/// clause, per spec.md 4.6.1's note that some join shapes can't express
/// that efficiently — this crate applies it uniformly for simplicity.
pub fn tags_match(record_tags: &[String], required: &[String]) -> bool {
    required.iter().all(|t| record_tags.iter().any(|rt| rt == t))
}

/// `add`/`edit`/`remove`'s write-then-crawl contract (spec.md 4.6,
/// Design Note 9): write the bytes into the caller's archive, then
/// enqueue a crawl so the writer observes their own data via the normal
/// ingest path rather than a shortcut write into the index.
pub async fn write_and_crawl(
    coordinator: &Arc<Coordinator>,
    archive: Arc<dyn ArchiveHandle>,
    pathname: &str,
    bytes: &[u8],
) -> Result<()> {
    archive.write_file(pathname, bytes).await?;
    coordinator.enqueue_crawl(archive);
    Ok(())
}

/// `remove`'s write-then-crawl contract: unlink, then enqueue a crawl.
pub async fn unlink_and_crawl(
    coordinator: &Arc<Coordinator>,
    archive: Arc<dyn ArchiveHandle>,
    pathname: &str,
) -> Result<()> {
    archive.unlink(pathname).await?;
    coordinator.enqueue_crawl(archive);
    Ok(())
}

/// Allocate a fresh ISO-timestamp filename under `root` for a time-keyed
/// dataset (spec.md 6.3), bumping by 1ms on collision against the
/// archive's current directory listing.
pub async fn next_timestamp_path(archive: &dyn ArchiveHandle, root: &str) -> Result<String> {
    let existing: std::collections::HashSet<String> =
        archive.readdir(root).await.unwrap_or_default().into_iter().collect();
    let now_ms = chrono::Utc::now().timestamp_millis();
    let name = origin::timestamp_filename(now_ms, |candidate| existing.contains(candidate));
    Ok(format!("{root}/{name}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_filters_reject_bad_offset_and_limit() {
        let mut filters = ListFilters::new();
        filters.offset = -1;
        assert!(filters.validated().is_err());

        let mut filters = ListFilters::new();
        filters.limit = 0;
        assert!(filters.validated().is_err());
    }

    #[test]
    fn tags_match_requires_every_tag() {
        let record = vec!["rust".to_string(), "web".to_string()];
        assert!(tags_match(&record, &["rust".to_string()]));
        assert!(tags_match(&record, &["rust".to_string(), "web".to_string()]));
        assert!(!tags_match(&record, &["rust".to_string(), "go".to_string()]));
    }

    #[test]
    fn split_joined_drops_empties() {
        assert_eq!(split_joined("a,b,,c"), vec!["a", "b", "c"]);
        assert_eq!(split_joined(""), Vec::<String>::new());
    }
}
