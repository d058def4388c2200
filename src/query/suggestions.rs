//! `listSuggestions` (spec.md 4.6.4): a shallow composition layer over
//! built-in pages, the address book (follows), bookmarks, locally-cached
//! site records, and — when a query is present — top history matches.
//! Every source but the address book and site records is an external
//! collaborator (spec.md 6.1); this module only merges and filters.

use std::sync::Arc;

use serde::Serialize;

use super::ListFilters;
use crate::archive::{ArchiveLibrary, BookmarksStore, HistoryStore};
use crate::error::Result;
use crate::ingest::follows as ingest_follows;
use crate::store::IndexStore;

const HISTORY_LIMIT: usize = 12;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SuggestionKind {
    Page,
    AddressBook,
    Bookmark,
    SiteRecord,
    History,
}

#[derive(Debug, Clone, Serialize)]
pub struct Suggestion {
    pub url: String,
    pub title: String,
    pub kind: SuggestionKind,
}

/// The suggestions path's read-only external collaborators (spec.md
/// 6.1), bundled so callers wire them once rather than threading three
/// separate `Arc`s through every call site.
#[derive(Clone)]
pub struct SuggestionSources {
    pub library: Arc<dyn ArchiveLibrary>,
    pub bookmarks: Arc<dyn BookmarksStore>,
    pub history: Arc<dyn HistoryStore>,
}

fn matches(needle: Option<&str>, url: &str, title: &str) -> bool {
    match needle {
        None => true,
        Some(n) if n.is_empty() => true,
        Some(n) => {
            let n = n.to_lowercase();
            url.to_lowercase().contains(&n) || title.to_lowercase().contains(&n)
        }
    }
}

/// `listSuggestions(user, query, {filterPins})` (spec.md 4.6.4).
pub async fn list_suggestions(
    store: &IndexStore,
    sources: &SuggestionSources,
    user_origin: &str,
    query: Option<&str>,
    filter_pins: bool,
) -> Result<Vec<Suggestion>> {
    let mut out = Vec::new();

    for (url, title) in sources.library.built_in_pages().await {
        if matches(query, &url, &title) {
            out.push(Suggestion {
                url,
                title,
                kind: SuggestionKind::Page,
            });
        }
    }

    for dest in ingest_follows::list_dests(store, user_origin)
        .await
        .unwrap_or_default()
    {
        let author = super::hydrate_author(store, &dest).await?;
        if matches(query, &author.url, &author.title) {
            out.push(Suggestion {
                url: author.url,
                title: author.title,
                kind: SuggestionKind::AddressBook,
            });
        }
    }

    for (url, title) in sources.bookmarks.list_bookmark_urls(filter_pins).await {
        if matches(query, &url, &title) {
            out.push(Suggestion {
                url,
                title,
                kind: SuggestionKind::Bookmark,
            });
        }
    }

    let mut filters = ListFilters::new();
    filters.limit = 1000;
    for record in super::site_descriptions::list(store, filters).await? {
        if matches(query, &record.subject_url, &record.title) {
            out.push(Suggestion {
                url: record.subject_url,
                title: record.title,
                kind: SuggestionKind::SiteRecord,
            });
        }
    }

    if let Some(q) = query.filter(|q| !q.is_empty()) {
        for (url, title) in sources.history.search(q, HISTORY_LIMIT).await {
            out.push(Suggestion {
                url,
                title,
                kind: SuggestionKind::History,
            });
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct FixedLibrary(Vec<(String, String)>);
    #[async_trait]
    impl ArchiveLibrary for FixedLibrary {
        async fn built_in_pages(&self) -> Vec<(String, String)> {
            self.0.clone()
        }
    }

    struct FixedBookmarks(Vec<(String, String)>);
    #[async_trait]
    impl BookmarksStore for FixedBookmarks {
        async fn list_bookmark_urls(&self, _exclude_pinned: bool) -> Vec<(String, String)> {
            self.0.clone()
        }
    }

    struct FixedHistory(Vec<(String, String)>);
    #[async_trait]
    impl HistoryStore for FixedHistory {
        async fn search(&self, query: &str, limit: usize) -> Vec<(String, String)> {
            self.0
                .iter()
                .filter(|(url, title)| {
                    url.to_lowercase().contains(&query.to_lowercase())
                        || title.to_lowercase().contains(&query.to_lowercase())
                })
                .take(limit)
                .cloned()
                .collect()
        }
    }

    fn sources() -> SuggestionSources {
        SuggestionSources {
            library: Arc::new(FixedLibrary(vec![(
                "dat://home".to_string(),
                "Home".to_string(),
            )])),
            bookmarks: Arc::new(FixedBookmarks(vec![(
                "https://rust-lang.org".to_string(),
                "Rust".to_string(),
            )])),
            history: Arc::new(FixedHistory(vec![(
                "https://rust-lang.org/learn".to_string(),
                "Learn Rust".to_string(),
            )])),
        }
    }

    #[tokio::test]
    async fn lists_every_source_when_the_query_is_empty() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let store = IndexStore::connect(&file.path().display().to_string())
            .await
            .unwrap();

        let results = list_suggestions(&store, &sources(), "dat://me", None, false)
            .await
            .unwrap();

        assert!(results.iter().any(|s| s.kind == SuggestionKind::Page));
        assert!(results.iter().any(|s| s.kind == SuggestionKind::Bookmark));
        assert!(!results.iter().any(|s| s.kind == SuggestionKind::History));
    }

    #[tokio::test]
    async fn a_query_filters_by_substring_and_adds_history() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let store = IndexStore::connect(&file.path().display().to_string())
            .await
            .unwrap();

        let results = list_suggestions(&store, &sources(), "dat://me", Some("rust"), false)
            .await
            .unwrap();

        assert!(!results.iter().any(|s| s.kind == SuggestionKind::Page));
        assert!(results.iter().any(|s| s.kind == SuggestionKind::Bookmark));
        assert!(results.iter().any(|s| s.kind == SuggestionKind::History));
    }
}
