//! `bookmarks` dataset ingester (spec.md 4.3 table): per-file collection
//! at `/data/bookmarks/<slug>.json`, media type `unwalled.garden/bookmark`,
//! tagged.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use super::validate::{self, ValidationError};
use super::{tags as tag_store, DatasetIngester};
use crate::archive::{ArchiveHandle, DiffKind};
use crate::coordinator::events::{Event, EventBus};
use crate::error::Result;
use crate::store::models::CrawlSourceRecord;
use crate::store::schema::{bookmark_tags, bookmarks};
use crate::store::IndexStore;

pub const DATASET: &str = "bookmarks";
pub const TABLE_VERSION: i32 = 1;
pub const MEDIA_TYPE: &str = "unwalled.garden/bookmark";
const ROOT_PATH: &str = "/data/bookmarks";

static PATH_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^/data/bookmarks/[^/]+\.json$").unwrap());

#[derive(Debug, Deserialize)]
struct BookmarkPayload {
    #[serde(rename = "type")]
    kind: String,
    href: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    pinned: bool,
    #[serde(rename = "createdAt", default)]
    created_at: Option<String>,
    #[serde(rename = "updatedAt", default)]
    updated_at: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
}

impl BookmarkPayload {
    fn validate(&self) -> std::result::Result<(), ValidationError> {
        if self.kind != MEDIA_TYPE {
            return Err(ValidationError {
                field: "type",
                reason: format!("expected {MEDIA_TYPE}"),
            });
        }
        validate::require_uri("href", &self.href)?;
        validate::max_len("title", &self.title, 280)?;
        validate::validate_tags(&self.tags)?;
        Ok(())
    }
}

pub struct BookmarksIngester;

#[async_trait]
impl DatasetIngester for BookmarksIngester {
    fn dataset_tag(&self) -> &'static str {
        DATASET
    }

    async fn crawl_site(
        &self,
        archive: &dyn ArchiveHandle,
        source: &CrawlSourceRecord,
        store: &IndexStore,
        events: &EventBus,
    ) -> Result<()> {
        let source_url = archive.url().to_string();
        let window =
            super::open_window(store, archive, source, DATASET, TABLE_VERSION, ROOT_PATH).await?;

        events.emit(Event::CrawlDatasetStart {
            source_url: source_url.clone(),
            dataset: DATASET.to_string(),
            start_version: window.start_version,
            end_version: window.end_version,
        });

        if window.reset_required {
            let mut conn = store.conn().await?;
            diesel::delete(bookmarks::table.filter(bookmarks::source_id.eq(source.id)))
                .execute(&mut conn)
                .await?;
        }

        let matched = super::matching_changes_in_order(&window.changes, &PATH_REGEX);
        let total = matched.len();

        for (i, change) in matched.iter().enumerate() {
            if change.kind == DiffKind::Del {
                let mut conn = store.conn().await?;
                diesel::delete(
                    bookmarks::table
                        .filter(bookmarks::source_id.eq(source.id))
                        .filter(bookmarks::pathname.eq(&change.path)),
                )
                .execute(&mut conn)
                .await?;
                events.emit(Event::RecordRemoved {
                    source_url: source_url.clone(),
                    dataset: DATASET.to_string(),
                    pathname: change.path.clone(),
                });
            } else {
                let bytes = match archive.read_file(&change.path).await {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        tracing::warn!(path = %change.path, error = %e, "bookmarks: archive read failed, aborting dataset for this crawl");
                        return Ok(());
                    }
                };

                match serde_json::from_slice::<BookmarkPayload>(&bytes)
                    .map_err(|e| e.to_string())
                    .and_then(|p| p.validate().map(|_| p).map_err(|e| e.to_string()))
                {
                    Ok(payload) => {
                        let crawled_at = chrono::Utc::now().timestamp_millis();
                        let created_at =
                            validate::normalize_timestamp(payload.created_at.as_deref());
                        let updated_at =
                            validate::normalize_timestamp(payload.updated_at.as_deref());
                        upsert(
                            store,
                            source.id,
                            &change.path,
                            &payload,
                            created_at,
                            updated_at,
                            crawled_at,
                        )
                        .await?;
                        events.emit(Event::RecordUpdated {
                            source_url: source_url.clone(),
                            dataset: DATASET.to_string(),
                            pathname: change.path.clone(),
                        });
                    }
                    Err(reason) => {
                        tracing::warn!(path = %change.path, %reason, "bookmarks: skipping invalid record");
                    }
                }
            }

            store
                .write_checkpoint(source.id, DATASET, change.version as i64, TABLE_VERSION)
                .await?;
            super::emit_progress(events, &source_url, DATASET, i + 1, total);
        }

        super::close_window(store, source, DATASET, TABLE_VERSION, window.end_version).await?;
        events.emit(Event::CrawlDatasetFinish {
            source_url,
            dataset: DATASET.to_string(),
        });
        Ok(())
    }
}

async fn upsert(
    store: &IndexStore,
    source_id: i32,
    pathname: &str,
    payload: &BookmarkPayload,
    created_at: i64,
    updated_at: i64,
    crawled_at: i64,
) -> Result<()> {
    let mut conn = store.conn().await?;

    let existing_id: Option<i32> = bookmarks::table
        .filter(bookmarks::source_id.eq(source_id))
        .filter(bookmarks::pathname.eq(pathname))
        .select(bookmarks::id)
        .first(&mut conn)
        .await
        .optional()?;

    let bookmark_id = if let Some(id) = existing_id {
        diesel::update(bookmarks::table.find(id))
            .set((
                bookmarks::href.eq(&payload.href),
                bookmarks::title.eq(&payload.title),
                bookmarks::description.eq(&payload.description),
                bookmarks::pinned.eq(payload.pinned),
                bookmarks::created_at.eq(created_at),
                bookmarks::updated_at.eq(updated_at),
                bookmarks::crawled_at.eq(crawled_at),
            ))
            .execute(&mut conn)
            .await?;
        id
    } else {
        diesel::insert_into(bookmarks::table)
            .values((
                bookmarks::source_id.eq(source_id),
                bookmarks::pathname.eq(pathname),
                bookmarks::href.eq(&payload.href),
                bookmarks::title.eq(&payload.title),
                bookmarks::description.eq(&payload.description),
                bookmarks::pinned.eq(payload.pinned),
                bookmarks::created_at.eq(created_at),
                bookmarks::updated_at.eq(updated_at),
                bookmarks::crawled_at.eq(crawled_at),
            ))
            .execute(&mut conn)
            .await?;
        bookmarks::table
            .filter(bookmarks::source_id.eq(source_id))
            .filter(bookmarks::pathname.eq(pathname))
            .select(bookmarks::id)
            .first(&mut conn)
            .await?
    };

    diesel::delete(bookmark_tags::table.filter(bookmark_tags::bookmark_id.eq(bookmark_id)))
        .execute(&mut conn)
        .await?;
    let tag_ids = tag_store::resolve_tag_ids(&mut conn, &payload.tags).await?;
    for tag_id in tag_ids {
        diesel::insert_into(bookmark_tags::table)
            .values((
                bookmark_tags::bookmark_id.eq(bookmark_id),
                bookmark_tags::tag_id.eq(tag_id),
            ))
            .execute(&mut conn)
            .await?;
    }

    Ok(())
}

/// `get(url)` support for the query surface (spec.md 4.6.2).
pub async fn get(
    store: &IndexStore,
    origin: &str,
    pathname: &str,
) -> Result<Option<crate::store::models::BookmarkRecord>> {
    use crate::store::schema::crawl_sources;

    let mut conn = store.conn().await?;
    bookmarks::table
        .inner_join(crawl_sources::table)
        .filter(crawl_sources::origin.eq(origin))
        .filter(bookmarks::pathname.eq(pathname))
        .select(crate::store::models::BookmarkRecord::as_select())
        .first(&mut conn)
        .await
        .optional()
        .map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::memory::MemoryArchive;

    #[tokio::test]
    async fn ingests_and_tags_a_bookmark() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let store = IndexStore::connect(&file.path().display().to_string())
            .await
            .unwrap();
        let archive = MemoryArchive::new("dat://a");
        archive.put(
            "/data/bookmarks/x.json",
            br#"{"type":"unwalled.garden/bookmark","href":"https://example.com","title":"Example","tags":["rust","web"]}"#.to_vec(),
        );
        let source = store.resolve_source("dat://a").await.unwrap();
        let events = EventBus::new();
        BookmarksIngester
            .crawl_site(&archive, &source, &store, &events)
            .await
            .unwrap();

        let record = get(&store, "dat://a", "/data/bookmarks/x.json")
            .await
            .unwrap()
            .expect("bookmark indexed");
        assert_eq!(record.href, "https://example.com");
    }
}
