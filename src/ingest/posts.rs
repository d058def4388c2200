//! `posts` dataset ingester (spec.md 4.3.1, 4.3 table): per-file
//! collection at `/data/posts/<ISO-timestamp>.json`, media type
//! `unwalled.garden/post`, tagged.

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
use crate::store::schema::{post_tags, posts};
use crate::store::IndexStore;

pub const DATASET: &str = "posts";
pub const TABLE_VERSION: i32 = 1;
pub const MEDIA_TYPE: &str = "unwalled.garden/post";
const ROOT_PATH: &str = "/data/posts";

static PATH_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^/data/posts/[^/]+\.json$").unwrap());

#[derive(Debug, Deserialize)]
struct PostPayload {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    body: String,
    #[serde(rename = "createdAt", default)]
    created_at: Option<String>,
    #[serde(rename = "updatedAt", default)]
    updated_at: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
}

impl PostPayload {
    fn validate(&self) -> std::result::Result<(), ValidationError> {
        if self.kind != MEDIA_TYPE {
            return Err(ValidationError {
                field: "type",
                reason: format!("expected {MEDIA_TYPE}"),
            });
        }
        validate::max_len("body", &self.body, 1_000_000)?;
        validate::validate_tags(&self.tags)?;
        Ok(())
    }
}

pub struct PostsIngester;

#[async_trait]
impl DatasetIngester for PostsIngester {
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
            diesel::delete(posts::table.filter(posts::source_id.eq(source.id)))
                .execute(&mut conn)
                .await?;
        }

        let matched = super::matching_changes_in_order(&window.changes, &PATH_REGEX);
        let total = matched.len();

        for (i, change) in matched.iter().enumerate() {
            if change.kind == DiffKind::Del {
                let mut conn = store.conn().await?;
                diesel::delete(
                    posts::table
                        .filter(posts::source_id.eq(source.id))
                        .filter(posts::pathname.eq(&change.path)),
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
                        tracing::warn!(path = %change.path, error = %e, "posts: archive read failed, aborting dataset for this crawl");
                        return Ok(());
                    }
                };

                match serde_json::from_slice::<PostPayload>(&bytes)
                    .map_err(|e| e.to_string())
                    .and_then(|payload| {
                        payload.validate().map(|_| payload).map_err(|e| e.to_string())
                    }) {
                    Ok(payload) => {
                        let crawled_at = chrono::Utc::now().timestamp_millis();
                        let created_at = validate::normalize_timestamp(payload.created_at.as_deref());
                        let updated_at = validate::normalize_timestamp(payload.updated_at.as_deref());
                        upsert(
                            store,
                            source.id,
                            &change.path,
                            &payload.body,
                            created_at,
                            updated_at,
                            crawled_at,
                            &payload.tags,
                        )
                        .await?;
                        events.emit(Event::RecordUpdated {
                            source_url: source_url.clone(),
                            dataset: DATASET.to_string(),
                            pathname: change.path.clone(),
                        });
                    }
                    Err(reason) => {
                        tracing::warn!(path = %change.path, %reason, "posts: skipping invalid record");
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

#[allow(clippy::too_many_arguments)]
async fn upsert(
    store: &IndexStore,
    source_id: i32,
    pathname: &str,
    body: &str,
    created_at: i64,
    updated_at: i64,
    crawled_at: i64,
    tag_names: &[String],
) -> Result<()> {
    let mut conn = store.conn().await?;

    let existing_id: Option<i32> = posts::table
        .filter(posts::source_id.eq(source_id))
        .filter(posts::pathname.eq(pathname))
        .select(posts::id)
        .first(&mut conn)
        .await
        .optional()?;

    let post_id = if let Some(id) = existing_id {
        diesel::update(posts::table.find(id))
            .set((
                posts::body.eq(body),
                posts::created_at.eq(created_at),
                posts::updated_at.eq(updated_at),
                posts::crawled_at.eq(crawled_at),
            ))
            .execute(&mut conn)
            .await?;
        id
    } else {
        diesel::insert_into(posts::table)
            .values((
                posts::source_id.eq(source_id),
                posts::pathname.eq(pathname),
                posts::body.eq(body),
                posts::created_at.eq(created_at),
                posts::updated_at.eq(updated_at),
                posts::crawled_at.eq(crawled_at),
            ))
            .execute(&mut conn)
            .await?;
        posts::table
            .filter(posts::source_id.eq(source_id))
            .filter(posts::pathname.eq(pathname))
            .select(posts::id)
            .first(&mut conn)
            .await?
    };

    diesel::delete(post_tags::table.filter(post_tags::post_id.eq(post_id)))
        .execute(&mut conn)
        .await?;
    let tag_ids = tag_store::resolve_tag_ids(&mut conn, tag_names).await?;
    for tag_id in tag_ids {
        diesel::insert_into(post_tags::table)
            .values((post_tags::post_id.eq(post_id), post_tags::tag_id.eq(tag_id)))
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
) -> Result<Option<crate::store::models::PostRecord>> {
    use crate::store::schema::crawl_sources;

    let mut conn = store.conn().await?;
    posts::table
        .inner_join(crawl_sources::table)
        .filter(crawl_sources::origin.eq(origin))
        .filter(posts::pathname.eq(pathname))
        .select(crate::store::models::PostRecord::as_select())
        .first(&mut conn)
        .await
        .optional()
        .map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::memory::MemoryArchive;

    async fn temp_store() -> (tempfile::NamedTempFile, IndexStore) {
        let file = tempfile::NamedTempFile::new().unwrap();
        let store = IndexStore::connect(&file.path().display().to_string())
            .await
            .unwrap();
        (file, store)
    }

    #[tokio::test]
    async fn ingests_a_valid_post_and_skips_a_malformed_one() {
        let (_file, store) = temp_store().await;
        let archive = MemoryArchive::new("dat://a");
        archive.put(
            "/data/posts/2020-01-01T00:00:00.000Z.json",
            br#"{"type":"unwalled.garden/post","body":"hello","createdAt":"2020-01-01T00:00:00.000Z"}"#.to_vec(),
        );
        archive.put("/data/posts/a.json", b"not json".to_vec());

        let source = store.resolve_source("dat://a").await.unwrap();
        let events = EventBus::new();
        PostsIngester
            .crawl_site(&archive, &source, &store, &events)
            .await
            .unwrap();

        let record = get(&store, "dat://a", "/data/posts/2020-01-01T00:00:00.000Z.json")
            .await
            .unwrap()
            .expect("valid post indexed");
        assert_eq!(record.body, "hello");
        assert_eq!(record.created_at, 1577836800000);

        assert!(get(&store, "dat://a", "/data/posts/a.json")
            .await
            .unwrap()
            .is_none());

        let checkpoint = store.checkpoint(source.id, DATASET).await.unwrap().unwrap();
        assert_eq!(checkpoint.crawl_source_version, archive.current_version() as i64);
    }

    #[tokio::test]
    async fn delete_removes_the_indexed_row() {
        let (_file, store) = temp_store().await;
        let archive = MemoryArchive::new("dat://a");
        archive.put(
            "/data/posts/a.json",
            br#"{"type":"unwalled.garden/post","body":"hi"}"#.to_vec(),
        );
        let source = store.resolve_source("dat://a").await.unwrap();
        let events = EventBus::new();
        PostsIngester
            .crawl_site(&archive, &source, &store, &events)
            .await
            .unwrap();
        assert!(get(&store, "dat://a", "/data/posts/a.json").await.unwrap().is_some());

        archive.del("/data/posts/a.json");
        PostsIngester
            .crawl_site(&archive, &source, &store, &events)
            .await
            .unwrap();
        assert!(get(&store, "dat://a", "/data/posts/a.json").await.unwrap().is_none());
    }
}
