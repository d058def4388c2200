//! `discussions` dataset ingester (spec.md 4.3 table): per-file collection
//! at `/data/discussions/<ISO-timestamp>.json`, media type
//! `unwalled.garden/discussion`, tagged.

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
use crate::store::schema::{discussion_tags, discussions};
use crate::store::IndexStore;

pub const DATASET: &str = "discussions";
pub const TABLE_VERSION: i32 = 1;
pub const MEDIA_TYPE: &str = "unwalled.garden/discussion";
const ROOT_PATH: &str = "/data/discussions";

static PATH_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^/data/discussions/[^/]+\.json$").unwrap());

#[derive(Debug, Deserialize)]
struct DiscussionPayload {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    body: String,
    #[serde(rename = "createdAt", default)]
    created_at: Option<String>,
    #[serde(rename = "updatedAt", default)]
    updated_at: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
}

impl DiscussionPayload {
    fn validate(&self) -> std::result::Result<(), ValidationError> {
        if self.kind != MEDIA_TYPE {
            return Err(ValidationError {
                field: "type",
                reason: format!("expected {MEDIA_TYPE}"),
            });
        }
        validate::max_len("title", &self.title, 280)?;
        validate::max_len("body", &self.body, 1_000_000)?;
        validate::validate_tags(&self.tags)?;
        Ok(())
    }
}

pub struct DiscussionsIngester;

#[async_trait]
impl DatasetIngester for DiscussionsIngester {
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
            diesel::delete(discussions::table.filter(discussions::source_id.eq(source.id)))
                .execute(&mut conn)
                .await?;
        }

        let matched = super::matching_changes_in_order(&window.changes, &PATH_REGEX);
        let total = matched.len();

        for (i, change) in matched.iter().enumerate() {
            if change.kind == DiffKind::Del {
                let mut conn = store.conn().await?;
                diesel::delete(
                    discussions::table
                        .filter(discussions::source_id.eq(source.id))
                        .filter(discussions::pathname.eq(&change.path)),
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
                        tracing::warn!(path = %change.path, error = %e, "discussions: archive read failed, aborting dataset for this crawl");
                        return Ok(());
                    }
                };

                match serde_json::from_slice::<DiscussionPayload>(&bytes)
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
                        tracing::warn!(path = %change.path, %reason, "discussions: skipping invalid record");
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
    payload: &DiscussionPayload,
    created_at: i64,
    updated_at: i64,
    crawled_at: i64,
) -> Result<()> {
    let mut conn = store.conn().await?;

    let existing_id: Option<i32> = discussions::table
        .filter(discussions::source_id.eq(source_id))
        .filter(discussions::pathname.eq(pathname))
        .select(discussions::id)
        .first(&mut conn)
        .await
        .optional()?;

    let discussion_id = if let Some(id) = existing_id {
        diesel::update(discussions::table.find(id))
            .set((
                discussions::title.eq(&payload.title),
                discussions::body.eq(&payload.body),
                discussions::created_at.eq(created_at),
                discussions::updated_at.eq(updated_at),
                discussions::crawled_at.eq(crawled_at),
            ))
            .execute(&mut conn)
            .await?;
        id
    } else {
        diesel::insert_into(discussions::table)
            .values((
                discussions::source_id.eq(source_id),
                discussions::pathname.eq(pathname),
                discussions::title.eq(&payload.title),
                discussions::body.eq(&payload.body),
                discussions::created_at.eq(created_at),
                discussions::updated_at.eq(updated_at),
                discussions::crawled_at.eq(crawled_at),
            ))
            .execute(&mut conn)
            .await?;
        discussions::table
            .filter(discussions::source_id.eq(source_id))
            .filter(discussions::pathname.eq(pathname))
            .select(discussions::id)
            .first(&mut conn)
            .await?
    };

    diesel::delete(discussion_tags::table.filter(discussion_tags::discussion_id.eq(discussion_id)))
        .execute(&mut conn)
        .await?;
    let tag_ids = tag_store::resolve_tag_ids(&mut conn, &payload.tags).await?;
    for tag_id in tag_ids {
        diesel::insert_into(discussion_tags::table)
            .values((
                discussion_tags::discussion_id.eq(discussion_id),
                discussion_tags::tag_id.eq(tag_id),
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
) -> Result<Option<crate::store::models::DiscussionRecord>> {
    use crate::store::schema::crawl_sources;

    let mut conn = store.conn().await?;
    discussions::table
        .inner_join(crawl_sources::table)
        .filter(crawl_sources::origin.eq(origin))
        .filter(discussions::pathname.eq(pathname))
        .select(crate::store::models::DiscussionRecord::as_select())
        .first(&mut conn)
        .await
        .optional()
        .map_err(Into::into)
}
