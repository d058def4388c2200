//! `comments` dataset ingester (SPEC_FULL.md 4.3 expansion, "new module
//! grounded on the posts/bookmarks shape"): per-file collection at
//! `/data/comments/<ISO-timestamp>.json`, media type
//! `unwalled.garden/comment`, not tagged.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use super::validate::{self, ValidationError};
use super::DatasetIngester;
use crate::archive::{ArchiveHandle, DiffKind};
use crate::coordinator::events::{Event, EventBus};
use crate::error::Result;
use crate::store::models::CrawlSourceRecord;
use crate::store::schema::comments;
use crate::store::IndexStore;

pub const DATASET: &str = "comments";
pub const TABLE_VERSION: i32 = 1;
pub const MEDIA_TYPE: &str = "unwalled.garden/comment";
const ROOT_PATH: &str = "/data/comments";

static PATH_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^/data/comments/[^/]+\.json$").unwrap());

#[derive(Debug, Deserialize)]
struct CommentPayload {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    body: String,
    #[serde(rename = "parentHref")]
    parent_href: String,
    #[serde(rename = "createdAt", default)]
    created_at: Option<String>,
    #[serde(rename = "updatedAt", default)]
    updated_at: Option<String>,
}

impl CommentPayload {
    fn validate(&self) -> std::result::Result<(), ValidationError> {
        if self.kind != MEDIA_TYPE {
            return Err(ValidationError {
                field: "type",
                reason: format!("expected {MEDIA_TYPE}"),
            });
        }
        validate::max_len("body", &self.body, 1_000_000)?;
        validate::require_uri("parentHref", &self.parent_href)?;
        Ok(())
    }
}

pub struct CommentsIngester;

#[async_trait]
impl DatasetIngester for CommentsIngester {
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
            diesel::delete(comments::table.filter(comments::source_id.eq(source.id)))
                .execute(&mut conn)
                .await?;
        }

        let matched = super::matching_changes_in_order(&window.changes, &PATH_REGEX);
        let total = matched.len();

        for (i, change) in matched.iter().enumerate() {
            if change.kind == DiffKind::Del {
                let mut conn = store.conn().await?;
                diesel::delete(
                    comments::table
                        .filter(comments::source_id.eq(source.id))
                        .filter(comments::pathname.eq(&change.path)),
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
                        tracing::warn!(path = %change.path, error = %e, "comments: archive read failed, aborting dataset for this crawl");
                        return Ok(());
                    }
                };

                match serde_json::from_slice::<CommentPayload>(&bytes)
                    .map_err(|e| e.to_string())
                    .and_then(|p| p.validate().map(|_| p).map_err(|e| e.to_string()))
                {
                    Ok(payload) => {
                        let crawled_at = chrono::Utc::now().timestamp_millis();
                        let created_at =
                            validate::normalize_timestamp(payload.created_at.as_deref());
                        let updated_at =
                            validate::normalize_timestamp(payload.updated_at.as_deref());

                        let mut conn = store.conn().await?;
                        let existing_id: Option<i32> = comments::table
                            .filter(comments::source_id.eq(source.id))
                            .filter(comments::pathname.eq(&change.path))
                            .select(comments::id)
                            .first(&mut conn)
                            .await
                            .optional()?;
                        if let Some(id) = existing_id {
                            diesel::update(comments::table.find(id))
                                .set((
                                    comments::body.eq(&payload.body),
                                    comments::parent_href.eq(&payload.parent_href),
                                    comments::created_at.eq(created_at),
                                    comments::updated_at.eq(updated_at),
                                    comments::crawled_at.eq(crawled_at),
                                ))
                                .execute(&mut conn)
                                .await?;
                        } else {
                            diesel::insert_into(comments::table)
                                .values((
                                    comments::source_id.eq(source.id),
                                    comments::pathname.eq(&change.path),
                                    comments::body.eq(&payload.body),
                                    comments::parent_href.eq(&payload.parent_href),
                                    comments::created_at.eq(created_at),
                                    comments::updated_at.eq(updated_at),
                                    comments::crawled_at.eq(crawled_at),
                                ))
                                .execute(&mut conn)
                                .await?;
                        }
                        events.emit(Event::RecordUpdated {
                            source_url: source_url.clone(),
                            dataset: DATASET.to_string(),
                            pathname: change.path.clone(),
                        });
                    }
                    Err(reason) => {
                        tracing::warn!(path = %change.path, %reason, "comments: skipping invalid record");
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

/// `listComments({parentHref})` / `get(url)` support for the query surface
/// (SPEC_FULL.md 4.3 "Comments" expansion).
pub async fn list_by_parent(
    store: &IndexStore,
    parent_href: &str,
) -> Result<Vec<crate::store::models::CommentRecord>> {
    let mut conn = store.conn().await?;
    comments::table
        .filter(comments::parent_href.eq(parent_href))
        .order(comments::created_at.asc())
        .select(crate::store::models::CommentRecord::as_select())
        .load(&mut conn)
        .await
        .map_err(Into::into)
}

pub async fn get(
    store: &IndexStore,
    origin: &str,
    pathname: &str,
) -> Result<Option<crate::store::models::CommentRecord>> {
    use crate::store::schema::crawl_sources;

    let mut conn = store.conn().await?;
    comments::table
        .inner_join(crawl_sources::table)
        .filter(crawl_sources::origin.eq(origin))
        .filter(comments::pathname.eq(pathname))
        .select(crate::store::models::CommentRecord::as_select())
        .first(&mut conn)
        .await
        .optional()
        .map_err(Into::into)
}
