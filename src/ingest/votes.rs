//! `votes` dataset ingester (spec.md 4.3 table): per-file collection at
//! `/data/votes/<ISO-timestamp>.json`, media type `unwalled.garden/vote`,
//! not tagged.

use async_trait::async_trait;
use diesel::dsl::sum;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use super::validate::{self, ValidationError};
use super::DatasetIngester;
use crate::archive::{ArchiveHandle, DiffKind};
use crate::coordinator::events::{Event, EventBus};
use crate::error::{IndexError, Result};
use crate::store::models::CrawlSourceRecord;
use crate::store::schema::votes;
use crate::store::IndexStore;

pub const DATASET: &str = "votes";
pub const TABLE_VERSION: i32 = 1;
pub const MEDIA_TYPE: &str = "unwalled.garden/vote";
const ROOT_PATH: &str = "/data/votes";

static PATH_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^/data/votes/[^/]+\.json$").unwrap());

#[derive(Debug, Deserialize)]
struct VotePayload {
    #[serde(rename = "type")]
    kind: String,
    subject: String,
    vote: i32,
    #[serde(rename = "createdAt", default)]
    created_at: Option<String>,
}

impl VotePayload {
    fn validate(&self) -> std::result::Result<(), ValidationError> {
        if self.kind != MEDIA_TYPE {
            return Err(ValidationError {
                field: "type",
                reason: format!("expected {MEDIA_TYPE}"),
            });
        }
        validate::require_uri("subject", &self.subject)?;
        if !(-1..=1).contains(&self.vote) {
            return Err(ValidationError {
                field: "vote",
                reason: "must be -1, 0 or 1".to_string(),
            });
        }
        Ok(())
    }
}

pub struct VotesIngester;

#[async_trait]
impl DatasetIngester for VotesIngester {
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
            diesel::delete(votes::table.filter(votes::source_id.eq(source.id)))
                .execute(&mut conn)
                .await?;
        }

        let matched = super::matching_changes_in_order(&window.changes, &PATH_REGEX);
        let total = matched.len();

        for (i, change) in matched.iter().enumerate() {
            if change.kind == DiffKind::Del {
                let mut conn = store.conn().await?;
                diesel::delete(
                    votes::table
                        .filter(votes::source_id.eq(source.id))
                        .filter(votes::pathname.eq(&change.path)),
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
                        tracing::warn!(path = %change.path, error = %e, "votes: archive read failed, aborting dataset for this crawl");
                        return Ok(());
                    }
                };

                match serde_json::from_slice::<VotePayload>(&bytes)
                    .map_err(|e| e.to_string())
                    .and_then(|p| p.validate().map(|_| p).map_err(|e| e.to_string()))
                {
                    Ok(payload) => {
                        let crawled_at = chrono::Utc::now().timestamp_millis();
                        let created_at =
                            validate::normalize_timestamp(payload.created_at.as_deref());
                        upsert(
                            store,
                            source.id,
                            &change.path,
                            &payload,
                            created_at,
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
                        tracing::warn!(path = %change.path, %reason, "votes: skipping invalid record");
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
    payload: &VotePayload,
    created_at: i64,
    crawled_at: i64,
) -> Result<()> {
    let mut conn = store.conn().await?;

    let existing_id: Option<i32> = votes::table
        .filter(votes::source_id.eq(source_id))
        .filter(votes::pathname.eq(pathname))
        .select(votes::id)
        .first(&mut conn)
        .await
        .optional()?;

    if let Some(id) = existing_id {
        diesel::update(votes::table.find(id))
            .set((
                votes::subject.eq(&payload.subject),
                votes::vote.eq(payload.vote),
                votes::created_at.eq(created_at),
                votes::crawled_at.eq(crawled_at),
            ))
            .execute(&mut conn)
            .await?;
    } else {
        diesel::insert_into(votes::table)
            .values((
                votes::source_id.eq(source_id),
                votes::pathname.eq(pathname),
                votes::subject.eq(&payload.subject),
                votes::vote.eq(payload.vote),
                votes::created_at.eq(created_at),
                votes::crawled_at.eq(crawled_at),
            ))
            .execute(&mut conn)
            .await?;
    }

    Ok(())
}

/// `listVotes({subject})` (spec.md 4.6.2): aggregate `sum(vote)` across
/// every indexed source for one subject URL.
pub async fn tally(store: &IndexStore, subject: &str) -> Result<i64> {
    let mut conn = store.conn().await?;
    let total: Option<i64> = votes::table
        .filter(votes::subject.eq(subject))
        .select(sum(votes::vote))
        .first(&mut conn)
        .await
        .map_err(IndexError::from)?;
    Ok(total.unwrap_or(0))
}

/// `get(url)` support for the query surface (spec.md 4.6.2).
pub async fn get(
    store: &IndexStore,
    origin: &str,
    pathname: &str,
) -> Result<Option<crate::store::models::VoteRecord>> {
    use crate::store::schema::crawl_sources;

    let mut conn = store.conn().await?;
    votes::table
        .inner_join(crawl_sources::table)
        .filter(crawl_sources::origin.eq(origin))
        .filter(votes::pathname.eq(pathname))
        .select(crate::store::models::VoteRecord::as_select())
        .first(&mut conn)
        .await
        .optional()
        .map_err(Into::into)
}
