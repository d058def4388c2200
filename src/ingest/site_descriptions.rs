//! `site-descriptions` dataset ingester (spec.md 4.3.3): two fixed paths,
//! the archive's own `/dat.json` (self-description) and
//! `/data/known_sites/<hostname>/dat.json` (captured descriptions of other
//! archives), media type `unwalled.garden/site-description`, not tagged.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use url::Url;

use super::DatasetIngester;
use crate::archive::{ArchiveHandle, DiffKind};
use crate::coordinator::events::{Event, EventBus};
use crate::error::Result;
use crate::store::models::CrawlSourceRecord;
use crate::store::schema::{crawl_sources, site_descriptions};
use crate::store::IndexStore;

pub const DATASET: &str = "site-descriptions";
pub const TABLE_VERSION: i32 = 1;
pub const MEDIA_TYPE: &str = "unwalled.garden/site-description";
const ROOT_PATH: &str = "/";
const SELF_PATH: &str = "/dat.json";

static KNOWN_SITE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^/data/known_sites/([^/]+)/dat\.json$").unwrap());

#[derive(Debug, Deserialize)]
struct SiteDescriptionPayload {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    /// Either a single string or an array of labels; normalized to a
    /// comma-joined list before storage (spec.md 3, `SiteDescription`).
    #[serde(default)]
    #[serde(rename = "type")]
    site_type: SiteType,
    #[serde(rename = "createdAt", default)]
    created_at: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(untagged)]
enum SiteType {
    #[default]
    None,
    Single(String),
    Multiple(Vec<String>),
}

impl SiteType {
    fn joined(&self) -> String {
        match self {
            SiteType::None => String::new(),
            SiteType::Single(s) => s.clone(),
            SiteType::Multiple(v) => v.join(","),
        }
    }
}

pub struct SiteDescriptionsIngester;

#[async_trait]
impl DatasetIngester for SiteDescriptionsIngester {
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
            diesel::delete(
                site_descriptions::table.filter(site_descriptions::source_id.eq(source.id)),
            )
            .execute(&mut conn)
            .await?;
        }

        let scheme = Url::parse(&source_url)
            .map(|u| u.scheme().to_string())
            .unwrap_or_else(|_| "dat".to_string());

        let matched: Vec<_> = window
            .changes
            .iter()
            .filter(|c| c.path == SELF_PATH || KNOWN_SITE_REGEX.is_match(&c.path))
            .cloned()
            .collect();
        let mut matched = matched;
        matched.sort_by_key(|c| c.version);
        let total = matched.len();

        for (i, change) in matched.iter().enumerate() {
            let subject_url = if change.path == SELF_PATH {
                source_url.clone()
            } else if let Some(caps) = KNOWN_SITE_REGEX.captures(&change.path) {
                format!("{scheme}://{}", &caps[1])
            } else {
                continue;
            };

            if change.kind == DiffKind::Del {
                let mut conn = store.conn().await?;
                diesel::delete(
                    site_descriptions::table
                        .filter(site_descriptions::source_id.eq(source.id))
                        .filter(site_descriptions::subject_url.eq(&subject_url)),
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
                        tracing::warn!(path = %change.path, error = %e, "site-descriptions: archive read failed, aborting dataset for this crawl");
                        return Ok(());
                    }
                };

                match serde_json::from_slice::<SiteDescriptionPayload>(&bytes) {
                    Ok(payload) => {
                        let crawled_at = chrono::Utc::now().timestamp_millis();
                        let created_at =
                            super::validate::normalize_timestamp(payload.created_at.as_deref());
                        upsert(
                            store,
                            source.id,
                            &subject_url,
                            &payload.title,
                            &payload.description,
                            &payload.site_type.joined(),
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
                        tracing::warn!(path = %change.path, error = %reason, "site-descriptions: skipping invalid record");
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
    subject_url: &str,
    title: &str,
    description: &str,
    site_type: &str,
    created_at: i64,
    crawled_at: i64,
) -> Result<()> {
    let mut conn = store.conn().await?;

    let existing_id: Option<i32> = site_descriptions::table
        .filter(site_descriptions::source_id.eq(source_id))
        .filter(site_descriptions::subject_url.eq(subject_url))
        .select(site_descriptions::id)
        .first(&mut conn)
        .await
        .optional()?;

    if let Some(id) = existing_id {
        diesel::update(site_descriptions::table.find(id))
            .set((
                site_descriptions::title.eq(title),
                site_descriptions::description.eq(description),
                site_descriptions::site_type.eq(site_type),
                site_descriptions::created_at.eq(created_at),
                site_descriptions::crawled_at.eq(crawled_at),
            ))
            .execute(&mut conn)
            .await?;
    } else {
        diesel::insert_into(site_descriptions::table)
            .values((
                site_descriptions::source_id.eq(source_id),
                site_descriptions::subject_url.eq(subject_url),
                site_descriptions::title.eq(title),
                site_descriptions::description.eq(description),
                site_descriptions::site_type.eq(site_type),
                site_descriptions::created_at.eq(created_at),
                site_descriptions::crawled_at.eq(crawled_at),
            ))
            .execute(&mut conn)
            .await?;
    }

    Ok(())
}

/// `get(url)` support for the query surface (spec.md 4.6.2): the
/// description a given source has on file about `subject_url`.
pub async fn get(
    store: &IndexStore,
    origin_url: &str,
    subject_url: &str,
) -> Result<Option<crate::store::models::SiteDescriptionRecord>> {
    let mut conn = store.conn().await?;
    site_descriptions::table
        .inner_join(crawl_sources::table)
        .filter(crawl_sources::origin.eq(origin_url))
        .filter(site_descriptions::subject_url.eq(subject_url))
        .select(crate::store::models::SiteDescriptionRecord::as_select())
        .first(&mut conn)
        .await
        .optional()
        .map_err(Into::into)
}
