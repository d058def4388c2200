//! `published-sites` dataset ingester (spec.md 4.3.1, 6.3): directory-of-
//! files collection at `/data/published-sites/<hostname>.json`, media type
//! `unwalled.garden/published-site`, not tagged. Each file lists the
//! destination origins published under that hostname.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashSet;

use super::DatasetIngester;
use crate::archive::{origin, ArchiveHandle, DiffKind};
use crate::coordinator::events::{Event, EventBus};
use crate::error::Result;
use crate::store::models::CrawlSourceRecord;
use crate::store::schema::{crawl_sources, published_site_edges};
use crate::store::IndexStore;

pub const DATASET: &str = "published-sites";
pub const TABLE_VERSION: i32 = 1;
pub const MEDIA_TYPE: &str = "unwalled.garden/published-site";
const ROOT_PATH: &str = "/data/published-sites";

static PATH_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^/data/published-sites/[^/]+\.json$").unwrap());

#[derive(Debug, Deserialize)]
struct PublishedSitesPayload {
    #[serde(default)]
    urls: Vec<String>,
}

pub struct PublishedSitesIngester;

#[async_trait]
impl DatasetIngester for PublishedSitesIngester {
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
                published_site_edges::table.filter(published_site_edges::source_id.eq(source.id)),
            )
            .execute(&mut conn)
            .await?;
        }

        let matched = super::matching_changes_in_order(&window.changes, &PATH_REGEX);
        let total = matched.len();

        for (i, change) in matched.iter().enumerate() {
            if change.kind == DiffKind::Del {
                let mut conn = store.conn().await?;
                diesel::delete(
                    published_site_edges::table
                        .filter(published_site_edges::source_id.eq(source.id))
                        .filter(published_site_edges::pathname.eq(&change.path)),
                )
                .execute(&mut conn)
                .await?;
                events.emit(Event::PublishedSiteRemoved {
                    source_url: source_url.clone(),
                    dest: change.path.clone(),
                });
            } else {
                let bytes = match archive.read_file(&change.path).await {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        tracing::warn!(path = %change.path, error = %e, "published-sites: archive read failed, aborting dataset for this crawl");
                        return Ok(());
                    }
                };

                match serde_json::from_slice::<PublishedSitesPayload>(&bytes) {
                    Ok(payload) => {
                        let dests: HashSet<String> = payload
                            .urls
                            .iter()
                            .filter_map(|u| origin::canonicalize(u).ok())
                            .collect();
                        let crawled_at = chrono::Utc::now().timestamp_millis();
                        refresh(store, source.id, &change.path, &dests, crawled_at).await?;
                        events.emit(Event::RecordUpdated {
                            source_url: source_url.clone(),
                            dataset: DATASET.to_string(),
                            pathname: change.path.clone(),
                        });
                        for dest in &dests {
                            events.emit(Event::PublishedSiteAdded {
                                source_url: source_url.clone(),
                                dest: dest.clone(),
                            });
                        }
                    }
                    Err(reason) => {
                        tracing::warn!(path = %change.path, error = %reason, "published-sites: skipping invalid record");
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

async fn refresh(
    store: &IndexStore,
    source_id: i32,
    pathname: &str,
    dests: &HashSet<String>,
    crawled_at: i64,
) -> Result<()> {
    let mut conn = store.conn().await?;
    diesel::delete(
        published_site_edges::table
            .filter(published_site_edges::source_id.eq(source_id))
            .filter(published_site_edges::pathname.eq(pathname)),
    )
    .execute(&mut conn)
    .await?;
    for dest in dests {
        match diesel::insert_into(published_site_edges::table)
            .values((
                published_site_edges::source_id.eq(source_id),
                published_site_edges::pathname.eq(pathname),
                published_site_edges::dest.eq(dest),
                published_site_edges::crawled_at.eq(crawled_at),
            ))
            .execute(&mut conn)
            .await
        {
            Ok(_) => {}
            // (source_id, dest) is unique (spec.md 3, "analogous to
            // FollowEdge"); the same dest can already be indexed under a
            // different pathname (another hostname file, or a stale row
            // from before this file's own refresh-delete). Tolerate it
            // like `follows` rather than aborting the dataset crawl.
            Err(e) if crate::error::IndexError::from(e).is_unique_violation() => {
                tracing::debug!(dest, pathname, "published-sites: ignoring racing duplicate insert");
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// `listPublishedSites(origin)` used by the Scheduler's priority candidate
/// list (spec.md 4.5 Step 1).
pub async fn list_dests(store: &IndexStore, origin_url: &str) -> Result<Vec<String>> {
    let mut conn = store.conn().await?;
    published_site_edges::table
        .inner_join(crawl_sources::table)
        .filter(crawl_sources::origin.eq(origin_url))
        .select(published_site_edges::dest)
        .load(&mut conn)
        .await
        .map_err(Into::into)
}
