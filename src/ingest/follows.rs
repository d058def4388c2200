//! `follows` dataset ingester (spec.md 4.3.2): single-file-set at the
//! canonical path `/data/follows.json` holding `{urls: [...]}`.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde::Deserialize;
use std::collections::HashSet;

use super::DatasetIngester;
use crate::archive::{origin, ArchiveHandle};
use crate::coordinator::events::{Event, EventBus};
use crate::error::Result;
use crate::store::models::CrawlSourceRecord;
use crate::store::schema::{crawl_sources, follow_edges};
use crate::store::IndexStore;

pub const DATASET: &str = "follows";
pub const TABLE_VERSION: i32 = 1;
pub const MEDIA_TYPE: &str = "unwalled.garden/follows";
const ROOT_PATH: &str = "/data";
const CANONICAL_PATH: &str = "/data/follows.json";

#[derive(Debug, Deserialize)]
struct FollowsPayload {
    #[serde(default)]
    urls: Vec<String>,
}

pub struct FollowsIngester;

#[async_trait]
impl DatasetIngester for FollowsIngester {
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
            diesel::delete(follow_edges::table.filter(follow_edges::source_id.eq(source.id)))
                .execute(&mut conn)
                .await?;
        }

        let touched = window
            .changes
            .iter()
            .any(|c| c.path == CANONICAL_PATH);

        if !touched {
            super::close_window(store, source, DATASET, TABLE_VERSION, window.end_version)
                .await?;
            events.emit(Event::CrawlDatasetFinish {
                source_url,
                dataset: DATASET.to_string(),
            });
            return Ok(());
        }

        let desired: HashSet<String> = match archive.read_file(CANONICAL_PATH).await {
            Ok(bytes) => match serde_json::from_slice::<FollowsPayload>(&bytes) {
                Ok(payload) => payload
                    .urls
                    .iter()
                    .filter_map(|u| origin::canonicalize(u).ok())
                    .collect(),
                Err(e) => {
                    tracing::warn!(error = %e, "follows: invalid JSON, skipping this crawl");
                    HashSet::new()
                }
            },
            Err(_) => HashSet::new(),
        };

        let mut conn = store.conn().await?;
        let existing: Vec<String> = follow_edges::table
            .filter(follow_edges::source_id.eq(source.id))
            .select(follow_edges::dest)
            .load(&mut conn)
            .await?;
        let existing: HashSet<String> = existing.into_iter().collect();
        drop(conn);

        for dest in desired.difference(&existing) {
            let mut conn = store.conn().await?;
            let crawled_at = chrono::Utc::now().timestamp_millis();
            match diesel::insert_into(follow_edges::table)
                .values((
                    follow_edges::source_id.eq(source.id),
                    follow_edges::dest.eq(dest),
                    follow_edges::crawled_at.eq(crawled_at),
                ))
                .execute(&mut conn)
                .await
            {
                Ok(_) => {
                    events.emit(Event::FollowAdded {
                        source_url: source_url.clone(),
                        dest: dest.clone(),
                    });
                }
                Err(e) if crate::error::IndexError::from(e).is_unique_violation() => {
                    tracing::debug!(dest, "follows: ignoring racing duplicate insert");
                }
                Err(e) => return Err(e.into()),
            }
        }

        for dest in existing.difference(&desired) {
            let mut conn = store.conn().await?;
            diesel::delete(
                follow_edges::table
                    .filter(follow_edges::source_id.eq(source.id))
                    .filter(follow_edges::dest.eq(dest)),
            )
            .execute(&mut conn)
            .await?;
            events.emit(Event::FollowRemoved {
                source_url: source_url.clone(),
                dest: dest.clone(),
            });
        }

        super::close_window(store, source, DATASET, TABLE_VERSION, window.end_version).await?;
        events.emit(Event::CrawlDatasetFinish {
            source_url,
            dataset: DATASET.to_string(),
        });
        Ok(())
    }
}

/// `listFollows(origin)` — the destinations a source currently follows,
/// used by the Scheduler's priority candidate list (spec.md 4.5) and by
/// federated search's hop expansion (spec.md 4.6.3).
pub async fn list_dests(store: &IndexStore, origin_url: &str) -> Result<Vec<String>> {
    let mut conn = store.conn().await?;
    follow_edges::table
        .inner_join(crawl_sources::table)
        .filter(crawl_sources::origin.eq(origin_url))
        .select(follow_edges::dest)
        .load(&mut conn)
        .await
        .map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::memory::MemoryArchive;

    #[tokio::test]
    async fn adds_and_removes_follow_edges_across_crawls() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let store = IndexStore::connect(&file.path().display().to_string())
            .await
            .unwrap();
        let archive = MemoryArchive::new("dat://a");
        archive.put(
            CANONICAL_PATH,
            br#"{"urls":["dat://b","dat://c"]}"#.to_vec(),
        );
        let source = store.resolve_source("dat://a").await.unwrap();
        let events = EventBus::new();
        FollowsIngester
            .crawl_site(&archive, &source, &store, &events)
            .await
            .unwrap();
        let dests = list_dests(&store, "dat://a").await.unwrap();
        assert_eq!(dests.len(), 2);

        archive.put(CANONICAL_PATH, br#"{"urls":["dat://b"]}"#.to_vec());
        FollowsIngester
            .crawl_site(&archive, &source, &store, &events)
            .await
            .unwrap();
        let dests = list_dests(&store, "dat://a").await.unwrap();
        assert_eq!(dests, vec!["dat://b".to_string()]);
    }
}
