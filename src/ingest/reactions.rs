//! `reactions` dataset ingester (spec.md 4.3.4): per-file collection keyed
//! by topic at `/data/reactions/<slugified-topic-url>.json`, media type
//! `unwalled.garden/reaction`, not tagged. Query side aggregates by emoji
//! across every indexed source; writes (`addReaction`/`removeReaction`)
//! read-modify-write the owning archive's own file under a named lock.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::validate::ValidationError;
use super::DatasetIngester;
use crate::archive::{origin, ArchiveHandle, DiffKind};
use crate::coordinator::events::{Event, EventBus};
use crate::error::Result;
use crate::store::models::CrawlSourceRecord;
use crate::store::schema::{crawl_sources, reactions};
use crate::store::IndexStore;

pub const DATASET: &str = "reactions";
pub const TABLE_VERSION: i32 = 1;
pub const MEDIA_TYPE: &str = "unwalled.garden/reaction";
const ROOT_PATH: &str = "/data/reactions";

static PATH_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^/data/reactions/[^/]+\.json$").unwrap());

#[derive(Debug, Serialize, Deserialize)]
struct ReactionPayload {
    #[serde(rename = "type")]
    kind: String,
    topic: String,
    #[serde(default)]
    emojis: Vec<String>,
}

impl ReactionPayload {
    fn validate(&self) -> std::result::Result<(), ValidationError> {
        if self.kind != MEDIA_TYPE {
            return Err(ValidationError {
                field: "type",
                reason: format!("expected {MEDIA_TYPE}"),
            });
        }
        if self.topic.trim().is_empty() {
            return Err(ValidationError {
                field: "topic",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

pub struct ReactionsIngester;

#[async_trait]
impl DatasetIngester for ReactionsIngester {
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
            diesel::delete(reactions::table.filter(reactions::source_id.eq(source.id)))
                .execute(&mut conn)
                .await?;
        }

        let matched = super::matching_changes_in_order(&window.changes, &PATH_REGEX);
        let total = matched.len();

        for (i, change) in matched.iter().enumerate() {
            if change.kind == DiffKind::Del {
                let mut conn = store.conn().await?;
                diesel::delete(
                    reactions::table
                        .filter(reactions::source_id.eq(source.id))
                        .filter(reactions::pathname.eq(&change.path)),
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
                        tracing::warn!(path = %change.path, error = %e, "reactions: archive read failed, aborting dataset for this crawl");
                        return Ok(());
                    }
                };

                match serde_json::from_slice::<ReactionPayload>(&bytes)
                    .map_err(|e| e.to_string())
                    .and_then(|p| p.validate().map(|_| p).map_err(|e| e.to_string()))
                    .and_then(|p| {
                        origin::normalize_topic(&p.topic)
                            .map(|topic| (topic, p.emojis))
                            .map_err(|e| e.to_string())
                    }) {
                    Ok((topic, emojis)) => {
                        let crawled_at = chrono::Utc::now().timestamp_millis();
                        upsert(store, source.id, &change.path, &topic, &emojis, crawled_at)
                            .await?;
                        events.emit(Event::RecordUpdated {
                            source_url: source_url.clone(),
                            dataset: DATASET.to_string(),
                            pathname: change.path.clone(),
                        });
                    }
                    Err(reason) => {
                        tracing::warn!(path = %change.path, %reason, "reactions: skipping invalid record");
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
    topic: &str,
    emojis: &[String],
    crawled_at: i64,
) -> Result<()> {
    let mut conn = store.conn().await?;
    let joined = emojis.join(",");

    let existing_id: Option<i32> = reactions::table
        .filter(reactions::source_id.eq(source_id))
        .filter(reactions::pathname.eq(pathname))
        .select(reactions::id)
        .first(&mut conn)
        .await
        .optional()?;

    if let Some(id) = existing_id {
        diesel::update(reactions::table.find(id))
            .set((
                reactions::topic.eq(topic),
                reactions::emojis.eq(&joined),
                reactions::crawled_at.eq(crawled_at),
            ))
            .execute(&mut conn)
            .await?;
    } else {
        diesel::insert_into(reactions::table)
            .values((
                reactions::source_id.eq(source_id),
                reactions::pathname.eq(pathname),
                reactions::topic.eq(topic),
                reactions::emojis.eq(&joined),
                reactions::crawled_at.eq(crawled_at),
            ))
            .execute(&mut conn)
            .await?;
    }

    Ok(())
}

/// One emoji bucket of `listReactions(topic)` (spec.md 4.3.4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReactionGroup {
    pub emoji: String,
    pub authors: Vec<String>,
}

/// `listReactions(topic)`: group every indexed source's reaction row for
/// this topic by emoji, collecting contributing origins in first-occurrence
/// order (spec.md 4.3.4).
pub async fn list_reactions(store: &IndexStore, topic: &str) -> Result<Vec<ReactionGroup>> {
    let normalized = origin::normalize_topic(topic)?;
    let mut conn = store.conn().await?;

    let rows: Vec<(String, String)> = reactions::table
        .inner_join(crawl_sources::table)
        .filter(reactions::topic.eq(&normalized))
        .select((crawl_sources::origin, reactions::emojis))
        .load(&mut conn)
        .await?;

    let mut groups: Vec<ReactionGroup> = Vec::new();
    for (author, joined) in rows {
        for emoji in joined.split(',').filter(|e| !e.is_empty()) {
            if let Some(group) = groups.iter_mut().find(|g| g.emoji == emoji) {
                if !group.authors.contains(&author) {
                    group.authors.push(author.clone());
                }
            } else {
                groups.push(ReactionGroup {
                    emoji: emoji.to_string(),
                    authors: vec![author.clone()],
                });
            }
        }
    }
    Ok(groups)
}

/// `addReaction`/`removeReaction` (spec.md 4.3.4, 6.4): read-modify-write
/// the calling archive's own reaction file for this topic, under the
/// per-archive named lock `crawler:reactions:<archiveUrl>`. Deletes the
/// file if the resulting emoji set is empty.
pub async fn set_reaction(
    store: &IndexStore,
    archive: &dyn ArchiveHandle,
    topic: &str,
    emoji: &str,
    add: bool,
) -> Result<()> {
    let normalized = origin::normalize_topic(topic)?;
    let pathname = format!("{ROOT_PATH}/{}.json", origin::slugify(&normalized));
    let lock_name = format!("crawler:reactions:{}", archive.url());
    let _guard = store.lock(&lock_name).await;

    let mut emojis: Vec<String> = match archive.read_file(&pathname).await {
        Ok(bytes) => serde_json::from_slice::<ReactionPayload>(&bytes)
            .map(|p| p.emojis)
            .unwrap_or_default(),
        Err(_) => Vec::new(),
    };

    if add {
        if !emojis.iter().any(|e| e == emoji) {
            emojis.push(emoji.to_string());
        }
    } else {
        emojis.retain(|e| e != emoji);
    }

    if emojis.is_empty() {
        let _ = archive.unlink(&pathname).await;
    } else {
        let payload = ReactionPayload {
            kind: MEDIA_TYPE.to_string(),
            topic: normalized,
            emojis,
        };
        let bytes = serde_json::to_vec(&payload)?;
        archive.write_file(&pathname, &bytes).await?;
    }

    Ok(())
}

/// `get(url)` support for the query surface (spec.md 4.6.2).
pub async fn get(
    store: &IndexStore,
    origin_url: &str,
    pathname: &str,
) -> Result<Option<crate::store::models::ReactionRecord>> {
    let mut conn = store.conn().await?;
    reactions::table
        .inner_join(crawl_sources::table)
        .filter(crawl_sources::origin.eq(origin_url))
        .filter(reactions::pathname.eq(pathname))
        .select(crate::store::models::ReactionRecord::as_select())
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
    async fn groups_reactions_by_emoji_across_sources() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let store = IndexStore::connect(&file.path().display().to_string())
            .await
            .unwrap();

        let a = MemoryArchive::new("dat://alice");
        a.put(
            "/data/reactions/x.com-p.json",
            br#"{"type":"unwalled.garden/reaction","topic":"https://x.com/p","emojis":["👍"]}"#
                .to_vec(),
        );
        let source_a = store.resolve_source("dat://alice").await.unwrap();
        let events = EventBus::new();
        ReactionsIngester
            .crawl_site(&a, &source_a, &store, &events)
            .await
            .unwrap();

        let b = MemoryArchive::new("dat://bob");
        b.put(
            "/data/reactions/x.com-p.json",
            br#"{"type":"unwalled.garden/reaction","topic":"https://x.com/p","emojis":["👍","🎉"]}"#
                .to_vec(),
        );
        let source_b = store.resolve_source("dat://bob").await.unwrap();
        ReactionsIngester
            .crawl_site(&b, &source_b, &store, &events)
            .await
            .unwrap();

        let groups = list_reactions(&store, "https://x.com/p").await.unwrap();
        let thumbs = groups.iter().find(|g| g.emoji == "👍").unwrap();
        assert_eq!(thumbs.authors.len(), 2);
        let party = groups.iter().find(|g| g.emoji == "🎉").unwrap();
        assert_eq!(party.authors, vec!["dat://bob".to_string()]);
    }
}
