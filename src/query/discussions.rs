//! `discussions` query surface (spec.md 4.6.1, 4.6.2, 6.4).

use std::sync::Arc;

use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde::Serialize;

use super::{Author, ListFilters};
use crate::archive::{origin, ArchiveHandle};
use crate::coordinator::Coordinator;
use crate::error::{IndexError, Result};
use crate::ingest::discussions as ingest_discussions;
use crate::ingest::validate;
use crate::store::models::DiscussionRecord;
use crate::store::schema::{crawl_sources, discussion_tags, discussions, tags};
use crate::store::IndexStore;

const ROOT_PATH: &str = "/data/discussions";

#[derive(Debug, Clone, Serialize)]
pub struct DiscussionView {
    pub url: String,
    pub author: Author,
    pub title: String,
    pub body: String,
    pub tags: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, serde::Deserialize, Default)]
pub struct DiscussionPayload {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

fn validate_payload(payload: &DiscussionPayload) -> Result<()> {
    validate::max_len("title", &payload.title, 280).map_err(super::validation_failed)?;
    validate::max_len("body", &payload.body, 1_000_000).map_err(super::validation_failed)?;
    validate::validate_tags(&payload.tags).map_err(super::validation_failed)?;
    Ok(())
}

async fn load_tags(store: &IndexStore, discussion_id: i32) -> Result<Vec<String>> {
    let mut conn = store.conn().await?;
    discussion_tags::table
        .inner_join(tags::table)
        .filter(discussion_tags::discussion_id.eq(discussion_id))
        .select(tags::name)
        .load(&mut conn)
        .await
        .map_err(Into::into)
}

async fn hydrate(
    store: &IndexStore,
    source_origin: &str,
    record: DiscussionRecord,
) -> Result<DiscussionView> {
    let author = super::hydrate_author(store, source_origin).await?;
    let record_tags = load_tags(store, record.id).await?;
    Ok(DiscussionView {
        url: format!("{source_origin}{}", record.pathname),
        author,
        title: record.title,
        body: record.body,
        tags: record_tags,
        created_at: super::render_timestamp(record.created_at),
        updated_at: super::render_timestamp(record.updated_at),
    })
}

pub async fn list(store: &IndexStore, filters: ListFilters) -> Result<Vec<DiscussionView>> {
    let filters = filters.validated()?;
    let mut conn = store.conn().await?;

    let mut query = discussions::table
        .inner_join(crawl_sources::table)
        .into_boxed();
    if !filters.authors.is_empty() {
        query = query.filter(crawl_sources::origin.eq_any(filters.authors.clone()));
    }
    query = if filters.reverse {
        query.order(discussions::created_at.desc())
    } else {
        query.order(discussions::created_at.asc())
    };

    let rows: Vec<(DiscussionRecord, String)> = query
        .offset(filters.offset)
        .limit(filters.limit)
        .select((DiscussionRecord::as_select(), crawl_sources::origin))
        .load(&mut conn)
        .await?;
    drop(conn);

    let mut out = Vec::with_capacity(rows.len());
    for (record, source_origin) in rows {
        let view = hydrate(store, &source_origin, record).await?;
        if filters.tags.is_empty() || super::tags_match(&view.tags, &filters.tags) {
            out.push(view);
        }
    }
    Ok(out)
}

pub async fn get(store: &IndexStore, url: &str) -> Result<Option<DiscussionView>> {
    let (source_origin, pathname) = origin::split(url)?;
    match ingest_discussions::get(store, &source_origin, &pathname).await? {
        Some(record) => Ok(Some(hydrate(store, &source_origin, record).await?)),
        None => Ok(None),
    }
}

pub async fn add(
    coordinator: &Arc<Coordinator>,
    archive: Arc<dyn ArchiveHandle>,
    payload: DiscussionPayload,
) -> Result<String> {
    validate_payload(&payload)?;
    let pathname = super::next_timestamp_path(archive.as_ref(), ROOT_PATH).await?;
    let body = serde_json::json!({
        "type": ingest_discussions::MEDIA_TYPE,
        "title": payload.title,
        "body": payload.body,
        "createdAt": chrono::Utc::now().to_rfc3339(),
        "tags": payload.tags,
    });
    let bytes = serde_json::to_vec(&body)?;
    let url = format!("{}{pathname}", archive.url());
    super::write_and_crawl(coordinator, archive, &pathname, &bytes).await?;
    Ok(url)
}

pub async fn edit(
    coordinator: &Arc<Coordinator>,
    archive: Arc<dyn ArchiveHandle>,
    pathname: &str,
    patch: DiscussionPayload,
) -> Result<()> {
    let existing = archive
        .read_file(pathname)
        .await
        .map_err(|_| IndexError::NotFound(pathname.to_string()))?;
    let mut current: serde_json::Value = serde_json::from_slice(&existing)?;
    validate_payload(&patch)?;

    current["title"] = serde_json::Value::String(patch.title);
    current["body"] = serde_json::Value::String(patch.body);
    current["tags"] = serde_json::to_value(patch.tags)?;
    current["updatedAt"] = serde_json::Value::String(chrono::Utc::now().to_rfc3339());

    let bytes = serde_json::to_vec(&current)?;
    super::write_and_crawl(coordinator, archive, pathname, &bytes).await
}

pub async fn remove(
    coordinator: &Arc<Coordinator>,
    archive: Arc<dyn ArchiveHandle>,
    pathname: &str,
) -> Result<()> {
    super::unlink_and_crawl(coordinator, archive, pathname).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::memory::{MemoryArchive, NoopDnsStore};
    use crate::coordinator::Coordinator;

    #[tokio::test]
    async fn add_then_get_round_trips_through_a_crawl() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let store = IndexStore::connect(&file.path().display().to_string())
            .await
            .unwrap();
        let coordinator = Coordinator::new(store.clone(), Arc::new(NoopDnsStore));
        let archive: Arc<dyn ArchiveHandle> = Arc::new(MemoryArchive::new("dat://a"));

        let url = add(
            &coordinator,
            archive.clone(),
            DiscussionPayload {
                title: "Hello".to_string(),
                body: "World".to_string(),
                tags: vec![],
            },
        )
        .await
        .unwrap();

        coordinator.crawl(archive.as_ref()).await;

        let view = get(&store, &url).await.unwrap().expect("discussion indexed");
        assert_eq!(view.title, "Hello");
        assert_eq!(view.body, "World");
    }
}
