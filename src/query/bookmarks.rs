//! `bookmarks` query surface (spec.md 4.6.1, 4.6.2, 6.4).

use std::sync::Arc;

use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde::Serialize;

use super::{Author, ListFilters};
use crate::archive::{origin, ArchiveHandle};
use crate::coordinator::Coordinator;
use crate::error::{IndexError, Result};
use crate::ingest::bookmarks as ingest_bookmarks;
use crate::ingest::validate;
use crate::store::models::BookmarkRecord;
use crate::store::schema::{bookmark_tags, bookmarks, crawl_sources, tags};
use crate::store::IndexStore;

const ROOT_PATH: &str = "/data/bookmarks";

#[derive(Debug, Clone, Serialize)]
pub struct BookmarkView {
    pub url: String,
    pub author: Author,
    pub href: String,
    pub title: String,
    pub description: String,
    pub pinned: bool,
    pub tags: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, serde::Deserialize, Default)]
pub struct BookmarkPayload {
    pub href: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub tags: Vec<String>,
}

fn validate_payload(payload: &BookmarkPayload) -> Result<()> {
    validate::require_uri("href", &payload.href).map_err(super::validation_failed)?;
    validate::max_len("title", &payload.title, 280).map_err(super::validation_failed)?;
    validate::validate_tags(&payload.tags).map_err(super::validation_failed)?;
    Ok(())
}

async fn load_tags(store: &IndexStore, bookmark_id: i32) -> Result<Vec<String>> {
    let mut conn = store.conn().await?;
    bookmark_tags::table
        .inner_join(tags::table)
        .filter(bookmark_tags::bookmark_id.eq(bookmark_id))
        .select(tags::name)
        .load(&mut conn)
        .await
        .map_err(Into::into)
}

async fn hydrate(store: &IndexStore, source_origin: &str, record: BookmarkRecord) -> Result<BookmarkView> {
    let author = super::hydrate_author(store, source_origin).await?;
    let record_tags = load_tags(store, record.id).await?;
    Ok(BookmarkView {
        url: format!("{source_origin}{}", record.pathname),
        author,
        href: record.href,
        title: record.title,
        description: record.description,
        pinned: record.pinned,
        tags: record_tags,
        created_at: super::render_timestamp(record.created_at),
        updated_at: super::render_timestamp(record.updated_at),
    })
}

pub async fn list(store: &IndexStore, filters: ListFilters) -> Result<Vec<BookmarkView>> {
    let filters = filters.validated()?;
    let mut conn = store.conn().await?;

    let mut query = bookmarks::table.inner_join(crawl_sources::table).into_boxed();
    if !filters.authors.is_empty() {
        query = query.filter(crawl_sources::origin.eq_any(filters.authors.clone()));
    }
    query = if filters.reverse {
        query.order(bookmarks::created_at.desc())
    } else {
        query.order(bookmarks::created_at.asc())
    };

    let rows: Vec<(BookmarkRecord, String)> = query
        .offset(filters.offset)
        .limit(filters.limit)
        .select((BookmarkRecord::as_select(), crawl_sources::origin))
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

pub async fn get(store: &IndexStore, url: &str) -> Result<Option<BookmarkView>> {
    let (source_origin, pathname) = origin::split(url)?;
    match ingest_bookmarks::get(store, &source_origin, &pathname).await? {
        Some(record) => Ok(Some(hydrate(store, &source_origin, record).await?)),
        None => Ok(None),
    }
}

pub async fn add(
    coordinator: &Arc<Coordinator>,
    archive: Arc<dyn ArchiveHandle>,
    payload: BookmarkPayload,
) -> Result<String> {
    validate_payload(&payload)?;
    let slug = origin::slugify(&payload.href);
    let pathname = format!("{ROOT_PATH}/{slug}.json");
    let body = serde_json::json!({
        "type": ingest_bookmarks::MEDIA_TYPE,
        "href": payload.href,
        "title": payload.title,
        "description": payload.description,
        "pinned": payload.pinned,
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
    patch: BookmarkPayload,
) -> Result<()> {
    let existing = archive
        .read_file(pathname)
        .await
        .map_err(|_| IndexError::NotFound(pathname.to_string()))?;
    let mut current: serde_json::Value = serde_json::from_slice(&existing)?;
    validate_payload(&patch)?;

    current["href"] = serde_json::Value::String(patch.href);
    current["title"] = serde_json::Value::String(patch.title);
    current["description"] = serde_json::Value::String(patch.description);
    current["pinned"] = serde_json::Value::Bool(patch.pinned);
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
            BookmarkPayload {
                href: "https://example.com".to_string(),
                title: "Example".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        coordinator.crawl(archive.as_ref()).await;

        let view = get(&store, &url).await.unwrap().expect("bookmark indexed");
        assert_eq!(view.href, "https://example.com");
        assert_eq!(view.title, "Example");
    }
}
