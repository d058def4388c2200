//! `comments` query surface (SPEC_FULL.md 4.3/4.6 expansion): `list`,
//! `listByParent`, `get`, and the `add`/`edit`/`remove` mutations.

use std::sync::Arc;

use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde::Serialize;

use super::{Author, ListFilters};
use crate::archive::{origin, ArchiveHandle};
use crate::coordinator::Coordinator;
use crate::error::{IndexError, Result};
use crate::ingest::comments as ingest_comments;
use crate::ingest::validate;
use crate::store::models::CommentRecord;
use crate::store::schema::{comments, crawl_sources};
use crate::store::IndexStore;

const ROOT_PATH: &str = "/data/comments";

#[derive(Debug, Clone, Serialize)]
pub struct CommentView {
    pub url: String,
    pub author: Author,
    pub body: String,
    pub parent_href: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, serde::Deserialize, Default)]
pub struct CommentPayload {
    #[serde(default)]
    pub body: String,
    pub parent_href: String,
}

fn validate_payload(payload: &CommentPayload) -> Result<()> {
    validate::max_len("body", &payload.body, 1_000_000).map_err(super::validation_failed)?;
    validate::require_uri("parentHref", &payload.parent_href).map_err(super::validation_failed)?;
    Ok(())
}

async fn hydrate(store: &IndexStore, source_origin: &str, record: CommentRecord) -> Result<CommentView> {
    let author = super::hydrate_author(store, source_origin).await?;
    Ok(CommentView {
        url: format!("{source_origin}{}", record.pathname),
        author,
        body: record.body,
        parent_href: record.parent_href,
        created_at: super::render_timestamp(record.created_at),
        updated_at: super::render_timestamp(record.updated_at),
    })
}

pub async fn list(store: &IndexStore, filters: ListFilters) -> Result<Vec<CommentView>> {
    let filters = filters.validated()?;
    let mut conn = store.conn().await?;

    let mut query = comments::table.inner_join(crawl_sources::table).into_boxed();
    if !filters.authors.is_empty() {
        query = query.filter(crawl_sources::origin.eq_any(filters.authors.clone()));
    }
    query = if filters.reverse {
        query.order(comments::created_at.desc())
    } else {
        query.order(comments::created_at.asc())
    };

    let rows: Vec<(CommentRecord, String)> = query
        .offset(filters.offset)
        .limit(filters.limit)
        .select((CommentRecord::as_select(), crawl_sources::origin))
        .load(&mut conn)
        .await?;
    drop(conn);

    let mut out = Vec::with_capacity(rows.len());
    for (record, source_origin) in rows {
        out.push(hydrate(store, &source_origin, record).await?);
    }
    Ok(out)
}

/// `listComments({parentHref})` (SPEC_FULL.md 4.3 expansion): every
/// comment on `parent_href`, oldest first.
pub async fn list_by_parent(store: &IndexStore, parent_href: &str) -> Result<Vec<CommentView>> {
    let records = ingest_comments::list_by_parent(store, parent_href).await?;
    let mut out = Vec::with_capacity(records.len());
    for record in records {
        let mut conn = store.conn().await?;
        let source_origin: String = crawl_sources::table
            .find(record.source_id)
            .select(crawl_sources::origin)
            .first(&mut conn)
            .await?;
        drop(conn);
        out.push(hydrate(store, &source_origin, record).await?);
    }
    Ok(out)
}

pub async fn get(store: &IndexStore, url: &str) -> Result<Option<CommentView>> {
    let (source_origin, pathname) = origin::split(url)?;
    match ingest_comments::get(store, &source_origin, &pathname).await? {
        Some(record) => Ok(Some(hydrate(store, &source_origin, record).await?)),
        None => Ok(None),
    }
}

pub async fn add(
    coordinator: &Arc<Coordinator>,
    archive: Arc<dyn ArchiveHandle>,
    payload: CommentPayload,
) -> Result<String> {
    validate_payload(&payload)?;
    let pathname = super::next_timestamp_path(archive.as_ref(), ROOT_PATH).await?;
    let body = serde_json::json!({
        "type": ingest_comments::MEDIA_TYPE,
        "body": payload.body,
        "parentHref": payload.parent_href,
        "createdAt": chrono::Utc::now().to_rfc3339(),
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
    patch: CommentPayload,
) -> Result<()> {
    let existing = archive
        .read_file(pathname)
        .await
        .map_err(|_| IndexError::NotFound(pathname.to_string()))?;
    let mut current: serde_json::Value = serde_json::from_slice(&existing)?;
    validate_payload(&patch)?;

    current["body"] = serde_json::Value::String(patch.body);
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
    async fn add_then_list_by_parent_finds_the_comment() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let store = IndexStore::connect(&file.path().display().to_string())
            .await
            .unwrap();
        let coordinator = Coordinator::new(store.clone(), Arc::new(NoopDnsStore));
        let archive: Arc<dyn ArchiveHandle> = Arc::new(MemoryArchive::new("dat://a"));

        add(
            &coordinator,
            archive.clone(),
            CommentPayload {
                body: "nice post".to_string(),
                parent_href: "https://example.com/posts/1".to_string(),
            },
        )
        .await
        .unwrap();

        coordinator.crawl(archive.as_ref()).await;

        let found = list_by_parent(&store, "https://example.com/posts/1")
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].body, "nice post");
    }
}
