//! `votes` query surface (spec.md 4.6.1, 4.6.2, 6.4): `list`, `get`,
//! `tally`, and the `add`/`remove` mutations (votes are single-valued per
//! source+subject, so there is no `edit` — casting a new vote is another
//! `add` and the ingester upserts on re-crawl).

use std::sync::Arc;

use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde::Serialize;

use super::{Author, ListFilters};
use crate::archive::{origin, ArchiveHandle};
use crate::coordinator::Coordinator;
use crate::error::{IndexError, Result};
use crate::ingest::validate;
use crate::ingest::votes as ingest_votes;
use crate::store::models::VoteRecord;
use crate::store::schema::{crawl_sources, votes};
use crate::store::IndexStore;

const ROOT_PATH: &str = "/data/votes";

#[derive(Debug, Clone, Serialize)]
pub struct VoteView {
    pub url: String,
    pub author: Author,
    pub subject: String,
    pub vote: i32,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, serde::Deserialize, Default)]
pub struct VotePayload {
    pub subject: String,
    pub vote: i32,
}

fn validate_payload(payload: &VotePayload) -> Result<()> {
    validate::require_uri("subject", &payload.subject).map_err(super::validation_failed)?;
    if !(-1..=1).contains(&payload.vote) {
        return Err(IndexError::ValidationFailed(
            "vote: must be -1, 0 or 1".to_string(),
        ));
    }
    Ok(())
}

async fn hydrate(store: &IndexStore, source_origin: &str, record: VoteRecord) -> Result<VoteView> {
    let author = super::hydrate_author(store, source_origin).await?;
    Ok(VoteView {
        url: format!("{source_origin}{}", record.pathname),
        author,
        subject: record.subject,
        vote: record.vote,
        created_at: super::render_timestamp(record.created_at),
    })
}

pub async fn list(store: &IndexStore, filters: ListFilters) -> Result<Vec<VoteView>> {
    let filters = filters.validated()?;
    let mut conn = store.conn().await?;

    let mut query = votes::table.inner_join(crawl_sources::table).into_boxed();
    if !filters.authors.is_empty() {
        query = query.filter(crawl_sources::origin.eq_any(filters.authors.clone()));
    }
    query = if filters.reverse {
        query.order(votes::created_at.desc())
    } else {
        query.order(votes::created_at.asc())
    };

    let rows: Vec<(VoteRecord, String)> = query
        .offset(filters.offset)
        .limit(filters.limit)
        .select((VoteRecord::as_select(), crawl_sources::origin))
        .load(&mut conn)
        .await?;
    drop(conn);

    let mut out = Vec::with_capacity(rows.len());
    for (record, source_origin) in rows {
        out.push(hydrate(store, &source_origin, record).await?);
    }
    Ok(out)
}

pub async fn get(store: &IndexStore, url: &str) -> Result<Option<VoteView>> {
    let (source_origin, pathname) = origin::split(url)?;
    match ingest_votes::get(store, &source_origin, &pathname).await? {
        Some(record) => Ok(Some(hydrate(store, &source_origin, record).await?)),
        None => Ok(None),
    }
}

/// `listVotes({subject})` (spec.md 4.6.2): the aggregate tally.
pub async fn tally(store: &IndexStore, subject: &str) -> Result<i64> {
    ingest_votes::tally(store, subject).await
}

/// `add(archive, payload)` (spec.md 6.4): one vote file per subject per
/// voter, keyed by the slugified subject URL so re-voting edits the same
/// file instead of accumulating duplicates.
pub async fn add(
    coordinator: &Arc<Coordinator>,
    archive: Arc<dyn ArchiveHandle>,
    payload: VotePayload,
) -> Result<String> {
    validate_payload(&payload)?;
    let slug = origin::slugify(&payload.subject);
    let pathname = format!("{ROOT_PATH}/{slug}.json");
    let body = serde_json::json!({
        "type": ingest_votes::MEDIA_TYPE,
        "subject": payload.subject,
        "vote": payload.vote,
        "createdAt": chrono::Utc::now().to_rfc3339(),
    });
    let bytes = serde_json::to_vec(&body)?;
    let url = format!("{}{pathname}", archive.url());
    super::write_and_crawl(coordinator, archive, &pathname, &bytes).await?;
    Ok(url)
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
    async fn add_then_tally_reflects_the_cast_vote() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let store = IndexStore::connect(&file.path().display().to_string())
            .await
            .unwrap();
        let coordinator = Coordinator::new(store.clone(), Arc::new(NoopDnsStore));
        let archive: Arc<dyn ArchiveHandle> = Arc::new(MemoryArchive::new("dat://a"));

        add(
            &coordinator,
            archive.clone(),
            VotePayload {
                subject: "https://example.com/posts/1".to_string(),
                vote: 1,
            },
        )
        .await
        .unwrap();

        coordinator.crawl(archive.as_ref()).await;

        let total = tally(&store, "https://example.com/posts/1").await.unwrap();
        assert_eq!(total, 1);
    }

    #[tokio::test]
    async fn add_rejects_an_out_of_range_vote() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let store = IndexStore::connect(&file.path().display().to_string())
            .await
            .unwrap();
        let coordinator = Coordinator::new(store.clone(), Arc::new(NoopDnsStore));
        let archive: Arc<dyn ArchiveHandle> = Arc::new(MemoryArchive::new("dat://a"));

        let result = add(
            &coordinator,
            archive,
            VotePayload {
                subject: "https://example.com/posts/1".to_string(),
                vote: 5,
            },
        )
        .await;
        assert!(matches!(result, Err(IndexError::ValidationFailed(_))));
    }
}
