//! `follows` query surface (spec.md 4.6.1, 6.4): the address book built
//! from the single canonical `/data/follows.json` file.

use std::collections::HashSet;
use std::sync::Arc;

use crate::archive::{origin, ArchiveHandle};
use crate::coordinator::Coordinator;
use crate::error::Result;
use crate::ingest::follows as ingest_follows;
use crate::store::IndexStore;

use super::Author;

const CANONICAL_PATH: &str = "/data/follows.json";

/// `listFollows(origin)` (spec.md 4.6.1), author-hydrated.
pub async fn list(store: &IndexStore, origin_url: &str) -> Result<Vec<Author>> {
    let origin_url = origin::canonicalize(origin_url)?;
    let mut out = Vec::new();
    for dest in ingest_follows::list_dests(store, &origin_url).await? {
        out.push(super::hydrate_author(store, &dest).await?);
    }
    Ok(out)
}

/// `follow(archive, dest)` (spec.md 6.4): add `dest` to the caller's
/// follow set and re-crawl.
pub async fn follow(
    coordinator: &Arc<Coordinator>,
    archive: Arc<dyn ArchiveHandle>,
    dest: &str,
) -> Result<()> {
    let dest = origin::canonicalize(dest)?;
    let mut urls = read_urls(archive.as_ref()).await;
    if !urls.iter().any(|u| u == &dest) {
        urls.push(dest);
    }
    write_urls(coordinator, archive, urls).await
}

/// `unfollow(archive, dest)` (spec.md 6.4).
pub async fn unfollow(
    coordinator: &Arc<Coordinator>,
    archive: Arc<dyn ArchiveHandle>,
    dest: &str,
) -> Result<()> {
    let dest = origin::canonicalize(dest)?;
    let urls: Vec<String> = read_urls(archive.as_ref())
        .await
        .into_iter()
        .filter(|u| u != &dest)
        .collect();
    write_urls(coordinator, archive, urls).await
}

async fn read_urls(archive: &dyn ArchiveHandle) -> Vec<String> {
    match archive.read_file(CANONICAL_PATH).await {
        Ok(bytes) => serde_json::from_slice::<serde_json::Value>(&bytes)
            .ok()
            .and_then(|v| v.get("urls").cloned())
            .and_then(|v| serde_json::from_value::<Vec<String>>(v).ok())
            .unwrap_or_default(),
        Err(_) => Vec::new(),
    }
}

async fn write_urls(
    coordinator: &Arc<Coordinator>,
    archive: Arc<dyn ArchiveHandle>,
    urls: Vec<String>,
) -> Result<()> {
    let deduped: HashSet<String> = urls.into_iter().collect();
    let body = serde_json::json!({ "urls": deduped.into_iter().collect::<Vec<_>>() });
    let bytes = serde_json::to_vec(&body)?;
    super::write_and_crawl(coordinator, archive, CANONICAL_PATH, &bytes).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::memory::{MemoryArchive, NoopDnsStore};
    use crate::coordinator::Coordinator;

    #[tokio::test]
    async fn follow_then_unfollow_round_trips_through_a_crawl() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let store = IndexStore::connect(&file.path().display().to_string())
            .await
            .unwrap();
        let coordinator = Coordinator::new(store.clone(), Arc::new(NoopDnsStore));
        let archive: Arc<dyn ArchiveHandle> = Arc::new(MemoryArchive::new("dat://a"));

        follow(&coordinator, archive.clone(), "dat://b").await.unwrap();
        coordinator.crawl(archive.as_ref()).await;
        let authors = list(&store, "dat://a").await.unwrap();
        assert_eq!(authors.len(), 1);
        assert_eq!(authors[0].url, "dat://b");

        unfollow(&coordinator, archive.clone(), "dat://b").await.unwrap();
        coordinator.crawl(archive.as_ref()).await;
        let authors = list(&store, "dat://a").await.unwrap();
        assert!(authors.is_empty());
    }
}
