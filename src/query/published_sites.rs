//! `published-sites` query surface (spec.md 4.6.1, 6.3, 6.4): one file
//! per publishing hostname, each listing the origins published under it.

use std::collections::HashSet;
use std::sync::Arc;

use crate::archive::{origin, ArchiveHandle};
use crate::coordinator::Coordinator;
use crate::error::Result;
use crate::ingest::published_sites as ingest_published_sites;
use crate::store::IndexStore;

use super::Author;

fn path_for(hostname: &str) -> String {
    format!("/data/published-sites/{hostname}.json")
}

/// `listPublishedSites(origin)` (spec.md 4.6.1), author-hydrated.
pub async fn list(store: &IndexStore, origin_url: &str) -> Result<Vec<Author>> {
    let origin_url = origin::canonicalize(origin_url)?;
    let mut out = Vec::new();
    for dest in ingest_published_sites::list_dests(store, &origin_url).await? {
        out.push(super::hydrate_author(store, &dest).await?);
    }
    Ok(out)
}

/// `publish(archive, hostname, dest)` (spec.md 6.3, 6.4): add `dest` to
/// the set published under `hostname` on the caller's archive.
pub async fn publish(
    coordinator: &Arc<Coordinator>,
    archive: Arc<dyn ArchiveHandle>,
    hostname: &str,
    dest: &str,
) -> Result<()> {
    let dest = origin::canonicalize(dest)?;
    let pathname = path_for(hostname);
    let mut urls = read_urls(archive.as_ref(), &pathname).await;
    if !urls.iter().any(|u| u == &dest) {
        urls.push(dest);
    }
    write_urls(coordinator, archive, &pathname, urls).await
}

/// `unpublish(archive, hostname, dest)` (spec.md 6.3, 6.4).
pub async fn unpublish(
    coordinator: &Arc<Coordinator>,
    archive: Arc<dyn ArchiveHandle>,
    hostname: &str,
    dest: &str,
) -> Result<()> {
    let dest = origin::canonicalize(dest)?;
    let pathname = path_for(hostname);
    let urls: Vec<String> = read_urls(archive.as_ref(), &pathname)
        .await
        .into_iter()
        .filter(|u| u != &dest)
        .collect();
    write_urls(coordinator, archive, &pathname, urls).await
}

async fn read_urls(archive: &dyn ArchiveHandle, pathname: &str) -> Vec<String> {
    match archive.read_file(pathname).await {
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
    pathname: &str,
    urls: Vec<String>,
) -> Result<()> {
    let deduped: HashSet<String> = urls.into_iter().collect();
    let body = serde_json::json!({ "urls": deduped.into_iter().collect::<Vec<_>>() });
    let bytes = serde_json::to_vec(&body)?;
    super::write_and_crawl(coordinator, archive, pathname, &bytes).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::memory::{MemoryArchive, NoopDnsStore};
    use crate::coordinator::Coordinator;

    #[tokio::test]
    async fn publish_then_unpublish_round_trips_through_a_crawl() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let store = IndexStore::connect(&file.path().display().to_string())
            .await
            .unwrap();
        let coordinator = Coordinator::new(store.clone(), Arc::new(NoopDnsStore));
        let archive: Arc<dyn ArchiveHandle> = Arc::new(MemoryArchive::new("dat://a"));

        publish(&coordinator, archive.clone(), "example.com", "dat://b")
            .await
            .unwrap();
        coordinator.crawl(archive.as_ref()).await;
        let authors = list(&store, "dat://a").await.unwrap();
        assert_eq!(authors.len(), 1);
        assert_eq!(authors[0].url, "dat://b");

        unpublish(&coordinator, archive.clone(), "example.com", "dat://b")
            .await
            .unwrap();
        coordinator.crawl(archive.as_ref()).await;
        let authors = list(&store, "dat://a").await.unwrap();
        assert!(authors.is_empty());
    }
}
