//! `reactions` query surface (spec.md 4.3.4, 4.6, 6.4): thin wrapper over
//! the ingester's aggregation and read-modify-write helpers.

use std::sync::Arc;

use crate::archive::ArchiveHandle;
use crate::coordinator::Coordinator;
use crate::error::Result;
use crate::ingest::reactions as ingest_reactions;
pub use crate::ingest::reactions::ReactionGroup;
use crate::store::IndexStore;

/// `listReactions(topic)` (spec.md 4.3.4).
pub async fn list(store: &IndexStore, topic: &str) -> Result<Vec<ReactionGroup>> {
    ingest_reactions::list_reactions(store, topic).await
}

/// `addReaction(archive, topic, emoji)` (spec.md 4.3.4, 6.4): the ingester
/// performs the read-modify-write under its own named lock; this layer
/// enqueues the crawl so the caller observes their own reaction indexed.
pub async fn add_reaction(
    store: &IndexStore,
    coordinator: &Arc<Coordinator>,
    archive: Arc<dyn ArchiveHandle>,
    topic: &str,
    emoji: &str,
) -> Result<()> {
    ingest_reactions::set_reaction(store, archive.as_ref(), topic, emoji, true).await?;
    coordinator.enqueue_crawl(archive);
    Ok(())
}

/// `removeReaction(archive, topic, emoji)` (spec.md 4.3.4, 6.4).
pub async fn remove_reaction(
    store: &IndexStore,
    coordinator: &Arc<Coordinator>,
    archive: Arc<dyn ArchiveHandle>,
    topic: &str,
    emoji: &str,
) -> Result<()> {
    ingest_reactions::set_reaction(store, archive.as_ref(), topic, emoji, false).await?;
    coordinator.enqueue_crawl(archive);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::memory::{MemoryArchive, NoopDnsStore};
    use crate::coordinator::Coordinator;

    #[tokio::test]
    async fn add_then_remove_reaction_round_trips_through_a_crawl() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let store = IndexStore::connect(&file.path().display().to_string())
            .await
            .unwrap();
        let coordinator = Coordinator::new(store.clone(), Arc::new(NoopDnsStore));
        let archive: Arc<dyn ArchiveHandle> = Arc::new(MemoryArchive::new("dat://a"));

        add_reaction(&store, &coordinator, archive.clone(), "https://x.com/p", "👍")
            .await
            .unwrap();
        coordinator.crawl(archive.as_ref()).await;
        let groups = list(&store, "https://x.com/p").await.unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].emoji, "👍");

        remove_reaction(&store, &coordinator, archive.clone(), "https://x.com/p", "👍")
            .await
            .unwrap();
        coordinator.crawl(archive.as_ref()).await;
        let groups = list(&store, "https://x.com/p").await.unwrap();
        assert!(groups.is_empty());
    }
}
