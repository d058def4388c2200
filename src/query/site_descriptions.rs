//! `site-descriptions` query surface (spec.md 4.6.1, 4.6.2; "getBest").

use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::ListFilters;
use crate::archive::origin;
use crate::error::Result;
use crate::store::models::SiteDescriptionRecord;
use crate::store::schema::{crawl_sources, site_descriptions};
use crate::store::IndexStore;

/// `get(url)` (spec.md 4.6.2): the description a specific source has on
/// file about `subject_url`.
pub async fn get(
    store: &IndexStore,
    source_origin: &str,
    subject_url: &str,
) -> Result<Option<SiteDescriptionRecord>> {
    crate::ingest::site_descriptions::get(store, source_origin, subject_url).await
}

/// `SiteDescription.getBest({subject})` (spec.md 4.6.1): the description
/// of `subject_url` this index trusts most — the subject's own
/// self-description if indexed, otherwise the most recently crawled
/// description captured by any other source. Query-time hydration
/// tolerates a subject that hasn't been crawled yet by returning `None`
/// (spec.md 5).
pub async fn get_best(store: &IndexStore, subject_url: &str) -> Result<Option<SiteDescriptionRecord>> {
    let canonical = origin::canonicalize(subject_url)?;

    if let Some(row) = get(store, &canonical, &canonical).await? {
        return Ok(Some(row));
    }

    let mut conn = store.conn().await?;
    site_descriptions::table
        .filter(site_descriptions::subject_url.eq(&canonical))
        .order(site_descriptions::crawled_at.desc())
        .select(SiteDescriptionRecord::as_select())
        .first(&mut conn)
        .await
        .optional()
        .map_err(Into::into)
}

/// `list(filters)` (spec.md 4.6.1): every known description of any
/// subject, optionally scoped to a set of authoring sources.
pub async fn list(store: &IndexStore, filters: ListFilters) -> Result<Vec<SiteDescriptionRecord>> {
    let filters = filters.validated()?;
    let mut conn = store.conn().await?;

    let mut query = site_descriptions::table
        .inner_join(crawl_sources::table)
        .into_boxed();
    if !filters.authors.is_empty() {
        query = query.filter(crawl_sources::origin.eq_any(filters.authors.clone()));
    }
    query = if filters.reverse {
        query.order(site_descriptions::created_at.desc())
    } else {
        query.order(site_descriptions::created_at.asc())
    };

    query
        .offset(filters.offset)
        .limit(filters.limit)
        .select(SiteDescriptionRecord::as_select())
        .load(&mut conn)
        .await
        .map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::memory::MemoryArchive;
    use crate::coordinator::events::EventBus;
    use crate::ingest::DatasetIngester;

    #[tokio::test]
    async fn get_best_prefers_self_description() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let store = IndexStore::connect(&file.path().display().to_string())
            .await
            .unwrap();
        let events = EventBus::new();

        let subject = MemoryArchive::new("dat://subject");
        subject.put(
            "/dat.json",
            br#"{"title":"Subject's Own Site","description":"self"}"#.to_vec(),
        );
        let subject_source = store.resolve_source("dat://subject").await.unwrap();
        crate::ingest::site_descriptions::SiteDescriptionsIngester
            .crawl_site(&subject, &subject_source, &store, &events)
            .await
            .unwrap();

        let reporter = MemoryArchive::new("dat://reporter");
        reporter.put(
            "/data/known_sites/subject/dat.json",
            br#"{"title":"Reported Name"}"#.to_vec(),
        );
        let reporter_source = store.resolve_source("dat://reporter").await.unwrap();
        crate::ingest::site_descriptions::SiteDescriptionsIngester
            .crawl_site(&reporter, &reporter_source, &store, &events)
            .await
            .unwrap();

        let best = get_best(&store, "dat://subject").await.unwrap().unwrap();
        assert_eq!(best.title, "Subject's Own Site");
    }

    #[tokio::test]
    async fn get_best_falls_back_to_a_captured_description() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let store = IndexStore::connect(&file.path().display().to_string())
            .await
            .unwrap();
        let events = EventBus::new();

        let reporter = MemoryArchive::new("dat://reporter");
        reporter.put(
            "/data/known_sites/subject/dat.json",
            br#"{"title":"Reported Name"}"#.to_vec(),
        );
        let reporter_source = store.resolve_source("dat://reporter").await.unwrap();
        crate::ingest::site_descriptions::SiteDescriptionsIngester
            .crawl_site(&reporter, &reporter_source, &store, &events)
            .await
            .unwrap();

        let best = get_best(&store, "dat://subject").await.unwrap().unwrap();
        assert_eq!(best.title, "Reported Name");
    }
}
