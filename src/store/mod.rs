//! C4 Index Store: connection pool, schema, migrations, named locks, and
//! the shared `CrawlSource`/checkpoint bookkeeping every dataset ingester
//! and the Coordinator build on.

pub mod dns;
pub mod fts;
pub mod locks;
pub mod migrations;
pub mod models;
pub mod pool;
pub mod schema;

pub use dns::DbDnsStore;

use chrono::Utc;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use crate::error::{IndexError, Result};
use locks::{LockGuard, LockRegistry};
use models::{CrawlSourceMetaRecord, CrawlSourceRecord, NewCrawlSource, NewCrawlSourceMeta};
use pool::{AsyncSqliteConnection, Pool};

/// Shared handle to the relational index. Cheap to clone — the pool opens
/// connections on demand and the lock registry is reference-counted.
#[derive(Clone)]
pub struct IndexStore {
    pool: Pool,
    locks: LockRegistry,
}

impl IndexStore {
    /// Open the store at `database_url`, applying any pending migrations.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = Pool::new(database_url);
        let mut conn = pool.get().await?;
        migrations::run_migrations(&mut conn).await?;
        Ok(Self {
            pool,
            locks: LockRegistry::new(),
        })
    }

    /// A fresh connection from the pool.
    pub async fn conn(&self) -> Result<AsyncSqliteConnection> {
        self.pool.get().await
    }

    /// Acquire a named lock (`crawl:<origin>`, `crawler:<dataset>:<origin>`).
    pub async fn lock(&self, name: &str) -> LockGuard {
        self.locks.lock(name).await
    }

    /// Resolve a `CrawlSource` by origin, inserting a new row on first
    /// encounter (spec.md 3, CrawlSource lifecycle).
    pub async fn resolve_source(&self, origin: &str) -> Result<CrawlSourceRecord> {
        use schema::crawl_sources::dsl;

        let mut conn = self.conn().await?;
        if let Some(existing) = dsl::crawl_sources
            .filter(dsl::origin.eq(origin))
            .first::<CrawlSourceRecord>(&mut conn)
            .await
            .optional()?
        {
            return Ok(existing);
        }

        let now = Utc::now().to_rfc3339();
        let new_source = NewCrawlSource {
            origin,
            dns_name_id: None,
            global_reset_required: false,
            created_at: &now,
        };
        diesel::insert_into(dsl::crawl_sources)
            .values(&new_source)
            .execute(&mut conn)
            .await
            .or_else(|e| {
                // Another concurrent resolve_source for the same origin won the
                // race; a lookup afterward will find it.
                if matches!(
                    &e,
                    diesel::result::Error::DatabaseError(
                        diesel::result::DatabaseErrorKind::UniqueViolation,
                        _
                    )
                ) {
                    Ok(0)
                } else {
                    Err(e)
                }
            })?;

        dsl::crawl_sources
            .filter(dsl::origin.eq(origin))
            .first::<CrawlSourceRecord>(&mut conn)
            .await
            .map_err(IndexError::from)
    }

    /// Mark a source as requiring a global reset (DNS-key change detected
    /// by the Coordinator, spec.md 4.1 step 4).
    pub async fn mark_global_reset_required(&self, source_id: i32) -> Result<()> {
        use schema::crawl_sources::dsl;
        let mut conn = self.conn().await?;
        diesel::update(dsl::crawl_sources.filter(dsl::id.eq(source_id)))
            .set(dsl::global_reset_required.eq(true))
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    /// Clear the reset flag and persist a new DNS binding id, once every
    /// dataset ingester has successfully observed the reset (spec.md 4.1
    /// step 6).
    pub async fn clear_global_reset_and_bind_dns(
        &self,
        source_id: i32,
        dns_name_id: Option<i32>,
    ) -> Result<()> {
        use schema::crawl_sources::dsl;
        let mut conn = self.conn().await?;
        diesel::update(dsl::crawl_sources.filter(dsl::id.eq(source_id)))
            .set((
                dsl::global_reset_required.eq(false),
                dsl::dns_name_id.eq(dns_name_id),
            ))
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    /// Delete a `CrawlSource` and (via `ON DELETE CASCADE`) every row
    /// derived from it. The re-crawl that rebuilds state is the caller's
    /// responsibility (spec.md 3, "Reset site").
    pub async fn reset_source(&self, origin: &str) -> Result<()> {
        use schema::crawl_sources::dsl;
        let mut conn = self.conn().await?;
        diesel::delete(dsl::crawl_sources.filter(dsl::origin.eq(origin)))
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    /// Load the checkpoint for `(source_id, dataset)`, if any.
    pub async fn checkpoint(
        &self,
        source_id: i32,
        dataset: &str,
    ) -> Result<Option<CrawlSourceMetaRecord>> {
        use schema::crawl_source_meta::dsl;
        let mut conn = self.conn().await?;
        dsl::crawl_source_meta
            .filter(dsl::source_id.eq(source_id))
            .filter(dsl::dataset.eq(dataset))
            .first::<CrawlSourceMetaRecord>(&mut conn)
            .await
            .optional()
            .map_err(IndexError::from)
    }

    /// Idempotent replace of the one-row-per-key checkpoint (spec.md 4.2,
    /// `doCheckpoint`).
    pub async fn write_checkpoint(
        &self,
        source_id: i32,
        dataset: &str,
        crawl_source_version: i64,
        crawl_dataset_version: i32,
    ) -> Result<()> {
        use schema::crawl_source_meta::dsl;
        let mut conn = self.conn().await?;
        let now = Utc::now().to_rfc3339();
        let record = NewCrawlSourceMeta {
            source_id,
            dataset,
            crawl_source_version,
            crawl_dataset_version,
            updated_at: &now,
        };
        diesel::insert_into(dsl::crawl_source_meta)
            .values(&record)
            .on_conflict((dsl::source_id, dsl::dataset))
            .do_update()
            .set(&record)
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    /// List every known source's origin and per-dataset checkpoint versions,
    /// for `Coordinator::listCrawlStates` (spec.md 4.1).
    pub async fn list_crawl_states(&self) -> Result<Vec<CrawlSourceState>> {
        use schema::{crawl_source_meta, crawl_sources};

        let mut conn = self.conn().await?;
        let sources = crawl_sources::table
            .select(CrawlSourceRecord::as_select())
            .load::<CrawlSourceRecord>(&mut conn)
            .await?;

        let mut states = Vec::with_capacity(sources.len());
        for source in sources {
            let metas = crawl_source_meta::table
                .filter(crawl_source_meta::source_id.eq(source.id))
                .select(CrawlSourceMetaRecord::as_select())
                .load::<CrawlSourceMetaRecord>(&mut conn)
                .await?;
            states.push(CrawlSourceState { source, metas });
        }
        Ok(states)
    }
}

/// One row of `Coordinator::listCrawlStates()`'s result.
pub struct CrawlSourceState {
    pub source: CrawlSourceRecord,
    pub metas: Vec<CrawlSourceMetaRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    // A fresh connection is opened per store operation (see `store::pool`),
    // so tests use a real temp-file database rather than `:memory:` — an
    // in-memory URL would hand each connection its own empty database.
    async fn temp_store() -> (tempfile::NamedTempFile, IndexStore) {
        let file = tempfile::NamedTempFile::new().unwrap();
        let store = IndexStore::connect(&file.path().display().to_string())
            .await
            .unwrap();
        (file, store)
    }

    #[tokio::test]
    async fn resolve_source_is_idempotent() {
        let (_file, store) = temp_store().await;
        let a = store.resolve_source("dat://a").await.unwrap();
        let b = store.resolve_source("dat://a").await.unwrap();
        assert_eq!(a.id, b.id);
    }

    #[tokio::test]
    async fn checkpoint_round_trips() {
        let (_file, store) = temp_store().await;
        let source = store.resolve_source("dat://a").await.unwrap();
        assert!(store.checkpoint(source.id, "posts").await.unwrap().is_none());

        store
            .write_checkpoint(source.id, "posts", 3, 1)
            .await
            .unwrap();
        let checkpoint = store
            .checkpoint(source.id, "posts")
            .await
            .unwrap()
            .expect("checkpoint was just written");
        assert_eq!(checkpoint.crawl_source_version, 3);

        // Replace, not duplicate.
        store
            .write_checkpoint(source.id, "posts", 5, 1)
            .await
            .unwrap();
        let checkpoint = store.checkpoint(source.id, "posts").await.unwrap().unwrap();
        assert_eq!(checkpoint.crawl_source_version, 5);
    }

    #[tokio::test]
    async fn reset_source_cascades() {
        let (_file, store) = temp_store().await;
        let source = store.resolve_source("dat://a").await.unwrap();
        store
            .write_checkpoint(source.id, "posts", 3, 1)
            .await
            .unwrap();

        store.reset_source("dat://a").await.unwrap();

        assert!(store
            .checkpoint(source.id, "posts")
            .await
            .unwrap()
            .is_none());
    }
}
