//! `DnsStore` (spec.md 3 "DNS Binding"; 6.1 `DNSStore`) backed by this
//! crate's own `dns_bindings` table.
//!
//! DNS *resolution* — actually turning a name into a key — is an external
//! collaborator out of scope (spec.md 1); what lives here is only the
//! bookkeeping the Coordinator consults to notice a key's bound name
//! changed (spec.md 4.1 step 4, "Detect DNS change").

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use crate::archive::{DnsBinding, DnsStore};
use crate::error::Result;

use super::models::{DnsBindingRecord, NewDnsBinding};
use super::schema::dns_bindings::dsl;
use super::IndexStore;

/// `DnsStore` implementation over the index's own `dns_bindings` table.
pub struct DbDnsStore {
    store: IndexStore,
}

impl DbDnsStore {
    pub fn new(store: IndexStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl DnsStore for DbDnsStore {
    async fn get_current_by_key(&self, key: &str) -> Result<Option<DnsBinding>> {
        let mut conn = self.store.conn().await?;
        let row = dsl::dns_bindings
            .filter(dsl::key.eq(key))
            .filter(dsl::is_current.eq(true))
            .order(dsl::last_confirmed_at.desc())
            .first::<DnsBindingRecord>(&mut conn)
            .await
            .optional()?;
        Ok(row.map(|r| DnsBinding {
            id: r.id,
            name: r.name,
            key: r.key,
        }))
    }

    /// Confirm that `name` currently resolves to `key` (spec.md 6.1,
    /// `update({name, key})`). The unique partial index on `(name) WHERE
    /// is_current` means at most one key can be current for a given name
    /// at a time, so any other row for this `name` is demoted first.
    async fn update(&self, name: &str, key: &str) -> Result<()> {
        let mut conn = self.store.conn().await?;
        let now = Utc::now().to_rfc3339();

        diesel::update(
            dsl::dns_bindings
                .filter(dsl::name.eq(name))
                .filter(dsl::key.ne(key)),
        )
        .set(dsl::is_current.eq(false))
        .execute(&mut conn)
        .await?;

        let existing = dsl::dns_bindings
            .filter(dsl::name.eq(name))
            .filter(dsl::key.eq(key))
            .first::<DnsBindingRecord>(&mut conn)
            .await
            .optional()?;

        match existing {
            Some(row) => {
                diesel::update(dsl::dns_bindings.filter(dsl::id.eq(row.id)))
                    .set((dsl::is_current.eq(true), dsl::last_confirmed_at.eq(&now)))
                    .execute(&mut conn)
                    .await?;
            }
            None => {
                let new_row = NewDnsBinding {
                    name,
                    key,
                    is_current: true,
                    first_confirmed_at: &now,
                    last_confirmed_at: &now,
                };
                diesel::insert_into(dsl::dns_bindings)
                    .values(&new_row)
                    .execute(&mut conn)
                    .await?;
            }
        }
        Ok(())
    }

    /// `unset(key)` (spec.md 6.1): the binding for `key` is no longer
    /// current (e.g. the archive daemon lost its DNS record).
    async fn unset(&self, key: &str) -> Result<()> {
        let mut conn = self.store.conn().await?;
        diesel::update(
            dsl::dns_bindings
                .filter(dsl::key.eq(key))
                .filter(dsl::is_current.eq(true)),
        )
        .set(dsl::is_current.eq(false))
        .execute(&mut conn)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn temp_store() -> (tempfile::NamedTempFile, IndexStore) {
        let file = tempfile::NamedTempFile::new().unwrap();
        let store = IndexStore::connect(&file.path().display().to_string())
            .await
            .unwrap();
        (file, store)
    }

    #[tokio::test]
    async fn update_then_get_current_round_trips() {
        let (_file, store) = temp_store().await;
        let dns = DbDnsStore::new(store);

        assert!(dns.get_current_by_key("key-a").await.unwrap().is_none());

        dns.update("alice.example", "key-a").await.unwrap();
        let binding = dns
            .get_current_by_key("key-a")
            .await
            .unwrap()
            .expect("binding recorded");
        assert_eq!(binding.name, "alice.example");
    }

    #[tokio::test]
    async fn rebinding_a_name_to_a_new_key_demotes_the_old_one() {
        let (_file, store) = temp_store().await;
        let dns = DbDnsStore::new(store);

        dns.update("alice.example", "key-old").await.unwrap();
        dns.update("alice.example", "key-new").await.unwrap();

        assert!(dns.get_current_by_key("key-old").await.unwrap().is_none());
        assert!(dns.get_current_by_key("key-new").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn unset_clears_the_current_flag() {
        let (_file, store) = temp_store().await;
        let dns = DbDnsStore::new(store);

        dns.update("alice.example", "key-a").await.unwrap();
        dns.unset("key-a").await.unwrap();
        assert!(dns.get_current_by_key("key-a").await.unwrap().is_none());
    }
}
