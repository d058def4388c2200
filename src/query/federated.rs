//! Federated search (spec.md 4.6.3): trust-scoped, FTS-highlighted search
//! across the `sites`/`posts`/`bookmarks` datasets.

use diesel::sql_types::{BigInt, Text};
use diesel_async::RunQueryDsl;
use serde::Serialize;

use super::Author;
use crate::archive::origin;
use crate::error::Result;
use crate::ingest::follows;
use crate::store::fts;
use crate::store::IndexStore;

/// A dataset named in a federated search request (spec.md 4.6.3 inputs).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dataset {
    Sites,
    Posts,
    Bookmarks,
}

impl Dataset {
    fn parse(name: &str) -> Vec<Dataset> {
        match name {
            "sites" => vec![Dataset::Sites],
            "posts" => vec![Dataset::Posts],
            "bookmarks" => vec![Dataset::Bookmarks],
            _ => vec![Dataset::Sites, Dataset::Posts, Dataset::Bookmarks],
        }
    }
}

#[derive(Debug, Clone)]
pub struct FederatedQuery {
    pub acting_user: String,
    pub query: Option<String>,
    pub hops: u8,
    pub datasets: Vec<String>,
    pub since: i64,
    pub offset: i64,
    pub limit: i64,
}

impl Default for FederatedQuery {
    fn default() -> Self {
        Self {
            acting_user: String::new(),
            query: None,
            hops: 1,
            datasets: vec!["all".to_string()],
            since: 0,
            offset: 0,
            limit: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub url: String,
    pub dataset: &'static str,
    pub author: Author,
    pub title: String,
    pub snippet: String,
    pub crawled_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FederatedResults {
    pub highlight_nonce: u16,
    pub results: Vec<SearchHit>,
}

#[derive(diesel::QueryableByName, Debug)]
struct RawHit {
    #[diesel(sql_type = Text)]
    url_part: String,
    #[diesel(sql_type = Text)]
    author: String,
    #[diesel(sql_type = Text)]
    title: String,
    #[diesel(sql_type = Text)]
    snippet: String,
    #[diesel(sql_type = BigInt)]
    crawled_at: i64,
}

/// `search(query)` (spec.md 4.6.3): the full algorithm, steps 1-6.
pub async fn search(store: &IndexStore, params: FederatedQuery) -> Result<FederatedResults> {
    let nonce = fts::highlight_nonce();

    let acting_user = match origin::canonicalize(&params.acting_user) {
        Ok(u) => u,
        Err(_) => {
            return Ok(FederatedResults {
                highlight_nonce: nonce,
                results: Vec::new(),
            })
        }
    };

    // Step 1-2: resolve the trust set.
    let mut trust_set = vec![acting_user.clone()];
    if params.hops >= 2 {
        trust_set.extend(follows::list_dests(store, &acting_user).await?);
    }
    trust_set.sort();
    trust_set.dedup();

    // Step 3: sanitize the query text.
    let sanitized = params.query.as_deref().and_then(fts::sanitize_query);
    let (open, close) = fts::snippet_markers(nonce);

    let datasets: Vec<Dataset> = params
        .datasets
        .iter()
        .flat_map(|d| Dataset::parse(d))
        .collect::<std::collections::HashSet<_>>()
        .into_iter()
        .collect();

    let mut all_hits = Vec::new();
    for dataset in datasets {
        let raw = match dataset {
            Dataset::Posts => {
                search_dataset(
                    store,
                    "posts",
                    "posts_fts_index",
                    "body",
                    "''",
                    "body",
                    &trust_set,
                    sanitized.as_deref(),
                    &open,
                    &close,
                    params.since,
                    params.offset,
                    params.limit,
                )
                .await?
            }
            Dataset::Bookmarks => {
                search_dataset(
                    store,
                    "bookmarks",
                    "bookmarks_fts_index",
                    "title",
                    "description",
                    "title",
                    &trust_set,
                    sanitized.as_deref(),
                    &open,
                    &close,
                    params.since,
                    params.offset,
                    params.limit,
                )
                .await?
            }
            Dataset::Sites => {
                search_dataset(
                    store,
                    "site_descriptions",
                    "site_descriptions_fts_index",
                    "title",
                    "description",
                    "title",
                    &trust_set,
                    sanitized.as_deref(),
                    &open,
                    &close,
                    params.since,
                    params.offset,
                    params.limit,
                )
                .await?
            }
        };

        for hit in raw {
            let author = super::hydrate_author(store, &hit.author).await?;
            let url = if dataset == Dataset::Sites {
                hit.url_part
            } else {
                format!("{}{}", hit.author, hit.url_part)
            };
            all_hits.push(SearchHit {
                url,
                dataset: match dataset {
                    Dataset::Sites => "sites",
                    Dataset::Posts => "posts",
                    Dataset::Bookmarks => "bookmarks",
                },
                author,
                title: hit.title,
                snippet: hit.snippet,
                crawled_at: super::render_timestamp(hit.crawled_at),
            });
        }
    }

    // Step 6: merge, sort by crawledAt descending, truncate.
    all_hits.sort_by(|a, b| b.crawled_at.cmp(&a.crawled_at));
    all_hits.truncate(params.limit.max(0) as usize);

    Ok(FederatedResults {
        highlight_nonce: nonce,
        results: all_hits,
    })
}

/// Run the with-FTS or without-FTS variant of a single dataset's search
/// (spec.md 4.6.3 step 5). `url_col` names the column holding the part
/// that, combined with the author's origin, makes the final URL
/// (`pathname` for posts/bookmarks, `subject_url` for site descriptions,
/// which is already a full URL).
#[allow(clippy::too_many_arguments)]
async fn search_dataset(
    store: &IndexStore,
    table: &str,
    fts_table: &str,
    title_col: &str,
    snippet_col: &str,
    url_col: &str,
    trust_set: &[String],
    sanitized_query: Option<&str>,
    open: &str,
    close: &str,
    since: i64,
    offset: i64,
    limit: i64,
) -> Result<Vec<RawHit>> {
    let url_col = if table == "site_descriptions" {
        "subject_url"
    } else {
        url_col
    };

    // The trust set is built entirely from our own `origin::canonicalize`
    // output (`scheme://host[:port]`), which can never contain a quote, so
    // inlining it as a literal list is safe and avoids diesel's fixed-arity
    // `sql_query` bind chain fighting a dynamic-length `IN (...)`.
    let trust_list = trust_set
        .iter()
        .map(|o| format!("'{}'", o.replace('\'', "''")))
        .collect::<Vec<_>>()
        .join(",");

    if let Some(match_expr) = sanitized_query {
        let snippet_expr = if snippet_col == "''" {
            format!("snippet({fts_table}, 0, '{open}', '{close}', '...', 32)")
        } else {
            format!("snippet({fts_table}, 1, '{open}', '{close}', '...', 32)")
        };
        let sql = format!(
            "SELECT t.{url_col} AS url_part, crawl_sources.origin AS author, \
             t.{title_col} AS title, {snippet_expr} AS snippet, t.crawled_at AS crawled_at \
             FROM {fts_table} \
             JOIN {table} AS t ON t.id = {fts_table}.rowid \
             JOIN crawl_sources ON crawl_sources.id = t.source_id \
             WHERE {fts_table} MATCH ? AND crawl_sources.origin IN ({trust_list}) AND t.crawled_at >= ? \
             ORDER BY t.crawled_at DESC LIMIT ? OFFSET ?"
        );
        let query = diesel::sql_query(sql)
            .bind::<Text, _>(match_expr.to_string())
            .bind::<BigInt, _>(since)
            .bind::<BigInt, _>(limit)
            .bind::<BigInt, _>(offset);

        let mut conn = store.conn().await?;
        match query.get_results::<RawHit>(&mut conn).await {
            Ok(rows) => return Ok(rows),
            Err(e) => {
                tracing::warn!(table, error = %e, "federated search: FTS query failed, falling back to scan");
            }
        }
    }

    let sql = format!(
        "SELECT t.{url_col} AS url_part, crawl_sources.origin AS author, \
         t.{title_col} AS title, substr(t.{title_col}, 1, 200) AS snippet, t.crawled_at AS crawled_at \
         FROM {table} AS t \
         JOIN crawl_sources ON crawl_sources.id = t.source_id \
         WHERE crawl_sources.origin IN ({trust_list}) AND t.crawled_at >= ? \
         ORDER BY t.crawled_at DESC LIMIT ? OFFSET ?"
    );
    let query = diesel::sql_query(sql)
        .bind::<BigInt, _>(since)
        .bind::<BigInt, _>(limit)
        .bind::<BigInt, _>(offset);

    let mut conn = store.conn().await?;
    query.get_results::<RawHit>(&mut conn).await.map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::memory::MemoryArchive;
    use crate::coordinator::events::EventBus;
    use crate::ingest::DatasetIngester;

    #[tokio::test]
    async fn search_scopes_results_to_the_trust_set() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let store = IndexStore::connect(&file.path().display().to_string())
            .await
            .unwrap();
        let events = EventBus::new();

        let me = MemoryArchive::new("dat://me");
        me.put(
            "/data/posts/a.json",
            br#"{"type":"unwalled.garden/post","body":"hello rust world"}"#.to_vec(),
        );
        let me_source = store.resolve_source("dat://me").await.unwrap();
        crate::ingest::posts::PostsIngester
            .crawl_site(&me, &me_source, &store, &events)
            .await
            .unwrap();

        let stranger = MemoryArchive::new("dat://stranger");
        stranger.put(
            "/data/posts/b.json",
            br#"{"type":"unwalled.garden/post","body":"hello rust universe"}"#.to_vec(),
        );
        let stranger_source = store.resolve_source("dat://stranger").await.unwrap();
        crate::ingest::posts::PostsIngester
            .crawl_site(&stranger, &stranger_source, &store, &events)
            .await
            .unwrap();

        let params = FederatedQuery {
            acting_user: "dat://me".to_string(),
            query: Some("rust".to_string()),
            hops: 1,
            datasets: vec!["posts".to_string()],
            since: 0,
            offset: 0,
            limit: 20,
        };
        let results = search(&store, params).await.unwrap();
        assert_eq!(results.results.len(), 1);
        assert_eq!(results.results[0].author.url, "dat://me");
    }
}
