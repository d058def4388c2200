//! Query/debug HTTP surface over the engine (spec.md 4.6): a thin axum
//! veneer over `query::*`, plus the `ArchiveLoader`/`UserRegistry`
//! doubles `cli::serve` wires up when no embedding host supplies its
//! own (spec.md 6.1 - the archive daemon and active-user session are
//! external collaborators, out of scope here).
//!
//! Grounded on the teacher's `src/server/mod.rs` + `routes.rs` shape:
//! a cloneable `AppState`, a `create_router(state) -> Router`, and a
//! `serve()` that binds and runs it. Handlers return `axum::Json` on
//! success and map `IndexError` onto HTTP status via `IntoResponse`.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use async_trait::async_trait;
use serde::Deserialize;
use tower_http::cors::CorsLayer;

use crate::archive::{ArchiveHandle, UserRegistry};
use crate::coordinator::Coordinator;
use crate::error::IndexError;
use crate::query::{self, ListFilters};
use crate::scheduler::ArchiveLoader;
use crate::store::IndexStore;

/// `UserRegistry` double that always answers with a fixed, configured
/// origin (or none). Good enough for a single-installation debug
/// server; a real embedding host swaps this for one backed by its own
/// session store (spec.md 6.1).
pub struct StaticUserRegistry {
    origin: Option<String>,
}

impl StaticUserRegistry {
    pub fn new(origin: Option<String>) -> Self {
        Self { origin }
    }
}

#[async_trait]
impl UserRegistry for StaticUserRegistry {
    async fn active_user_origin(&self) -> Option<String> {
        self.origin.clone()
    }
}

/// `ArchiveLoader` double used when this crate runs standalone rather
/// than embedded behind a real archive daemon (spec.md 1, 6.1): every
/// resolution fails, so the scheduler logs a warning and moves on
/// rather than crawling anything.
pub struct UnavailableArchiveLoader;

#[async_trait]
impl ArchiveLoader for UnavailableArchiveLoader {
    async fn load(&self, _origin: &str) -> Option<Arc<dyn ArchiveHandle>> {
        None
    }
}

impl IntoResponse for IndexError {
    fn into_response(self) -> Response {
        let status = match &self {
            IndexError::InvalidArgument(_) | IndexError::InvalidUrl(_) => StatusCode::BAD_REQUEST,
            IndexError::NotFound(_) => StatusCode::NOT_FOUND,
            IndexError::ValidationFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
            IndexError::UniqueConstraint(_) => StatusCode::CONFLICT,
            IndexError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}

#[derive(Clone)]
pub struct AppState {
    store: IndexStore,
    coordinator: Arc<Coordinator>,
}

/// Build the router (spec.md 4.6): `list`/`get` per dataset, reactions,
/// federated search, and `listCrawlStates`/`resetSite` from the
/// Coordinator (spec.md 4.1). No mutation endpoints - writing into a
/// user's own archive needs a concrete `ArchiveHandle`, which this
/// debug surface doesn't have (see `cli.rs`'s note on `watch`/`crawl`).
pub fn create_router(store: IndexStore, coordinator: Arc<Coordinator>) -> Router {
    let state = AppState { store, coordinator };

    Router::new()
        .route("/api/health", get(health))
        .route("/api/sources", get(list_states))
        .route("/api/sources/:origin/reset", axum::routing::post(reset_site))
        .route("/api/posts", get(list_posts))
        .route("/api/posts/get", get(get_posts))
        .route("/api/bookmarks", get(list_bookmarks))
        .route("/api/bookmarks/get", get(get_bookmarks))
        .route("/api/discussions", get(list_discussions))
        .route("/api/discussions/get", get(get_discussions))
        .route("/api/comments", get(list_comments))
        .route("/api/comments/get", get(get_comments))
        .route("/api/media", get(list_media))
        .route("/api/media/get", get(get_media))
        .route("/api/votes", get(list_votes))
        .route("/api/votes/get", get(get_votes))
        .route("/api/votes/tally", get(tally_votes))
        .route("/api/site-descriptions", get(list_site_descriptions))
        .route("/api/follows", get(list_follows))
        .route("/api/published-sites", get(list_published_sites))
        .route("/api/reactions", get(list_reactions))
        .route("/api/search", get(search))
        .route("/api/suggestions", get(suggestions))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the HTTP query surface (spec.md 4.6, `Serve` CLI command).
pub async fn serve(store: IndexStore, coordinator: Arc<Coordinator>, addr: &str) -> anyhow::Result<()> {
    let app = create_router(store, coordinator);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn list_states(State(state): State<AppState>) -> Result<Json<serde_json::Value>, IndexError> {
    let states = state.coordinator.list_crawl_states().await?;
    let rows: Vec<_> = states
        .iter()
        .map(|s| {
            serde_json::json!({
                "origin": s.source.origin,
                "globalResetRequired": s.source.global_reset_required,
                "datasets": s.metas.iter().map(|m| serde_json::json!({
                    "dataset": m.dataset,
                    "crawlSourceVersion": m.crawl_source_version,
                    "crawlDatasetVersion": m.crawl_dataset_version,
                    "updatedAt": m.updated_at,
                })).collect::<Vec<_>>(),
            })
        })
        .collect();
    Ok(Json(serde_json::json!(rows)))
}

async fn reset_site(
    State(state): State<AppState>,
    Path(origin): Path<String>,
) -> Result<StatusCode, IndexError> {
    state.coordinator.reset_site(&origin).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Common `list(filters)` query-string shape (spec.md 4.6.1).
#[derive(Debug, Deserialize, Default)]
struct ListParams {
    author: Option<String>,
    #[serde(default)]
    tag: Vec<String>,
    offset: Option<i64>,
    limit: Option<i64>,
    #[serde(default)]
    reverse: bool,
}

impl From<ListParams> for ListFilters {
    fn from(p: ListParams) -> Self {
        let mut filters = ListFilters::new();
        if let Some(author) = p.author {
            filters.authors = vec![author];
        }
        filters.tags = p.tag;
        if let Some(offset) = p.offset {
            filters.offset = offset;
        }
        if let Some(limit) = p.limit {
            filters.limit = limit;
        }
        filters.reverse = p.reverse;
        filters
    }
}

#[derive(Debug, Deserialize)]
struct UrlParam {
    url: String,
}

macro_rules! list_handler {
    ($name:ident, $module:path) => {
        async fn $name(
            State(state): State<AppState>,
            Query(params): Query<ListParams>,
        ) -> Result<Json<serde_json::Value>, IndexError> {
            let rows = $module(&state.store, params.into()).await?;
            Ok(Json(serde_json::json!(rows)))
        }
    };
}

macro_rules! get_handler {
    ($name:ident, $module:path) => {
        async fn $name(
            State(state): State<AppState>,
            Query(params): Query<UrlParam>,
        ) -> Result<Json<serde_json::Value>, IndexError> {
            let row = $module(&state.store, &params.url).await?;
            Ok(Json(serde_json::json!(row)))
        }
    };
}

list_handler!(list_posts, query::posts::list);
get_handler!(get_posts, query::posts::get);
list_handler!(list_bookmarks, query::bookmarks::list);
get_handler!(get_bookmarks, query::bookmarks::get);
list_handler!(list_discussions, query::discussions::list);
get_handler!(get_discussions, query::discussions::get);
list_handler!(list_comments, query::comments::list);
get_handler!(get_comments, query::comments::get);
list_handler!(list_media, query::media::list);
get_handler!(get_media, query::media::get);
list_handler!(list_votes, query::votes::list);
get_handler!(get_votes, query::votes::get);

async fn tally_votes(
    State(state): State<AppState>,
    Query(params): Query<TopicParam>,
) -> Result<Json<serde_json::Value>, IndexError> {
    let total = query::votes::tally(&state.store, &params.topic).await?;
    Ok(Json(serde_json::json!({ "subject": params.topic, "tally": total })))
}
list_handler!(list_site_descriptions, query::site_descriptions::list);

#[derive(Debug, Deserialize)]
struct OriginParam {
    origin: String,
}

async fn list_follows(
    State(state): State<AppState>,
    Query(params): Query<OriginParam>,
) -> Result<Json<serde_json::Value>, IndexError> {
    let rows = query::follows::list(&state.store, &params.origin).await?;
    Ok(Json(serde_json::json!(rows)))
}

async fn list_published_sites(
    State(state): State<AppState>,
    Query(params): Query<OriginParam>,
) -> Result<Json<serde_json::Value>, IndexError> {
    let rows = query::published_sites::list(&state.store, &params.origin).await?;
    Ok(Json(serde_json::json!(rows)))
}

#[derive(Debug, Deserialize)]
struct TopicParam {
    topic: String,
}

async fn list_reactions(
    State(state): State<AppState>,
    Query(params): Query<TopicParam>,
) -> Result<Json<serde_json::Value>, IndexError> {
    let rows = query::reactions::list(&state.store, &params.topic).await?;
    Ok(Json(serde_json::json!(rows)))
}

/// `/api/search` query-string shape (spec.md 4.6.3 inputs).
#[derive(Debug, Deserialize)]
struct SearchParams {
    user: String,
    q: Option<String>,
    #[serde(default = "default_hops")]
    hops: u8,
    #[serde(default)]
    dataset: Vec<String>,
    #[serde(default)]
    since: i64,
    offset: Option<i64>,
    limit: Option<i64>,
}

fn default_hops() -> u8 {
    1
}

async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<query::federated::FederatedResults>, IndexError> {
    let query = query::federated::FederatedQuery {
        acting_user: params.user,
        query: params.q,
        hops: params.hops,
        datasets: if params.dataset.is_empty() {
            vec!["all".to_string()]
        } else {
            params.dataset
        },
        since: params.since,
        offset: params.offset.unwrap_or(0),
        limit: params.limit.unwrap_or(crate::config::DEFAULT_QUERY_LIMIT),
    };
    let results = query::federated::search(&state.store, query).await?;
    Ok(Json(results))
}

#[derive(Debug, Deserialize)]
struct SuggestionsParams {
    user: String,
    q: Option<String>,
    #[serde(default)]
    filter_pins: bool,
}

/// `/api/suggestions` (spec.md 4.6.4): this debug surface has no
/// bookmarks/history/library collaborators wired in, so it answers
/// with the follows-only slice of the composition (address book).
async fn suggestions(
    State(state): State<AppState>,
    Query(params): Query<SuggestionsParams>,
) -> Result<Json<serde_json::Value>, IndexError> {
    let address_book = query::follows::list(&state.store, &params.user).await?;
    let query_lower = params.q.unwrap_or_default().to_lowercase();
    let matches: Vec<_> = address_book
        .into_iter()
        .filter(|a| {
            query_lower.is_empty()
                || a.url.to_lowercase().contains(&query_lower)
                || a.title.to_lowercase().contains(&query_lower)
        })
        .collect();
    let _ = params.filter_pins;
    Ok(Json(serde_json::json!(matches)))
}
