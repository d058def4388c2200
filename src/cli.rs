//! Command-line entry point. A debug/ops shell over the engine: bring up
//! the index (`init`/`migrate`), inspect it (`list-states`, `list`,
//! `get`, `search`, `reactions`), and run the query/debug HTTP surface
//! plus the scheduler as a long-lived process (`serve`).
//!
//! `watch`/`crawl` of a specific archive are deliberately absent here —
//! they need a concrete `ArchiveHandle`, and the archive daemon that
//! produces one is an external collaborator out of scope for this crate
//! (spec.md 1, 6.1). A host embedding `arcindex` as a library wires its
//! own loader; see `scheduler::ArchiveLoader`.

use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};

use crate::config::{self, LoadOptions, Settings};
use crate::coordinator::Coordinator;
use crate::query::{self, ListFilters};
use crate::store::{DbDnsStore, IndexStore};

/// Check if verbose mode is enabled (for early logging setup, before
/// `Cli::parse()` has a chance to run).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Parser)]
#[command(name = "arcindex")]
#[command(about = "Crawl-and-index core for a peer-to-peer social web browser")]
#[command(version)]
pub struct Cli {
    /// Data directory override (holds the index database and archive root).
    #[arg(long, short = 'd', global = true)]
    data: Option<String>,

    /// Resolve relative config paths from the current directory instead of
    /// the discovered config file's directory.
    #[arg(long, global = true)]
    cwd: bool,

    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output machine-readable JSON instead of a table.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum Dataset {
    Posts,
    Bookmarks,
    Discussions,
    Comments,
    Media,
    Votes,
    SiteDescriptions,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the data directory and apply pending migrations.
    Init,

    /// Inspect or force the database migration state.
    Migrate {
        /// Only report whether migrations are pending; don't apply them.
        #[arg(long)]
        check: bool,
    },

    /// List every known `CrawlSource` and its per-dataset checkpoints.
    ListStates,

    /// Delete a `CrawlSource` and every row derived from it.
    ResetSite {
        /// Canonical origin to reset, e.g. `hyper://<key>`.
        origin: String,
    },

    /// List records of one dataset.
    List {
        #[arg(value_enum)]
        dataset: Dataset,
        /// Filter to one author origin.
        #[arg(long)]
        author: Option<String>,
        /// Require this tag (repeatable; AND semantics).
        #[arg(long = "tag")]
        tags: Vec<String>,
        #[arg(long, default_value_t = config::DEFAULT_QUERY_LIMIT)]
        limit: i64,
        #[arg(long, default_value_t = 0)]
        offset: i64,
        #[arg(long)]
        reverse: bool,
    },

    /// Fetch a single record by its full URL.
    Get {
        #[arg(value_enum)]
        dataset: Dataset,
        url: String,
    },

    /// Reactions on a topic URL, grouped by emoji.
    Reactions { topic: String },

    /// Federated, trust-scoped full-text search (spec.md 4.6.3).
    Search {
        query: Option<String>,
        /// Acting user's origin. Defaults to the configured active user.
        #[arg(long)]
        user: Option<String>,
        #[arg(long, default_value_t = 1)]
        hops: u8,
        /// Subset of sites,posts,bookmarks,all (repeatable).
        #[arg(long = "dataset")]
        datasets: Vec<String>,
        #[arg(long, default_value_t = 0)]
        since: i64,
        #[arg(long, default_value_t = config::DEFAULT_QUERY_LIMIT)]
        limit: i64,
        #[arg(long, default_value_t = 0)]
        offset: i64,
    },

    /// Print the resolved configuration.
    Config,

    /// Run the HTTP query surface and the crawl scheduler.
    Serve {
        /// Bind address, overriding the configured `listen_addr`.
        bind: Option<String>,
    },
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (settings, _config) = config::load_settings_with_options(LoadOptions {
        data: cli.data.clone(),
        use_cwd: cli.cwd,
    })
    .await;

    match cli.command {
        Commands::Init => cmd_init(&settings).await,
        Commands::Migrate { check } => cmd_migrate(&settings, check).await,
        Commands::ListStates => cmd_list_states(&settings, cli.json).await,
        Commands::ResetSite { origin } => cmd_reset_site(&settings, &origin).await,
        Commands::List {
            dataset,
            author,
            tags,
            limit,
            offset,
            reverse,
        } => {
            let mut filters = ListFilters::new();
            if let Some(a) = author {
                filters.authors = vec![a];
            }
            filters.tags = tags;
            filters.limit = limit;
            filters.offset = offset;
            filters.reverse = reverse;
            cmd_list(&settings, dataset, filters, cli.json).await
        }
        Commands::Get { dataset, url } => cmd_get(&settings, dataset, &url, cli.json).await,
        Commands::Reactions { topic } => cmd_reactions(&settings, &topic, cli.json).await,
        Commands::Search {
            query,
            user,
            hops,
            datasets,
            since,
            limit,
            offset,
        } => {
            let acting_user = user
                .or_else(|| settings.active_user_origin.clone())
                .ok_or_else(|| anyhow::anyhow!("--user is required (no active_user_origin configured)"))?;
            let params = crate::query::federated::FederatedQuery {
                acting_user,
                query,
                hops,
                datasets: if datasets.is_empty() {
                    vec!["all".to_string()]
                } else {
                    datasets
                },
                since,
                offset,
                limit,
            };
            cmd_search(&settings, params, cli.json).await
        }
        Commands::Config => cmd_print_config(&settings),
        Commands::Serve { bind } => cmd_serve(&settings, bind.as_deref()).await,
    }
}

async fn connect(settings: &Settings) -> anyhow::Result<IndexStore> {
    settings.ensure_directories()?;
    let store = IndexStore::connect(&settings.database_url()).await?;
    Ok(store)
}

async fn cmd_init(settings: &Settings) -> anyhow::Result<()> {
    let existed = settings.database_exists();
    let _store = connect(settings).await?;
    println!(
        "{} arcindex data directory ready: {}",
        if existed { "updated" } else { "created" },
        settings.data_dir.display()
    );
    println!("database: {}", settings.database_path().display());
    Ok(())
}

async fn cmd_migrate(settings: &Settings, check: bool) -> anyhow::Result<()> {
    if check {
        let existed = settings.database_exists();
        if !existed {
            println!("database not initialized: {}", settings.database_path().display());
            return Ok(());
        }
    }
    let _store = connect(settings).await?;
    println!("migrations applied: {}", settings.database_path().display());
    Ok(())
}

async fn cmd_list_states(settings: &Settings, json: bool) -> anyhow::Result<()> {
    let store = connect(settings).await?;
    let states = store.list_crawl_states().await?;

    if json {
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
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if states.is_empty() {
        println!("no known sources");
    }
    for state in states {
        println!("{}", state.source.origin);
        for meta in &state.metas {
            println!(
                "  {:<20} source_version={:<8} dataset_version={}",
                meta.dataset, meta.crawl_source_version, meta.crawl_dataset_version
            );
        }
    }
    Ok(())
}

async fn cmd_reset_site(settings: &Settings, origin: &str) -> anyhow::Result<()> {
    let store = connect(settings).await?;
    let dns = Arc::new(DbDnsStore::new(store.clone()));
    let coordinator = Coordinator::new(store, dns);
    coordinator.reset_site(origin).await?;
    println!("reset {origin}");
    Ok(())
}

async fn cmd_list(
    settings: &Settings,
    dataset: Dataset,
    filters: ListFilters,
    json: bool,
) -> anyhow::Result<()> {
    let store = connect(settings).await?;
    match dataset {
        Dataset::Posts => print_rows(query::posts::list(&store, filters).await?, json),
        Dataset::Bookmarks => print_rows(query::bookmarks::list(&store, filters).await?, json),
        Dataset::Discussions => print_rows(query::discussions::list(&store, filters).await?, json),
        Dataset::Comments => print_rows(query::comments::list(&store, filters).await?, json),
        Dataset::Media => print_rows(query::media::list(&store, filters).await?, json),
        Dataset::Votes => print_rows(query::votes::list(&store, filters).await?, json),
        Dataset::SiteDescriptions => {
            print_rows(query::site_descriptions::list(&store, filters).await?, json)
        }
    }
    Ok(())
}

async fn cmd_get(settings: &Settings, dataset: Dataset, url: &str, json: bool) -> anyhow::Result<()> {
    let store = connect(settings).await?;
    match dataset {
        Dataset::Posts => print_one(query::posts::get(&store, url).await?, json),
        Dataset::Bookmarks => print_one(query::bookmarks::get(&store, url).await?, json),
        Dataset::Discussions => print_one(query::discussions::get(&store, url).await?, json),
        Dataset::Comments => print_one(query::comments::get(&store, url).await?, json),
        Dataset::Media => print_one(query::media::get(&store, url).await?, json),
        Dataset::Votes => print_one(query::votes::get(&store, url).await?, json),
        Dataset::SiteDescriptions => {
            let (source_origin, _) = crate::archive::origin::split(url)?;
            print_one(
                query::site_descriptions::get(&store, &source_origin, url).await?,
                json,
            )
        }
    }
    Ok(())
}

async fn cmd_reactions(settings: &Settings, topic: &str, json: bool) -> anyhow::Result<()> {
    let store = connect(settings).await?;
    let groups = query::reactions::list(&store, topic).await?;
    print_rows(groups, json);
    Ok(())
}

async fn cmd_search(
    settings: &Settings,
    params: crate::query::federated::FederatedQuery,
    json: bool,
) -> anyhow::Result<()> {
    let store = connect(settings).await?;
    let results = query::federated::search(&store, params).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }
    println!("highlight nonce: {}", results.highlight_nonce);
    for hit in results.results {
        println!("[{}] {} - {}", hit.dataset, hit.title, hit.url);
        println!("    by {} at {}", hit.author.title, hit.crawled_at);
        println!("    {}", hit.snippet);
    }
    Ok(())
}

fn cmd_print_config(settings: &Settings) -> anyhow::Result<()> {
    println!("data_dir:      {}", settings.data_dir.display());
    println!("database:      {}", settings.database_url());
    println!("archive_root:  {}", settings.archive_root.display());
    println!(
        "active_user:   {}",
        settings.active_user_origin.as_deref().unwrap_or("(none)")
    );
    println!("tick_interval: {}s", settings.tick_interval_secs);
    println!("debounce:      {}s", settings.debounce_secs);
    println!("query_limit:   {}", settings.query_limit);
    println!("max_hops:      {}", settings.max_hops);
    println!("listen_addr:   {}", settings.listen_addr);
    Ok(())
}

async fn cmd_serve(settings: &Settings, bind: Option<&str>) -> anyhow::Result<()> {
    let store = connect(settings).await?;
    let dns = Arc::new(DbDnsStore::new(store.clone()));
    let coordinator = Coordinator::new(store.clone(), dns);

    let users: Arc<dyn crate::archive::UserRegistry> =
        Arc::new(crate::server::StaticUserRegistry::new(
            settings.active_user_origin.clone(),
        ));
    let loader: Arc<dyn crate::scheduler::ArchiveLoader> =
        Arc::new(crate::server::UnavailableArchiveLoader);
    let scheduler = crate::scheduler::Scheduler::new(
        store.clone(),
        Arc::clone(&coordinator),
        users,
        loader,
    );
    tokio::spawn(Arc::new(scheduler).run());

    let addr = bind.unwrap_or(&settings.listen_addr);
    println!("arcindex query surface listening on http://{addr}");
    crate::server::serve(store, coordinator, addr).await
}

fn print_rows<T: serde::Serialize + std::fmt::Debug>(rows: Vec<T>, json: bool) {
    if json {
        match serde_json::to_string_pretty(&rows) {
            Ok(s) => println!("{s}"),
            Err(e) => eprintln!("failed to serialize results: {e}"),
        }
        return;
    }
    if rows.is_empty() {
        println!("no results");
    }
    for row in rows {
        match serde_json::to_string(&row) {
            Ok(s) => println!("{s}"),
            Err(_) => println!("{row:?}"),
        }
    }
}

fn print_one<T: serde::Serialize + std::fmt::Debug>(row: Option<T>, json: bool) {
    match row {
        Some(r) => print_rows(vec![r], json),
        None => println!("not found"),
    }
}
