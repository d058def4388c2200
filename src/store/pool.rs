//! Diesel-async connection factory for SQLite.
//!
//! SQLite connections are lightweight and file-based, so — as in the
//! teacher's `AsyncSqlitePool` — a new connection is opened per operation
//! rather than pooled. `SyncConnectionWrapper` runs the underlying
//! synchronous diesel driver on a blocking thread internally.

use diesel::sqlite::SqliteConnection;
use diesel_async::sync_connection_wrapper::SyncConnectionWrapper;
use diesel_async::AsyncConnection;

use crate::error::{IndexError, Result};

/// Async SQLite connection handle used throughout the store layer.
pub type AsyncSqliteConnection = SyncConnectionWrapper<SqliteConnection>;

/// Connection factory over a single SQLite database URL/path.
#[derive(Clone)]
pub struct Pool {
    database_url: String,
}

impl Pool {
    /// Build a pool from a `sqlite:`-prefixed URL or a bare file path.
    pub fn new(database_url: &str) -> Self {
        let url = database_url.strip_prefix("sqlite:").unwrap_or(database_url);
        Self {
            database_url: url.to_string(),
        }
    }

    /// Build a pool rooted at a file path.
    pub fn from_path(path: &std::path::Path) -> Self {
        Self::new(&path.display().to_string())
    }

    /// Open a fresh connection, with WAL mode and foreign keys enabled.
    pub async fn get(&self) -> Result<AsyncSqliteConnection> {
        let mut conn = AsyncSqliteConnection::establish(&self.database_url)
            .await
            .map_err(IndexError::Connection)?;
        apply_pragmas(&mut conn).await?;
        Ok(conn)
    }

    pub fn database_url(&self) -> &str {
        &self.database_url
    }
}

async fn apply_pragmas(conn: &mut AsyncSqliteConnection) -> Result<()> {
    use diesel::sql_query;
    use diesel_async::RunQueryDsl;

    for pragma in [
        "PRAGMA journal_mode = WAL",
        "PRAGMA synchronous = NORMAL",
        "PRAGMA foreign_keys = ON",
        "PRAGMA busy_timeout = 30000",
    ] {
        sql_query(pragma).execute(conn).await?;
    }
    Ok(())
}
