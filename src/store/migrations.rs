//! Versioned schema migrations gated on SQLite's `PRAGMA user_version`.
//!
//! Grounded on the teacher's `repository/document/schema.rs::migrate_storage`
//! staircase: each step is guarded by `if current_version < N`, and a
//! `tolerant` step swallows per-statement errors instead of propagating them,
//! to survive historical rollout mistakes. Unlike the teacher (raw
//! `rusqlite::Connection`), statements here run through the async diesel
//! connection via `diesel::sql_query`, since this crate's connection layer
//! is diesel-async end to end.

use diesel::sql_query;
use diesel_async::RunQueryDsl;

use crate::error::{IndexError, Result};
use crate::store::pool::AsyncSqliteConnection;

/// One migration step. `up_sql` statements run in order; if `tolerant` is
/// false, the first failing statement aborts migration with
/// [`IndexError::MigrationFailed`].
struct Migration {
    version: i64,
    up_sql: &'static [&'static str],
    tolerant: bool,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        tolerant: false,
        up_sql: &[
            r#"CREATE TABLE IF NOT EXISTS crawl_sources (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                origin TEXT NOT NULL,
                dns_name_id INTEGER,
                global_reset_required BOOLEAN NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            )"#,
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_crawl_sources_origin ON crawl_sources(origin)",
            r#"CREATE TABLE IF NOT EXISTS crawl_source_meta (
                source_id INTEGER NOT NULL,
                dataset TEXT NOT NULL,
                crawl_source_version INTEGER NOT NULL,
                crawl_dataset_version INTEGER NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (source_id, dataset),
                FOREIGN KEY (source_id) REFERENCES crawl_sources(id) ON DELETE CASCADE
            )"#,
            r#"CREATE TABLE IF NOT EXISTS tags (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL
            )"#,
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_tags_name ON tags(name)",
            r#"CREATE TABLE IF NOT EXISTS posts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source_id INTEGER NOT NULL,
                pathname TEXT NOT NULL,
                body TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                crawled_at INTEGER NOT NULL,
                FOREIGN KEY (source_id) REFERENCES crawl_sources(id) ON DELETE CASCADE
            )"#,
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_posts_source_pathname ON posts(source_id, pathname)",
            "CREATE INDEX IF NOT EXISTS idx_posts_created_at ON posts(created_at)",
            r#"CREATE TABLE IF NOT EXISTS post_tags (
                post_id INTEGER NOT NULL,
                tag_id INTEGER NOT NULL,
                PRIMARY KEY (post_id, tag_id),
                FOREIGN KEY (post_id) REFERENCES posts(id) ON DELETE CASCADE,
                FOREIGN KEY (tag_id) REFERENCES tags(id) ON DELETE CASCADE
            )"#,
            r#"CREATE TABLE IF NOT EXISTS bookmarks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source_id INTEGER NOT NULL,
                pathname TEXT NOT NULL,
                href TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT NOT NULL,
                pinned BOOLEAN NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                crawled_at INTEGER NOT NULL,
                FOREIGN KEY (source_id) REFERENCES crawl_sources(id) ON DELETE CASCADE
            )"#,
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_bookmarks_source_pathname ON bookmarks(source_id, pathname)",
            "CREATE INDEX IF NOT EXISTS idx_bookmarks_created_at ON bookmarks(created_at)",
            r#"CREATE TABLE IF NOT EXISTS bookmark_tags (
                bookmark_id INTEGER NOT NULL,
                tag_id INTEGER NOT NULL,
                PRIMARY KEY (bookmark_id, tag_id),
                FOREIGN KEY (bookmark_id) REFERENCES bookmarks(id) ON DELETE CASCADE,
                FOREIGN KEY (tag_id) REFERENCES tags(id) ON DELETE CASCADE
            )"#,
            r#"CREATE TABLE IF NOT EXISTS discussions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source_id INTEGER NOT NULL,
                pathname TEXT NOT NULL,
                title TEXT NOT NULL,
                body TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                crawled_at INTEGER NOT NULL,
                FOREIGN KEY (source_id) REFERENCES crawl_sources(id) ON DELETE CASCADE
            )"#,
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_discussions_source_pathname ON discussions(source_id, pathname)",
            "CREATE INDEX IF NOT EXISTS idx_discussions_created_at ON discussions(created_at)",
            r#"CREATE TABLE IF NOT EXISTS discussion_tags (
                discussion_id INTEGER NOT NULL,
                tag_id INTEGER NOT NULL,
                PRIMARY KEY (discussion_id, tag_id),
                FOREIGN KEY (discussion_id) REFERENCES discussions(id) ON DELETE CASCADE,
                FOREIGN KEY (tag_id) REFERENCES tags(id) ON DELETE CASCADE
            )"#,
            r#"CREATE TABLE IF NOT EXISTS comments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source_id INTEGER NOT NULL,
                pathname TEXT NOT NULL,
                body TEXT NOT NULL,
                parent_href TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                crawled_at INTEGER NOT NULL,
                FOREIGN KEY (source_id) REFERENCES crawl_sources(id) ON DELETE CASCADE
            )"#,
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_comments_source_pathname ON comments(source_id, pathname)",
            "CREATE INDEX IF NOT EXISTS idx_comments_parent_href ON comments(parent_href)",
            r#"CREATE TABLE IF NOT EXISTS media (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source_id INTEGER NOT NULL,
                pathname TEXT NOT NULL,
                href TEXT NOT NULL,
                mime_type TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                crawled_at INTEGER NOT NULL,
                FOREIGN KEY (source_id) REFERENCES crawl_sources(id) ON DELETE CASCADE
            )"#,
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_media_source_pathname ON media(source_id, pathname)",
            r#"CREATE TABLE IF NOT EXISTS media_tags (
                media_id INTEGER NOT NULL,
                tag_id INTEGER NOT NULL,
                PRIMARY KEY (media_id, tag_id),
                FOREIGN KEY (media_id) REFERENCES media(id) ON DELETE CASCADE,
                FOREIGN KEY (tag_id) REFERENCES tags(id) ON DELETE CASCADE
            )"#,
            r#"CREATE TABLE IF NOT EXISTS votes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source_id INTEGER NOT NULL,
                pathname TEXT NOT NULL,
                subject TEXT NOT NULL,
                vote INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                crawled_at INTEGER NOT NULL,
                FOREIGN KEY (source_id) REFERENCES crawl_sources(id) ON DELETE CASCADE
            )"#,
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_votes_source_pathname ON votes(source_id, pathname)",
            "CREATE INDEX IF NOT EXISTS idx_votes_subject ON votes(subject)",
            r#"CREATE TABLE IF NOT EXISTS reactions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source_id INTEGER NOT NULL,
                pathname TEXT NOT NULL,
                topic TEXT NOT NULL,
                emojis TEXT NOT NULL,
                crawled_at INTEGER NOT NULL,
                FOREIGN KEY (source_id) REFERENCES crawl_sources(id) ON DELETE CASCADE
            )"#,
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_reactions_source_pathname ON reactions(source_id, pathname)",
            "CREATE INDEX IF NOT EXISTS idx_reactions_topic ON reactions(topic)",
            r#"CREATE TABLE IF NOT EXISTS follow_edges (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source_id INTEGER NOT NULL,
                dest TEXT NOT NULL,
                crawled_at INTEGER NOT NULL,
                FOREIGN KEY (source_id) REFERENCES crawl_sources(id) ON DELETE CASCADE
            )"#,
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_follow_edges_source_dest ON follow_edges(source_id, dest)",
            r#"CREATE TABLE IF NOT EXISTS published_site_edges (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source_id INTEGER NOT NULL,
                pathname TEXT NOT NULL,
                dest TEXT NOT NULL,
                crawled_at INTEGER NOT NULL,
                FOREIGN KEY (source_id) REFERENCES crawl_sources(id) ON DELETE CASCADE
            )"#,
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_published_site_edges_source_dest ON published_site_edges(source_id, dest)",
            r#"CREATE TABLE IF NOT EXISTS site_descriptions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source_id INTEGER NOT NULL,
                subject_url TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT NOT NULL,
                site_type TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                crawled_at INTEGER NOT NULL,
                FOREIGN KEY (source_id) REFERENCES crawl_sources(id) ON DELETE CASCADE
            )"#,
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_site_descriptions_source_subject ON site_descriptions(source_id, subject_url)",
            r#"CREATE TABLE IF NOT EXISTS dns_bindings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                key TEXT NOT NULL,
                is_current BOOLEAN NOT NULL DEFAULT 0,
                first_confirmed_at TEXT NOT NULL,
                last_confirmed_at TEXT NOT NULL
            )"#,
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_dns_bindings_current ON dns_bindings(name) WHERE is_current = 1",
        ],
    },
    // FTS5 is an optional SQLite compile-time feature; on builds where it is
    // unavailable these statements fail and are swallowed so the rest of the
    // schema still comes up (searchable tables simply fall back to the
    // straight table scan described in spec.md 4.6.3).
    Migration {
        version: 2,
        tolerant: true,
        up_sql: &[
            "CREATE VIRTUAL TABLE IF NOT EXISTS posts_fts_index USING fts5(body, content='posts', content_rowid='id')",
            r#"CREATE TRIGGER IF NOT EXISTS posts_fts_insert AFTER INSERT ON posts BEGIN
                INSERT INTO posts_fts_index(rowid, body) VALUES (new.id, new.body);
            END"#,
            r#"CREATE TRIGGER IF NOT EXISTS posts_fts_delete AFTER DELETE ON posts BEGIN
                INSERT INTO posts_fts_index(posts_fts_index, rowid, body) VALUES ('delete', old.id, old.body);
            END"#,
            r#"CREATE TRIGGER IF NOT EXISTS posts_fts_update AFTER UPDATE ON posts BEGIN
                INSERT INTO posts_fts_index(posts_fts_index, rowid, body) VALUES ('delete', old.id, old.body);
                INSERT INTO posts_fts_index(rowid, body) VALUES (new.id, new.body);
            END"#,
            "CREATE VIRTUAL TABLE IF NOT EXISTS bookmarks_fts_index USING fts5(title, description, content='bookmarks', content_rowid='id')",
            r#"CREATE TRIGGER IF NOT EXISTS bookmarks_fts_insert AFTER INSERT ON bookmarks BEGIN
                INSERT INTO bookmarks_fts_index(rowid, title, description) VALUES (new.id, new.title, new.description);
            END"#,
            r#"CREATE TRIGGER IF NOT EXISTS bookmarks_fts_delete AFTER DELETE ON bookmarks BEGIN
                INSERT INTO bookmarks_fts_index(bookmarks_fts_index, rowid, title, description) VALUES ('delete', old.id, old.title, old.description);
            END"#,
            r#"CREATE TRIGGER IF NOT EXISTS bookmarks_fts_update AFTER UPDATE ON bookmarks BEGIN
                INSERT INTO bookmarks_fts_index(bookmarks_fts_index, rowid, title, description) VALUES ('delete', old.id, old.title, old.description);
                INSERT INTO bookmarks_fts_index(rowid, title, description) VALUES (new.id, new.title, new.description);
            END"#,
            "CREATE VIRTUAL TABLE IF NOT EXISTS site_descriptions_fts_index USING fts5(title, description, content='site_descriptions', content_rowid='id')",
            r#"CREATE TRIGGER IF NOT EXISTS site_descriptions_fts_insert AFTER INSERT ON site_descriptions BEGIN
                INSERT INTO site_descriptions_fts_index(rowid, title, description) VALUES (new.id, new.title, new.description);
            END"#,
            r#"CREATE TRIGGER IF NOT EXISTS site_descriptions_fts_delete AFTER DELETE ON site_descriptions BEGIN
                INSERT INTO site_descriptions_fts_index(site_descriptions_fts_index, rowid, title, description) VALUES ('delete', old.id, old.title, old.description);
            END"#,
            r#"CREATE TRIGGER IF NOT EXISTS site_descriptions_fts_update AFTER UPDATE ON site_descriptions BEGIN
                INSERT INTO site_descriptions_fts_index(site_descriptions_fts_index, rowid, title, description) VALUES ('delete', old.id, old.title, old.description);
                INSERT INTO site_descriptions_fts_index(rowid, title, description) VALUES (new.id, new.title, new.description);
            END"#,
        ],
    },
];

/// Apply every migration step whose version exceeds the database's current
/// `PRAGMA user_version`, in order, then advance the pragma to the highest
/// applied version.
pub async fn run_migrations(conn: &mut AsyncSqliteConnection) -> Result<()> {
    let current_version: CurrentVersion = sql_query("PRAGMA user_version")
        .get_result(conn)
        .await
        .map_err(|e| IndexError::MigrationFailed(format!("reading user_version: {e}")))?;
    let mut version = current_version.user_version;

    for migration in MIGRATIONS {
        if migration.version <= version {
            continue;
        }
        tracing::info!(version = migration.version, "applying store migration");
        for statement in migration.up_sql {
            let result = sql_query(*statement).execute(conn).await;
            if let Err(e) = result {
                if migration.tolerant {
                    tracing::warn!(version = migration.version, error = %e, "tolerant migration statement failed, continuing");
                } else {
                    return Err(IndexError::MigrationFailed(format!(
                        "migration {} failed: {e}",
                        migration.version
                    )));
                }
            }
        }
        version = migration.version;
    }

    sql_query(format!("PRAGMA user_version = {version}"))
        .execute(conn)
        .await
        .map_err(|e| IndexError::MigrationFailed(format!("writing user_version: {e}")))?;

    Ok(())
}

#[derive(diesel::QueryableByName)]
struct CurrentVersion {
    #[diesel(sql_type = diesel::sql_types::BigInt)]
    user_version: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::pool::Pool;

    #[tokio::test]
    async fn migrations_are_idempotent() {
        // SQLite pools open a fresh connection per operation (see
        // `store::pool::Pool`), so an in-memory `:memory:` URL would give
        // each call its own empty database; use a real temp file instead,
        // matching how the teacher's own tests exercise SQLite.
        let file = tempfile::NamedTempFile::new().unwrap();
        let pool = Pool::from_path(file.path());

        let mut conn = pool.get().await.unwrap();
        run_migrations(&mut conn).await.unwrap();

        let mut conn2 = pool.get().await.unwrap();
        run_migrations(&mut conn2).await.unwrap();
    }
}
