//! Configuration management for arcindex using the prefer crate.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{IndexError, Result};

/// Default database filename, relative to `data_dir`.
pub const DEFAULT_DATABASE_FILENAME: &str = "index.db";

/// Default interval, in seconds, between scheduler ticks (Design Note: C5).
pub const DEFAULT_TICK_INTERVAL_SECS: u64 = 5;

/// Default debounce window, in seconds, before a changed archive is re-crawled.
pub const DEFAULT_DEBOUNCE_SECS: u64 = 5;

/// Default page size for federated list/search queries.
pub const DEFAULT_QUERY_LIMIT: i64 = 20;

/// Maximum follow-graph hop distance honored by federated queries.
pub const DEFAULT_MAX_HOPS: u32 = 2;

/// File-based overlay for [`Settings`], loaded via the `prefer` crate.
///
/// Every field is optional; anything left unset falls through to the
/// corresponding [`Settings`] default. Relative paths are resolved against
/// `base_dir` (the config file's own directory, or the current directory
/// when no config file was found).
#[derive(Debug, Clone, Default, Serialize, Deserialize, prefer::FromValue)]
pub struct Config {
    /// Base data directory.
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "target")]
    pub data_dir: Option<String>,
    /// Database filename, relative to `data_dir` unless absolute.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    /// Root directory under which per-user archives are mounted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive_root: Option<String>,
    /// Origin (e.g. `hyper://<key>`) of the locally-active user, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_user_origin: Option<String>,
    /// Scheduler tick interval in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tick_interval_secs: Option<u64>,
    /// Debounce window in seconds before a changed archive is re-crawled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debounce_secs: Option<u64>,
    /// Default page size for federated list/search queries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_limit: Option<i64>,
    /// Maximum follow-graph hop distance for federated queries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_hops: Option<u32>,
    /// Bind address for the HTTP query surface, e.g. `127.0.0.1:3000`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listen_addr: Option<String>,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    #[prefer(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration using `prefer` for discovery. Falls back to
    /// defaults if no config file is found or it fails to parse.
    pub async fn load() -> Self {
        match prefer::load("arcindex").await {
            Ok(pref_config) => match pref_config.source_path() {
                Some(path) => Self::load_from_path(path).await.unwrap_or_default(),
                None => Self::default(),
            },
            Err(_) => Self::default(),
        }
    }

    /// Load configuration from a specific file path. Format is inferred
    /// from the file extension (TOML, YAML, or JSON).
    pub async fn load_from_path(path: &std::path::Path) -> Result<Self> {
        let contents = tokio::fs::read_to_string(path).await?;
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

        let mut config: Config = match ext {
            "toml" => toml::from_str(&contents)
                .map_err(|e| IndexError::ValidationFailed(format!("invalid toml config: {e}")))?,
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .map_err(|e| IndexError::ValidationFailed(format!("invalid yaml config: {e}")))?,
            _ => serde_json::from_str(&contents)?,
        };
        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// The directory relative paths in this config should resolve against:
    /// the config file's own directory, or the current directory.
    pub fn base_dir(&self) -> PathBuf {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
    }

    fn resolve_path(path_str: &str, base_dir: &std::path::Path) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = std::path::Path::new(expanded.as_ref());
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }

    /// Fold this overlay onto a [`Settings`] instance.
    pub fn apply_to_settings(&self, settings: &mut Settings) {
        let base_dir = self.base_dir();
        if let Some(ref data_dir) = self.data_dir {
            settings.data_dir = Self::resolve_path(data_dir, &base_dir);
        }
        if let Some(ref database) = self.database {
            settings.database_filename = database.clone();
        }
        if let Some(ref root) = self.archive_root {
            settings.archive_root = Self::resolve_path(root, &base_dir);
        }
        if let Some(ref origin) = self.active_user_origin {
            settings.active_user_origin = Some(origin.clone());
        }
        if let Some(secs) = self.tick_interval_secs {
            settings.tick_interval_secs = secs;
        }
        if let Some(secs) = self.debounce_secs {
            settings.debounce_secs = secs;
        }
        if let Some(limit) = self.query_limit {
            settings.query_limit = limit;
        }
        if let Some(hops) = self.max_hops {
            settings.max_hops = hops;
        }
        if let Some(ref addr) = self.listen_addr {
            settings.listen_addr = addr.clone();
        }
    }
}

/// Fully-resolved runtime settings for one engine instance.
///
/// Unlike [`Config`] (an optional-field file overlay), every field here is
/// concrete — this is what the rest of the crate actually reads.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base data directory (holds the index database and any local state).
    pub data_dir: PathBuf,
    /// Database filename, relative to `data_dir`.
    pub database_filename: String,
    /// Database URL override (e.g. set via `DATABASE_URL`). Supports
    /// `sqlite://` URLs; takes precedence over `data_dir`/`database_filename`.
    pub database_url: Option<String>,
    /// Root directory under which per-user archives are mounted.
    pub archive_root: PathBuf,
    /// Origin of the locally-active user, if the engine is running against
    /// a single logged-in identity rather than purely as a read-only index.
    pub active_user_origin: Option<String>,
    /// Scheduler tick interval in seconds.
    pub tick_interval_secs: u64,
    /// Debounce window in seconds before a changed archive is re-crawled.
    pub debounce_secs: u64,
    /// Default page size for federated list/search queries.
    pub query_limit: i64,
    /// Maximum follow-graph hop distance for federated queries.
    pub max_hops: u32,
    /// Bind address for the HTTP query surface.
    pub listen_addr: String,
}

impl Default for Settings {
    fn default() -> Self {
        // ~/.local/share/arcindex (or platform equivalent) -> falls back to
        // the home directory, then the current directory.
        let data_dir = dirs::data_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("arcindex");

        Self {
            archive_root: data_dir.join("archives"),
            data_dir,
            database_filename: DEFAULT_DATABASE_FILENAME.to_string(),
            database_url: None,
            active_user_origin: None,
            tick_interval_secs: DEFAULT_TICK_INTERVAL_SECS,
            debounce_secs: DEFAULT_DEBOUNCE_SECS,
            query_limit: DEFAULT_QUERY_LIMIT,
            max_hops: DEFAULT_MAX_HOPS,
            listen_addr: "127.0.0.1:3000".to_string(),
        }
    }
}

impl Settings {
    /// Settings rooted at a specific data directory, used by tests and by
    /// `--data` CLI overrides.
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            archive_root: data_dir.join("archives"),
            data_dir,
            ..Default::default()
        }
    }

    /// The database URL to connect with, constructing a `sqlite:` URL from
    /// `data_dir`/`database_filename` if no explicit URL was set.
    pub fn database_url(&self) -> String {
        if let Some(ref url) = self.database_url {
            url.clone()
        } else {
            format!("sqlite:{}", self.database_path().display())
        }
    }

    /// Full path to the SQLite database file.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_filename)
    }

    /// Whether the database file already exists (used to distinguish a
    /// first-run `CREATE` from an in-place migration).
    pub fn database_exists(&self) -> bool {
        self.database_url.is_some() || self.database_path().exists()
    }

    /// Create `data_dir` and `archive_root` if they don't already exist.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data_dir).map_err(|e| {
            std::io::Error::new(
                e.kind(),
                format!(
                    "failed to create data directory '{}': {e}",
                    self.data_dir.display()
                ),
            )
        })?;
        std::fs::create_dir_all(&self.archive_root).map_err(|e| {
            std::io::Error::new(
                e.kind(),
                format!(
                    "failed to create archive root '{}': {e}",
                    self.archive_root.display()
                ),
            )
        })?;
        Ok(())
    }
}

/// Options accepted from the CLI layer that influence configuration
/// resolution before defaults and file overlays are applied.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// `--data <dir>` override.
    pub data: Option<String>,
    /// Resolve relative paths against the current directory instead of a
    /// discovered config file's directory.
    pub use_cwd: bool,
}

/// Load settings, applying (in increasing precedence): built-in defaults,
/// a discovered `prefer` config file, CLI overrides, and environment
/// variables. Returns the resolved `(Settings, Config)` pair; `Config` is
/// kept around for callers that need to re-serialize or inspect overlays.
pub async fn load_settings_with_options(options: LoadOptions) -> (Settings, Config) {
    let config = if options.use_cwd {
        let mut c = Config::load().await;
        c.source_path = None;
        c
    } else {
        Config::load().await
    };

    let mut settings = Settings::default();
    config.apply_to_settings(&mut settings);

    if let Some(ref data) = options.data {
        let dir = PathBuf::from(data);
        settings.archive_root = dir.join("archives");
        settings.data_dir = dir;
    }

    if let Ok(database_url) = std::env::var("DATABASE_URL") {
        if !database_url.is_empty() {
            tracing::debug!("using DATABASE_URL from environment");
            settings.database_url = Some(database_url);
        }
    }

    if let Ok(origin) = std::env::var("ARCINDEX_ACTIVE_USER") {
        if !origin.is_empty() {
            settings.active_user_origin = Some(origin);
        }
    }

    if let Ok(addr) = std::env::var("ARCINDEX_LISTEN_ADDR") {
        if !addr.is_empty() {
            settings.listen_addr = addr;
        }
    }

    (settings, config)
}

/// Convenience entry point equivalent to
/// `load_settings_with_options(LoadOptions::default())`.
pub async fn load_settings() -> (Settings, Config) {
    load_settings_with_options(LoadOptions::default()).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_derive_database_url_from_data_dir() {
        let settings = Settings::with_data_dir(PathBuf::from("/tmp/arcindex-test"));
        assert_eq!(
            settings.database_url(),
            "sqlite:/tmp/arcindex-test/index.db"
        );
        assert!(!settings.database_exists());
    }

    #[test]
    fn explicit_database_url_overrides_data_dir() {
        let mut settings = Settings::default();
        settings.database_url = Some("sqlite::memory:".to_string());
        assert_eq!(settings.database_url(), "sqlite::memory:");
        assert!(settings.database_exists());
    }

    #[test]
    fn config_overlay_resolves_relative_paths_against_base_dir() {
        let mut config = Config {
            data_dir: Some("mydata".to_string()),
            ..Default::default()
        };
        config.source_path = Some(PathBuf::from("/etc/arcindex/config.toml"));
        let mut settings = Settings::default();
        config.apply_to_settings(&mut settings);
        assert_eq!(settings.data_dir, PathBuf::from("/etc/arcindex/mydata"));
    }
}
