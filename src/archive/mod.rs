//! C6.1 consumed interfaces: the external collaborators this crate reads
//! from but does not implement in production (archive daemon, DNS store,
//! active-user registry, bookmarks/history/library stores). Each is a
//! trait — grounded on the teacher's `Annotator`/`DatabaseExporter`
//! `async_trait` boundary pattern — with an in-memory test double so the
//! rest of the crate can be exercised without a real archive network.

pub mod memory;
pub mod origin;

use async_trait::async_trait;
use futures::stream::BoxStream;

/// One entry of an archive diff stream (spec.md 6.1, `createDiffStream`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffEntry {
    pub kind: DiffKind,
    pub path: String,
    pub version: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffKind {
    Put,
    Del,
}

/// An `invalidated` notification or other archive-level event (spec.md
/// 6.1, `watch() -> event stream`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveEvent {
    Invalidated,
}

/// Archive metadata returned by `getInfo()`.
#[derive(Debug, Clone)]
pub struct ArchiveInfo {
    pub version: u64,
    pub peers: u32,
}

/// The archive daemon's per-archive handle contract (spec.md 6.1). The
/// daemon itself, its wire protocol, and discovery/swarming are out of
/// scope (spec.md 1) — this crate only consumes this interface.
#[async_trait]
pub trait ArchiveHandle: Send + Sync {
    /// Canonical `scheme://host` origin of this archive.
    fn url(&self) -> &str;

    /// Whether the local process can write to this archive (true only for
    /// the active user's own archive).
    fn writable(&self) -> bool;

    /// DNS name currently bound to this archive's key, if any.
    fn domain(&self) -> Option<&str>;

    async fn get_info(&self) -> crate::error::Result<ArchiveInfo>;

    async fn read_file(&self, path: &str) -> crate::error::Result<Vec<u8>>;

    async fn write_file(&self, path: &str, contents: &[u8]) -> crate::error::Result<()>;

    async fn unlink(&self, path: &str) -> crate::error::Result<()>;

    async fn readdir(&self, path: &str) -> crate::error::Result<Vec<String>>;

    /// Ordered diff entries from `since_version` (exclusive) onward, over
    /// the whole tree rooted at `root_path`.
    async fn diff_stream(
        &self,
        since_version: u64,
        root_path: &str,
    ) -> crate::error::Result<Vec<DiffEntry>>;

    /// Stream of invalidation events. The real daemon's subscription never
    /// terminates; the in-memory double terminates when its sender drops.
    fn watch(&self) -> BoxStream<'static, ArchiveEvent>;
}

/// A resolved DNS binding (spec.md 3, `DNS Binding`; 6.1 `DNSStore`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsBinding {
    pub id: i32,
    pub name: String,
    pub key: String,
}

#[async_trait]
pub trait DnsStore: Send + Sync {
    async fn get_current_by_key(&self, key: &str) -> crate::error::Result<Option<DnsBinding>>;
    async fn update(&self, name: &str, key: &str) -> crate::error::Result<()>;
    async fn unset(&self, key: &str) -> crate::error::Result<()>;
}

/// Yields the active user's origin (spec.md 6.1, `UserRegistry`).
#[async_trait]
pub trait UserRegistry: Send + Sync {
    async fn active_user_origin(&self) -> Option<String>;
}

/// Read-only access to the browser's bookmarks store, used only by
/// `query::suggestions` (spec.md 4.6.4, 6.1).
#[async_trait]
pub trait BookmarksStore: Send + Sync {
    async fn list_bookmark_urls(&self, exclude_pinned: bool) -> Vec<(String, String)>;
}

/// Read-only access to browsing history, used only by suggestions.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Top matches for `query`, ordered shortest-URL-first, capped by the
    /// caller at 12 (spec.md 4.6.4).
    async fn search(&self, query: &str, limit: usize) -> Vec<(String, String)>;
}

/// Read-only access to a catalogue of known/built-in pages, used only by
/// suggestions (spec.md 6.1, `ArchiveLibrary`).
#[async_trait]
pub trait ArchiveLibrary: Send + Sync {
    async fn built_in_pages(&self) -> Vec<(String, String)>;
}
