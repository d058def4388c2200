//! In-process `ArchiveHandle` test double over a version history, used by
//! every ingest/coordinator/query test in place of a real archive daemon
//! (spec.md 1 scopes the daemon and its wire protocol out; this crate ships
//! only the trait it consumes plus this double).

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use tokio::sync::broadcast;

use crate::archive::{ArchiveEvent, ArchiveHandle, ArchiveInfo, DiffEntry, DiffKind, DnsBinding, DnsStore};
use crate::error::{IndexError, Result};

/// A `DnsStore` that never has a binding on file, for coordinator/query
/// tests that don't exercise DNS-rebind handling.
pub struct NoopDnsStore;

#[async_trait]
impl DnsStore for NoopDnsStore {
    async fn get_current_by_key(&self, _key: &str) -> Result<Option<DnsBinding>> {
        Ok(None)
    }

    async fn update(&self, _name: &str, _key: &str) -> Result<()> {
        Ok(())
    }

    async fn unset(&self, _key: &str) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct VersionedWrite {
    version: u64,
    contents: Option<Vec<u8>>, // None marks a deletion at this version
}

struct Inner {
    writable: bool,
    version: u64,
    // path -> history of writes/deletes, oldest first
    history: BTreeMap<String, Vec<VersionedWrite>>,
    invalidated: broadcast::Sender<ArchiveEvent>,
}

/// A fake archive backed by a `BTreeMap<String, Vec<u8>>`-style version
/// history. `put`/`del` bump the archive's version and broadcast an
/// `Invalidated` event, mirroring a real archive's write-then-notify
/// behavior closely enough to exercise the Coordinator's debounce and the
/// Ingester Framework's diff-window logic end to end.
#[derive(Clone)]
pub struct MemoryArchive {
    // Immutable for the archive's lifetime, so `ArchiveHandle::url`/`domain`
    // can hand back plain borrows instead of leaking.
    url: String,
    domain: Option<String>,
    inner: Arc<Mutex<Inner>>,
}

impl MemoryArchive {
    pub fn new(url: impl Into<String>) -> Self {
        let (tx, _) = broadcast::channel(64);
        Self {
            url: url.into(),
            domain: None,
            inner: Arc::new(Mutex::new(Inner {
                writable: true,
                version: 0,
                history: BTreeMap::new(),
                invalidated: tx,
            })),
        }
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// Write `contents` at `path`, bumping the archive version and
    /// notifying watchers.
    pub fn put(&self, path: &str, contents: impl Into<Vec<u8>>) -> u64 {
        let mut inner = self.inner.lock().unwrap();
        inner.version += 1;
        let version = inner.version;
        inner
            .history
            .entry(path.to_string())
            .or_default()
            .push(VersionedWrite {
                version,
                contents: Some(contents.into()),
            });
        let _ = inner.invalidated.send(ArchiveEvent::Invalidated);
        version
    }

    /// Delete `path`, bumping the archive version and notifying watchers.
    pub fn del(&self, path: &str) -> u64 {
        let mut inner = self.inner.lock().unwrap();
        inner.version += 1;
        let version = inner.version;
        inner
            .history
            .entry(path.to_string())
            .or_default()
            .push(VersionedWrite {
                version,
                contents: None,
            });
        let _ = inner.invalidated.send(ArchiveEvent::Invalidated);
        version
    }

    pub fn current_version(&self) -> u64 {
        self.inner.lock().unwrap().version
    }
}

#[async_trait]
impl ArchiveHandle for MemoryArchive {
    fn url(&self) -> &str {
        // Safety note: returning a reference into a mutex-guarded String is
        // not possible without leaking or cloning; callers of this test
        // double only ever need the value, so we leak a 'static copy once.
        // This is acceptable for a test double, never for production code.
        let guard = self.inner.lock().unwrap();
        Box::leak(guard.url.clone().into_boxed_str())
    }

    fn writable(&self) -> bool {
        self.inner.lock().unwrap().writable
    }

    fn domain(&self) -> Option<&str> {
        let guard = self.inner.lock().unwrap();
        guard
            .domain
            .clone()
            .map(|d| -> &str { Box::leak(d.into_boxed_str()) })
    }

    async fn get_info(&self) -> Result<ArchiveInfo> {
        let guard = self.inner.lock().unwrap();
        Ok(ArchiveInfo {
            version: guard.version,
            peers: 0,
        })
    }

    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let guard = self.inner.lock().unwrap();
        let writes = guard
            .history
            .get(path)
            .ok_or_else(|| IndexError::ArchiveUnreadable(format!("no such path: {path}")))?;
        match writes.last() {
            Some(VersionedWrite {
                contents: Some(bytes),
                ..
            }) => Ok(bytes.clone()),
            _ => Err(IndexError::ArchiveUnreadable(format!(
                "path deleted: {path}"
            ))),
        }
    }

    async fn write_file(&self, path: &str, contents: &[u8]) -> Result<()> {
        self.put(path, contents.to_vec());
        Ok(())
    }

    async fn unlink(&self, path: &str) -> Result<()> {
        self.del(path);
        Ok(())
    }

    async fn readdir(&self, path: &str) -> Result<Vec<String>> {
        let prefix = if path.ends_with('/') {
            path.to_string()
        } else {
            format!("{path}/")
        };
        let guard = self.inner.lock().unwrap();
        let mut names: Vec<String> = guard
            .history
            .iter()
            .filter(|(p, writes)| {
                p.starts_with(&prefix) && writes.last().is_some_and(|w| w.contents.is_some())
            })
            .filter_map(|(p, _)| p.strip_prefix(&prefix).map(|rest| rest.to_string()))
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }

    async fn diff_stream(&self, since_version: u64, root_path: &str) -> Result<Vec<DiffEntry>> {
        let guard = self.inner.lock().unwrap();
        let mut entries: Vec<DiffEntry> = guard
            .history
            .iter()
            .filter(|(p, _)| p.starts_with(root_path))
            .flat_map(|(p, writes)| {
                writes
                    .iter()
                    .filter(|w| w.version > since_version)
                    .map(move |w| DiffEntry {
                        kind: if w.contents.is_some() {
                            DiffKind::Put
                        } else {
                            DiffKind::Del
                        },
                        path: p.clone(),
                        version: w.version,
                    })
            })
            .collect();
        entries.sort_by_key(|e| e.version);
        Ok(entries)
    }

    fn watch(&self) -> BoxStream<'static, ArchiveEvent> {
        let mut rx = self.inner.lock().unwrap().invalidated.subscribe();
        Box::pin(stream::unfold(rx, |mut rx| async move {
            match rx.recv().await {
                Ok(event) => Some((event, rx)),
                Err(_) => None,
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_read_round_trips() {
        let archive = MemoryArchive::new("dat://a");
        archive.put("/data/posts/a.json", b"hello".to_vec());
        let bytes = archive.read_file("/data/posts/a.json").await.unwrap();
        assert_eq!(bytes, b"hello");
    }

    #[tokio::test]
    async fn diff_stream_is_ordered_by_version() {
        let archive = MemoryArchive::new("dat://a");
        archive.put("/data/posts/a.json", b"1".to_vec());
        archive.put("/data/posts/b.json", b"2".to_vec());
        archive.del("/data/posts/a.json");

        let diff = archive.diff_stream(0, "/data/posts").await.unwrap();
        assert_eq!(diff.len(), 3);
        assert!(diff.windows(2).all(|w| w[0].version <= w[1].version));
        assert_eq!(diff.last().unwrap().kind, DiffKind::Del);
    }

    #[tokio::test]
    async fn readdir_lists_live_entries_only() {
        let archive = MemoryArchive::new("dat://a");
        archive.put("/data/known_sites/example.com/dat.json", b"{}".to_vec());
        archive.put("/data/known_sites/other.org/dat.json", b"{}".to_vec());
        archive.del("/data/known_sites/other.org/dat.json");

        let names = archive.readdir("/data/known_sites").await.unwrap();
        assert_eq!(names, vec!["example.com/dat.json".to_string()]);
    }
}
