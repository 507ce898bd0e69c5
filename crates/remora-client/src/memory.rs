//! In-memory transfer client for testing
//!
//! Holds a fake remote tree in a `HashMap` behind a mutex, so all trait
//! methods operate on `&self` without a network or filesystem dependency.
//! Per-path failure injection makes partial-failure behavior testable.

use crate::client::{Capability, TransferClient};
use crate::util::{path_prefixes, remote_file_name, remote_parent};
use async_trait::async_trait;
use remora_meta::MetadataStore;
use remora_types::{system_time_ms, Error, Protocol, RemoteEntry, Result};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::SystemTime;

#[derive(Debug, Clone)]
struct MemoryFile {
    data: Vec<u8>,
    modified_ms: i64,
}

#[derive(Debug, Default)]
struct MemoryTree {
    files: HashMap<String, MemoryFile>,
    dirs: HashSet<String>,
    fail: HashSet<String>,
}

/// In-memory transfer client for tests
///
/// Reports the SFTP protocol and no optional capabilities. Paths registered
/// with [`MemoryClient::fail_on`] make any transfer or listing touching them
/// return a network error, simulating a transient transport failure.
pub struct MemoryClient {
    store: Arc<MetadataStore>,
    tree: Arc<Mutex<MemoryTree>>,
    connected: AtomicBool,
}

fn lock_tree(tree: &Mutex<MemoryTree>) -> Result<MutexGuard<'_, MemoryTree>> {
    tree.lock()
        .map_err(|_| Error::other("memory tree lock poisoned"))
}

impl MemoryClient {
    /// Create an empty in-memory client
    pub fn new(store: Arc<MetadataStore>) -> Self {
        Self {
            store,
            tree: Arc::new(Mutex::new(MemoryTree::default())),
            connected: AtomicBool::new(false),
        }
    }

    /// Pre-populate a remote file, creating its ancestor directories
    pub fn insert_remote_file<S: Into<String>>(&self, path: S, data: &[u8], modified_ms: i64) {
        let path = path.into();
        let mut tree = lock_tree(&self.tree).expect("tree lock");
        if let Some(parent) = remote_parent(&path) {
            for prefix in path_prefixes(&parent) {
                tree.dirs.insert(prefix);
            }
        }
        tree.files.insert(
            path,
            MemoryFile {
                data: data.to_vec(),
                modified_ms,
            },
        );
    }

    /// Make any operation touching this remote path fail
    pub fn fail_on<S: Into<String>>(&self, path: S) {
        lock_tree(&self.tree).expect("tree lock").fail.insert(path.into());
    }

    /// All remote file paths, sorted for assertion convenience
    pub fn remote_files(&self) -> Vec<String> {
        let tree = lock_tree(&self.tree).expect("tree lock");
        let mut paths: Vec<String> = tree.files.keys().cloned().collect();
        paths.sort();
        paths
    }

    /// All remote directory paths, sorted
    pub fn remote_dirs(&self) -> Vec<String> {
        let tree = lock_tree(&self.tree).expect("tree lock");
        let mut paths: Vec<String> = tree.dirs.iter().cloned().collect();
        paths.sort();
        paths
    }

    /// Contents of a remote file, when present
    pub fn file_contents(&self, path: &str) -> Option<Vec<u8>> {
        let tree = lock_tree(&self.tree).expect("tree lock");
        tree.files.get(path).map(|f| f.data.clone())
    }

    fn check_failure(tree: &MemoryTree, path: &str) -> Result<()> {
        if tree.fail.contains(path) {
            return Err(Error::network(format!("injected failure for '{}'", path)));
        }
        Ok(())
    }
}

#[async_trait]
impl TransferClient for MemoryClient {
    fn protocol(&self) -> Protocol {
        Protocol::Sftp
    }

    fn supports(&self, _capability: Capability) -> bool {
        false
    }

    async fn connect(&self) -> Result<()> {
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn reconnect(&self) -> Result<()> {
        self.connect().await
    }

    async fn stat(&self, remote: &str) -> Result<Option<RemoteEntry>> {
        let tree = lock_tree(&self.tree)?;
        Self::check_failure(&tree, remote)?;
        if let Some(file) = tree.files.get(remote) {
            return Ok(Some(RemoteEntry {
                name: remote_file_name(remote).to_string(),
                path: remote.to_string(),
                is_dir: false,
                size: Some(file.data.len() as u64),
                modified_ms: file.modified_ms,
            }));
        }
        if tree.dirs.contains(remote) || remote == "/" {
            return Ok(Some(RemoteEntry {
                name: remote_file_name(remote).to_string(),
                path: remote.to_string(),
                is_dir: true,
                size: None,
                modified_ms: 0,
            }));
        }
        Ok(None)
    }

    async fn try_list_dir(&self, remote: &str) -> Result<Vec<RemoteEntry>> {
        let tree = lock_tree(&self.tree)?;
        Self::check_failure(&tree, remote)?;

        let parent_of = |path: &str| remote_parent(path).unwrap_or_else(|| "/".to_string());
        let mut entries = Vec::new();
        for (path, file) in &tree.files {
            if parent_of(path) == remote {
                entries.push(RemoteEntry {
                    name: remote_file_name(path).to_string(),
                    path: path.clone(),
                    is_dir: false,
                    size: Some(file.data.len() as u64),
                    modified_ms: file.modified_ms,
                });
            }
        }
        for dir in &tree.dirs {
            if parent_of(dir) == remote {
                entries.push(RemoteEntry {
                    name: remote_file_name(dir).to_string(),
                    path: dir.clone(),
                    is_dir: true,
                    size: None,
                    modified_ms: 0,
                });
            }
        }
        Ok(entries)
    }

    async fn upload_file(&self, local: &Path, remote: &str) -> Result<RemoteEntry> {
        if let Some(parent) = remote_parent(remote) {
            self.ensure_remote_dir(&parent).await?;
        }

        let data = tokio::fs::read(local).await.map_err(|e| Error::Io {
            message: format!("failed to read '{}': {}", local.display(), e),
        })?;

        let entry = {
            let mut tree = lock_tree(&self.tree)?;
            Self::check_failure(&tree, remote)?;
            // Servers report second granularity; keep the fake consistent
            let modified_ms = (system_time_ms(SystemTime::now()) / 1000) * 1000;
            tree.files.insert(
                remote.to_string(),
                MemoryFile {
                    data: data.clone(),
                    modified_ms,
                },
            );
            RemoteEntry {
                name: remote_file_name(remote).to_string(),
                path: remote.to_string(),
                is_dir: false,
                size: Some(data.len() as u64),
                modified_ms,
            }
        };

        self.store
            .record_transfer(local, remote, entry.modified_ms, entry.size.unwrap_or(0))
            .await;
        Ok(entry)
    }

    async fn download_file(&self, remote: &str, local: &Path) -> Result<RemoteEntry> {
        let (data, entry) = {
            let tree = lock_tree(&self.tree)?;
            Self::check_failure(&tree, remote)?;
            let file = tree.files.get(remote).ok_or_else(|| {
                Error::network(format!("no such remote file '{}'", remote))
            })?;
            (
                file.data.clone(),
                RemoteEntry {
                    name: remote_file_name(remote).to_string(),
                    path: remote.to_string(),
                    is_dir: false,
                    size: Some(file.data.len() as u64),
                    modified_ms: file.modified_ms,
                },
            )
        };

        if let Some(parent) = local.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| Error::Io {
                message: format!("failed to create '{}': {}", parent.display(), e),
            })?;
        }
        tokio::fs::write(local, &data).await.map_err(|e| Error::Io {
            message: format!("failed to write '{}': {}", local.display(), e),
        })?;
        let mtime = filetime::FileTime::from_unix_time(entry.modified_ms / 1000, 0);
        let _ = filetime::set_file_mtime(local, mtime);

        self.store
            .record_transfer(local, remote, entry.modified_ms, entry.size.unwrap_or(0))
            .await;
        Ok(entry)
    }

    async fn delete_remote(&self, remote: &str, is_dir: bool) -> Result<()> {
        let mut tree = lock_tree(&self.tree)?;
        Self::check_failure(&tree, remote)?;
        if is_dir {
            let prefix = format!("{}/", remote.trim_end_matches('/'));
            tree.files.retain(|path, _| !path.starts_with(&prefix));
            tree.dirs
                .retain(|path| path != remote && !path.starts_with(&prefix));
        } else if tree.files.remove(remote).is_none() {
            return Err(Error::network(format!("no such remote file '{}'", remote)));
        }
        Ok(())
    }

    async fn ensure_remote_dir(&self, remote: &str) -> Result<()> {
        let mut tree = lock_tree(&self.tree)?;
        for prefix in path_prefixes(remote) {
            tree.dirs.insert(prefix);
        }
        Ok(())
    }

    async fn set_permissions(&self, _remote: &str, _mode: u32) -> Result<()> {
        Err(Error::unsupported("permission change", Protocol::Sftp))
    }

    async fn exec(&self, _command: &str) -> Result<String> {
        Err(Error::unsupported("remote command execution", Protocol::Sftp))
    }

    async fn search_names(&self, _root: &str, _pattern: &str) -> Result<Vec<String>> {
        Err(Error::unsupported("file name search", Protocol::Sftp))
    }

    async fn search_contents(&self, _root: &str, _needle: &str) -> Result<Vec<String>> {
        Err(Error::unsupported("content search", Protocol::Sftp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (MemoryClient, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MetadataStore::new(dir.path().join("meta")));
        (MemoryClient::new(store), dir)
    }

    #[tokio::test]
    async fn test_upload_records_metadata_and_stores_bytes() {
        let (client, dir) = setup();
        let local = dir.path().join("hello.txt");
        tokio::fs::write(&local, b"hello").await.unwrap();

        let entry = client.upload_file(&local, "/srv/hello.txt").await.unwrap();
        assert_eq!(entry.size, Some(5));
        assert_eq!(client.file_contents("/srv/hello.txt").unwrap(), b"hello");
        assert_eq!(client.remote_dirs(), vec!["/srv".to_string()]);

        let store = MetadataStore::new(dir.path().join("meta"));
        let record = store.read_transfer(&local).await.unwrap();
        assert_eq!(record.remote_path, "/srv/hello.txt");
        assert_eq!(record.remote_file_size, 5);
    }

    #[tokio::test]
    async fn test_download_applies_remote_mtime() {
        let (client, dir) = setup();
        client.connect().await.unwrap();
        client.insert_remote_file("/srv/a.txt", b"abc", 1_600_000_000_000);

        let local = dir.path().join("a.txt");
        let entry = client.download_file("/srv/a.txt", &local).await.unwrap();
        assert_eq!(entry.modified_ms, 1_600_000_000_000);

        let meta = std::fs::metadata(&local).unwrap();
        let local_ms = remora_types::system_time_ms(meta.modified().unwrap());
        assert_eq!(local_ms, 1_600_000_000_000);
    }

    #[tokio::test]
    async fn test_injected_failure_surfaces_as_network_error() {
        let (client, dir) = setup();
        client.fail_on("/srv/broken.txt");

        let local = dir.path().join("broken.txt");
        tokio::fs::write(&local, b"x").await.unwrap();
        let err = client.upload_file(&local, "/srv/broken.txt").await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_list_dir_swallows_injected_listing_failure() {
        let (client, _dir) = setup();
        client.insert_remote_file("/srv/a.txt", b"a", 0);
        client.fail_on("/srv");

        assert!(client.try_list_dir("/srv").await.is_err());
        assert!(client.list_dir("/srv").await.is_empty());
    }

    #[tokio::test]
    async fn test_recursive_delete_removes_subtree() {
        let (client, _dir) = setup();
        client.insert_remote_file("/srv/docs/a.txt", b"a", 0);
        client.insert_remote_file("/srv/docs/deep/b.txt", b"b", 0);
        client.insert_remote_file("/srv/keep.txt", b"k", 0);

        client.delete_remote("/srv/docs", true).await.unwrap();
        assert_eq!(client.remote_files(), vec!["/srv/keep.txt".to_string()]);
        assert_eq!(client.remote_dirs(), vec!["/srv".to_string()]);
    }
}
