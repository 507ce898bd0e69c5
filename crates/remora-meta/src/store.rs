//! Sidecar file persistence

use crate::TransferRecord;
use remora_types::system_time_ms;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;
use tracing::{debug, warn};

/// Encode a local path into a flat, filename-safe storage key
///
/// Total and injective over valid local paths: the escape character is
/// escaped before the separators, so two distinct paths can never collapse
/// to the same key.
pub fn storage_key<P: AsRef<Path>>(local_path: P) -> String {
    let raw = local_path.as_ref().to_string_lossy();
    let mut key = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '%' => key.push_str("%25"),
            '/' => key.push_str("%2f"),
            '\\' => key.push_str("%5c"),
            other => key.push(other),
        }
    }
    key
}

/// Metadata store scoped to one workspace root
///
/// Exclusively owns the persisted sidecar form; the engine and the arbiter
/// read and write records only through this interface.
#[derive(Debug, Clone)]
pub struct MetadataStore {
    dir: PathBuf,
    config_name: Option<String>,
}

impl MetadataStore {
    /// Create a store rooted at the given metadata directory
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            config_name: None,
        }
    }

    /// Attribute future records to a profile name
    pub fn with_config_name<S: Into<String>>(mut self, name: S) -> Self {
        self.config_name = Some(name.into());
        self
    }

    /// Record a successful transfer, overwriting any prior record
    ///
    /// A failed metadata write degrades future conflict detection but must
    /// never abort the transfer that triggered it, so I/O errors are logged
    /// and swallowed here.
    pub async fn record_transfer<P: AsRef<Path>>(
        &self,
        local_path: P,
        remote_path: &str,
        remote_modify_time: i64,
        remote_file_size: u64,
    ) {
        let local_path = local_path.as_ref();
        let record = TransferRecord {
            remote_path: remote_path.to_string(),
            remote_modify_time,
            remote_file_size,
            local_path: local_path.to_string_lossy().into_owned(),
            download_time: system_time_ms(SystemTime::now()),
            config_name: self.config_name.clone(),
        };

        if let Err(e) = self.write_record(local_path, &record).await {
            warn!(
                "failed to persist metadata for '{}': {}",
                local_path.display(),
                e
            );
        }
    }

    /// Read the record for a local path, `None` when untracked
    ///
    /// Pure read: unreadable or corrupt sidecars read as absent.
    pub async fn read_transfer<P: AsRef<Path>>(&self, local_path: P) -> Option<TransferRecord> {
        let path = self.record_path(local_path.as_ref());
        let data = fs::read(&path).await.ok()?;
        match serde_json::from_slice(&data) {
            Ok(record) => Some(record),
            Err(e) => {
                debug!("ignoring corrupt metadata at '{}': {}", path.display(), e);
                None
            }
        }
    }

    /// Remove the record for a local path
    ///
    /// Called when deletion reconciliation removes the tracked local file.
    pub async fn remove<P: AsRef<Path>>(&self, local_path: P) {
        let path = self.record_path(local_path.as_ref());
        if let Err(e) = fs::remove_file(&path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("failed to remove metadata at '{}': {}", path.display(), e);
            }
        }
    }

    /// Sidecar path for a local file
    fn record_path(&self, local_path: &Path) -> PathBuf {
        self.dir.join(format!("{}.json", storage_key(local_path)))
    }

    async fn write_record(
        &self,
        local_path: &Path,
        record: &TransferRecord,
    ) -> std::io::Result<()> {
        fs::create_dir_all(&self.dir).await?;
        let data = serde_json::to_vec_pretty(record)?;
        fs::write(self.record_path(local_path), data).await?;
        debug!("recorded transfer metadata for '{}'", local_path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_record_and_read_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = MetadataStore::new(dir.path()).with_config_name("staging");

        store
            .record_transfer("src/app.rs", "/srv/app.rs", 1_700_000_000_000, 1024)
            .await;

        let record = store.read_transfer("src/app.rs").await.unwrap();
        assert_eq!(record.remote_path, "/srv/app.rs");
        assert_eq!(record.remote_modify_time, 1_700_000_000_000);
        assert_eq!(record.remote_file_size, 1024);
        assert_eq!(record.local_path, "src/app.rs");
        assert_eq!(record.config_name.as_deref(), Some("staging"));
        assert!(record.download_time > 0);
    }

    #[tokio::test]
    async fn test_absent_record_reads_as_none() {
        let dir = TempDir::new().unwrap();
        let store = MetadataStore::new(dir.path());
        assert!(store.read_transfer("never/transferred.txt").await.is_none());
    }

    #[tokio::test]
    async fn test_record_overwrites_not_merges() {
        let dir = TempDir::new().unwrap();
        let store = MetadataStore::new(dir.path()).with_config_name("staging");

        store.record_transfer("a.txt", "/one", 100, 1).await;
        let store = MetadataStore::new(dir.path());
        store.record_transfer("a.txt", "/two", 200, 2).await;

        let record = store.read_transfer("a.txt").await.unwrap();
        assert_eq!(record.remote_path, "/two");
        assert_eq!(record.remote_modify_time, 200);
        // The overwrite dropped the profile attribution from the first write
        assert_eq!(record.config_name, None);
    }

    #[tokio::test]
    async fn test_remove_deletes_the_sidecar() {
        let dir = TempDir::new().unwrap();
        let store = MetadataStore::new(dir.path());

        store.record_transfer("a.txt", "/a", 100, 1).await;
        assert!(store.read_transfer("a.txt").await.is_some());

        store.remove("a.txt").await;
        assert!(store.read_transfer("a.txt").await.is_none());

        // Removing an untracked path is a quiet no-op
        store.remove("missing.txt").await;
    }

    #[tokio::test]
    async fn test_corrupt_sidecar_reads_as_absent() {
        let dir = TempDir::new().unwrap();
        let store = MetadataStore::new(dir.path());

        let path = dir.path().join(format!("{}.json", storage_key("bad.txt")));
        std::fs::write(&path, b"{not json").unwrap();

        assert!(store.read_transfer("bad.txt").await.is_none());
    }

    #[test]
    fn test_storage_key_escapes_separators() {
        assert_eq!(storage_key("src/lib.rs"), "src%2flib.rs");
        assert_eq!(storage_key("a\\b"), "a%5cb");
        assert_eq!(storage_key("100%/done"), "100%25%2fdone");
    }

    #[test]
    fn test_storage_key_distinguishes_escape_lookalikes() {
        // A path that already contains the escaped form of a separator must
        // not collide with the path containing the separator itself
        assert_ne!(storage_key("a%2fb"), storage_key("a/b"));
        assert_ne!(storage_key("a%5cb"), storage_key("a\\b"));
        assert_ne!(storage_key("a%25b"), storage_key("a%b"));
    }

    proptest! {
        #[test]
        fn test_storage_key_is_injective(a in "[a-z/\\\\%.]{1,24}", b in "[a-z/\\\\%.]{1,24}") {
            if a != b {
                prop_assert_ne!(storage_key(&a), storage_key(&b));
            }
        }

        #[test]
        fn test_storage_key_never_contains_separators(path in ".{0,48}") {
            let key = storage_key(&path);
            prop_assert!(!key.contains('/'));
            prop_assert!(!key.contains('\\'));
        }
    }
}
