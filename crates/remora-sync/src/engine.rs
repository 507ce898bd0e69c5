//! The synchronization engine

use crate::arbiter::{classify, UploadDecision};
use crate::ignore::IgnoreRules;
use remora_client::util::{join_remote, remote_file_name, rel_to_remote};
use remora_client::TransferClient;
use remora_config::SiteConfig;
use remora_meta::{MetadataStore, TransferRecord};
use remora_types::{
    system_time_ms, DeletePolicy, ProgressFn, RemoteEntry, Result, SyncDirection, SyncOutcome,
    TransferOp,
};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Tolerance when comparing remote and local modify times, absorbing
/// protocol timestamp-precision differences
pub const MTIME_TOLERANCE_MS: i64 = 1_000;

/// One synchronization request
#[derive(Debug, Clone)]
pub struct SyncRequest {
    /// Local root directory
    pub local_root: PathBuf,
    /// Remote root directory
    pub remote_root: String,
    /// Direction of the pass
    pub direction: SyncDirection,
    /// Deletion reconciliation policy
    pub delete: DeletePolicy,
    /// Exclusion patterns
    pub ignore: Vec<String>,
    /// Directory locally pruned files are moved into instead of being removed
    pub backup_dir: Option<PathBuf>,
    /// Request ID for tracking
    pub request_id: uuid::Uuid,
}

impl SyncRequest {
    /// Create a new bidirectional request with no deletion reconciliation
    pub fn new<P: AsRef<Path>, S: Into<String>>(local_root: P, remote_root: S) -> Self {
        Self {
            local_root: local_root.as_ref().to_path_buf(),
            remote_root: remote_root.into(),
            direction: SyncDirection::Bidirectional,
            delete: DeletePolicy::Off,
            ignore: Vec::new(),
            backup_dir: None,
            request_id: uuid::Uuid::new_v4(),
        }
    }

    /// Create a request from a site configuration
    pub fn from_site(site: &SiteConfig) -> Self {
        Self::new(&site.local_root, site.remote_root.clone())
            .with_ignore(site.ignore.clone())
            .with_backup_dir(site.backup_dir.clone())
    }

    /// Set the sync direction
    pub fn with_direction(mut self, direction: SyncDirection) -> Self {
        self.direction = direction;
        self
    }

    /// Set the deletion policy
    pub fn with_delete(mut self, delete: DeletePolicy) -> Self {
        self.delete = delete;
        self
    }

    /// Set the exclusion patterns
    pub fn with_ignore(mut self, ignore: Vec<String>) -> Self {
        self.ignore = ignore;
        self
    }

    /// Set the deletion-backup directory
    pub fn with_backup_dir(mut self, backup_dir: Option<PathBuf>) -> Self {
        self.backup_dir = backup_dir;
        self
    }
}

/// Outcome of the single-file upload path
#[derive(Debug, Clone)]
pub enum PutOutcome {
    /// The file was uploaded
    Uploaded(RemoteEntry),
    /// The remote changed since the last sync; nothing was transferred
    Conflict {
        /// The stored record from the last sync
        stored: TransferRecord,
        /// The freshly fetched remote attributes
        fresh: RemoteEntry,
    },
}

/// Reconciles a local root and a remote root through one transfer client
///
/// All operations are issued sequentially and awaited to completion; the
/// underlying session does not support concurrent request interleaving.
pub struct SyncEngine {
    client: Arc<dyn TransferClient>,
    store: Arc<MetadataStore>,
}

impl SyncEngine {
    /// Create an engine over a client and its metadata store
    pub fn new(client: Arc<dyn TransferClient>, store: Arc<MetadataStore>) -> Self {
        Self { client, store }
    }

    /// Run a synchronization pass
    ///
    /// Per-file failures are absorbed into the returned outcome; the pass as
    /// a whole never aborts on one file's failure.
    pub async fn sync(&self, request: &SyncRequest) -> SyncOutcome {
        self.sync_with_progress(request, None).await
    }

    /// Run a synchronization pass, reporting per-file progress
    pub async fn sync_with_progress(
        &self,
        request: &SyncRequest,
        progress: Option<ProgressFn>,
    ) -> SyncOutcome {
        let ignore = IgnoreRules::new(request.ignore.clone());
        let mut outcome = SyncOutcome::new();

        info!(
            request = %request.request_id,
            "syncing '{}' <-> '{}'",
            request.local_root.display(),
            request.remote_root
        );

        if request.direction.includes_push() {
            self.push_pass(request, &ignore, progress.as_ref(), &mut outcome)
                .await;
        }
        if request.direction.includes_pull() {
            self.pull_pass(request, &ignore, progress.as_ref(), &mut outcome)
                .await;
        }
        if request.delete.prunes_remote() {
            self.prune_remote(request, &ignore, &mut outcome).await;
        }
        if request.delete.prunes_local() {
            self.prune_local(request, &ignore, &mut outcome).await;
        }

        info!(
            request = %request.request_id,
            "sync finished: {} uploaded, {} downloaded, {} deleted, {} failed",
            outcome.uploaded,
            outcome.downloaded,
            outcome.deleted,
            outcome.failed.len()
        );
        outcome
    }

    /// Upload a single file outside a bulk pass, arbitrating conflicts
    ///
    /// Fetches the fresh remote attributes, consults the stored record, and
    /// blocks on divergence unless `force` is set. The caller resolves a
    /// reported conflict by an explicit policy choice and retries forced.
    pub async fn put_file(
        &self,
        local: &Path,
        remote: &str,
        force: bool,
    ) -> Result<PutOutcome> {
        let fresh = self.client.stat(remote).await?;
        let stored = self.store.read_transfer(local).await;

        let decision = classify(stored.as_ref(), fresh.as_ref(), force);
        if decision == UploadDecision::Conflict {
            if let (Some(stored), Some(fresh)) = (stored, fresh) {
                info!(
                    operation = "upload",
                    path = %local.display(),
                    success = false,
                    "remote changed since last sync, blocking"
                );
                return Ok(PutOutcome::Conflict { stored, fresh });
            }
        }

        let entry = self.client.upload_file(local, remote).await?;
        info!(operation = "upload", path = %local.display(), success = true, "uploaded");
        Ok(PutOutcome::Uploaded(entry))
    }

    /// Local-to-remote pass: upload every non-ignored local file
    ///
    /// Uploads are unconditional: the trigger for a bulk push is "user asked
    /// to push", not "something changed", so matching metadata does not skip
    /// a file.
    async fn push_pass(
        &self,
        request: &SyncRequest,
        ignore: &IgnoreRules,
        progress: Option<&ProgressFn>,
        outcome: &mut SyncOutcome,
    ) {
        let files = local_files(&request.local_root, ignore);
        let total = files.len() as u64;
        debug!(
            "push pass: {} files under '{}'",
            total,
            request.local_root.display()
        );

        for (index, (local, rel)) in files.iter().enumerate() {
            let remote = join_remote(&request.remote_root, rel);
            match self.client.upload_file(local, &remote).await {
                Ok(_) => {
                    outcome.uploaded += 1;
                    info!(operation = "upload", path = %rel, success = true, "uploaded");
                }
                Err(e) => {
                    warn!(operation = "upload", path = %rel, success = false, error = %e, "upload failed");
                    outcome.record_failure(rel.clone(), TransferOp::Upload);
                }
            }
            if let Some(report) = progress {
                report(index as u64 + 1, total, remote_file_name(rel));
            }
        }
    }

    /// Remote-to-local pass: mirror the remote tree, downloading files that
    /// are absent locally or differ beyond the mtime tolerance
    async fn pull_pass(
        &self,
        request: &SyncRequest,
        ignore: &IgnoreRules,
        progress: Option<&ProgressFn>,
        outcome: &mut SyncOutcome,
    ) {
        let mut completed: u64 = 0;
        // Explicit worklist keeps stack usage bounded on deep trees
        let mut pending = vec![request.remote_root.clone()];

        while let Some(dir) = pending.pop() {
            for entry in self.client.list_dir(&dir).await {
                let rel = remote_relative(&request.remote_root, &entry.path);
                if rel.is_empty() || ignore.is_ignored(&rel) {
                    continue;
                }
                let local = request.local_root.join(rel_to_local(&rel));

                if entry.is_dir {
                    if !local.exists() {
                        if let Err(e) = tokio::fs::create_dir_all(&local).await {
                            warn!(operation = "download", path = %rel, success = false, error = %e, "failed to mirror directory");
                            outcome.record_failure(rel, TransferOp::Download);
                            continue;
                        }
                    }
                    pending.push(entry.path);
                    continue;
                }

                if !needs_download(&local, entry.modified_ms) {
                    debug!("skipping '{}', local copy within tolerance", rel);
                    continue;
                }
                match self.client.download_file(&entry.path, &local).await {
                    Ok(_) => {
                        outcome.downloaded += 1;
                        info!(operation = "download", path = %rel, success = true, "downloaded");
                    }
                    Err(e) => {
                        warn!(operation = "download", path = %rel, success = false, error = %e, "download failed");
                        outcome.record_failure(rel.clone(), TransferOp::Download);
                    }
                }
                completed += 1;
                if let Some(report) = progress {
                    // The true total is unknown until the whole tree is walked
                    report(completed, 0, &entry.name);
                }
            }
        }
    }

    /// Delete remote paths absent on the local side
    ///
    /// Both files and directories are eligible. The deletion target set is
    /// recomputed from a fresh recursive listing so it reflects the true
    /// post-transfer state.
    async fn prune_remote(
        &self,
        request: &SyncRequest,
        ignore: &IgnoreRules,
        outcome: &mut SyncOutcome,
    ) {
        // Listings swallow failure into emptiness, so an explicit existence
        // check decides whether the remote side is trustworthy at all
        match self.client.stat(&request.remote_root).await {
            Ok(Some(_)) => {}
            Ok(None) => return,
            Err(e) => {
                warn!("skipping remote prune, remote root unreachable: {}", e);
                return;
            }
        }

        let keep = local_relative_set(&request.local_root, ignore);
        let mut candidates = self.collect_remote_tree(&request.remote_root, ignore).await;
        // Parents sort before children, so a pruned directory covers its
        // descendants and they are skipped below
        candidates.sort();

        let mut pruned_dirs: Vec<String> = Vec::new();
        for (rel, is_dir) in candidates {
            if pruned_dirs
                .iter()
                .any(|p| rel.starts_with(p.as_str()) && rel[p.len()..].starts_with('/'))
            {
                continue;
            }
            if keep.contains(&rel) {
                continue;
            }
            let remote = join_remote(&request.remote_root, &rel);
            match self.client.delete_remote(&remote, is_dir).await {
                Ok(()) => {
                    outcome.deleted += 1;
                    info!(operation = "delete-remote", path = %rel, success = true, "pruned");
                    self.store
                        .remove(request.local_root.join(rel_to_local(&rel)))
                        .await;
                    if is_dir {
                        pruned_dirs.push(rel);
                    }
                }
                Err(e) => {
                    warn!(operation = "delete-remote", path = %rel, success = false, error = %e, "prune failed");
                    outcome.record_failure(rel, TransferOp::DeleteRemote);
                }
            }
        }
    }

    /// Delete local files absent on the remote side
    ///
    /// Files only: local directories are never pruned, so unrelated local
    /// content colocated with synced files survives. With a backup directory
    /// configured, files are moved there instead of removed.
    async fn prune_local(
        &self,
        request: &SyncRequest,
        ignore: &IgnoreRules,
        outcome: &mut SyncOutcome,
    ) {
        match self.client.stat(&request.remote_root).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                warn!(
                    "skipping local prune, remote root '{}' does not exist",
                    request.remote_root
                );
                return;
            }
            Err(e) => {
                warn!("skipping local prune, remote root unreachable: {}", e);
                return;
            }
        }

        let remote_files: HashSet<String> = self
            .collect_remote_tree(&request.remote_root, ignore)
            .await
            .into_iter()
            .filter(|(_, is_dir)| !is_dir)
            .map(|(rel, _)| rel)
            .collect();

        for (local, rel) in local_files(&request.local_root, ignore) {
            if remote_files.contains(&rel) {
                continue;
            }
            let result = match &request.backup_dir {
                Some(backup_root) => move_to_backup(&local, backup_root, &rel).await,
                None => tokio::fs::remove_file(&local).await.map_err(Into::into),
            };
            match result {
                Ok(()) => {
                    outcome.deleted += 1;
                    info!(operation = "delete-local", path = %rel, success = true, "pruned");
                    self.store.remove(&local).await;
                }
                Err(e) => {
                    warn!(operation = "delete-local", path = %rel, success = false, error = %e, "prune failed");
                    outcome.record_failure(rel, TransferOp::DeleteLocal);
                }
            }
        }
    }

    /// Recursively list the remote tree as root-relative `(path, is_dir)`
    /// pairs, excluding ignored paths
    async fn collect_remote_tree(
        &self,
        remote_root: &str,
        ignore: &IgnoreRules,
    ) -> Vec<(String, bool)> {
        let mut collected = Vec::new();
        let mut pending = vec![remote_root.to_string()];
        while let Some(dir) = pending.pop() {
            for entry in self.client.list_dir(&dir).await {
                let rel = remote_relative(remote_root, &entry.path);
                if rel.is_empty() || ignore.is_ignored(&rel) {
                    continue;
                }
                collected.push((rel, entry.is_dir));
                if entry.is_dir {
                    pending.push(entry.path);
                }
            }
        }
        collected
    }
}

/// Whether a remote file must be downloaded over the local copy
fn needs_download(local: &Path, remote_modified_ms: i64) -> bool {
    match std::fs::metadata(local).and_then(|m| m.modified()) {
        Ok(modified) => (remote_modified_ms - system_time_ms(modified)).abs() > MTIME_TOLERANCE_MS,
        Err(_) => true,
    }
}

/// Non-ignored local files as `(absolute, root-relative)` pairs, in
/// enumeration order
fn local_files(root: &Path, ignore: &IgnoreRules) -> Vec<(PathBuf, String)> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).into_iter().filter_map(std::result::Result::ok) {
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(rel_path) = entry.path().strip_prefix(root) else {
            continue;
        };
        let rel = rel_to_remote(rel_path);
        if rel.is_empty() || ignore.is_ignored(&rel) {
            continue;
        }
        files.push((entry.path().to_path_buf(), rel));
    }
    files
}

/// Non-ignored local files and directories as root-relative paths
fn local_relative_set(root: &Path, ignore: &IgnoreRules) -> HashSet<String> {
    let mut set = HashSet::new();
    for entry in WalkDir::new(root).into_iter().filter_map(std::result::Result::ok) {
        let Ok(rel_path) = entry.path().strip_prefix(root) else {
            continue;
        };
        let rel = rel_to_remote(rel_path);
        if rel.is_empty() || ignore.is_ignored(&rel) {
            continue;
        }
        set.insert(rel);
    }
    set
}

/// Root-relative form of a remote path
fn remote_relative(remote_root: &str, path: &str) -> String {
    let root = remote_root.trim_end_matches('/');
    path.strip_prefix(root)
        .map(|rest| rest.trim_start_matches('/').to_string())
        .unwrap_or_else(|| path.trim_start_matches('/').to_string())
}

/// Convert a `/`-separated relative path into a local path
fn rel_to_local(rel: &str) -> PathBuf {
    rel.split('/').collect()
}

/// Move a locally pruned file into the backup directory, mirroring its
/// relative path
async fn move_to_backup(local: &Path, backup_root: &Path, rel: &str) -> Result<()> {
    let target = backup_root.join(rel_to_local(rel));
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::rename(local, &target).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    #[test]
    fn test_remote_relative() {
        assert_eq!(remote_relative("/srv/www", "/srv/www/a/b.txt"), "a/b.txt");
        assert_eq!(remote_relative("/srv/www/", "/srv/www/a"), "a");
        assert_eq!(remote_relative("/", "/a.txt"), "a.txt");
    }

    #[test]
    fn test_rel_to_local_round_trip() {
        let local = rel_to_local("docs/api/index.md");
        assert_eq!(rel_to_remote(&local), "docs/api/index.md");
    }

    #[test]
    fn test_needs_download_absent_file() {
        let dir = TempDir::new().unwrap();
        assert!(needs_download(&dir.path().join("missing.txt"), 1_000_000));
    }

    #[test]
    fn test_needs_download_tolerance_boundary() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, b"x").unwrap();

        let local_ms = system_time_ms(std::fs::metadata(&path).unwrap().modified().unwrap());
        // Inside the tolerance in both directions
        assert!(!needs_download(&path, local_ms + MTIME_TOLERANCE_MS));
        assert!(!needs_download(&path, local_ms - MTIME_TOLERANCE_MS));
        // Just past it
        assert!(needs_download(&path, local_ms + MTIME_TOLERANCE_MS + 1));
        assert!(needs_download(&path, local_ms - MTIME_TOLERANCE_MS - 1));
    }

    #[test]
    fn test_local_files_excludes_ignored() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::create_dir_all(dir.path().join(".git")).unwrap();
        std::fs::write(dir.path().join("src/main.rs"), b"fn main() {}").unwrap();
        std::fs::write(dir.path().join(".git/config"), b"[core]").unwrap();

        let ignore = IgnoreRules::new([".git"]);
        let files = local_files(dir.path(), &ignore);
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].1, "src/main.rs");
    }

    #[test]
    fn test_local_relative_set_includes_directories() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("docs/api")).unwrap();
        std::fs::write(dir.path().join("docs/api/index.md"), b"# api").unwrap();

        let set = local_relative_set(dir.path(), &IgnoreRules::default());
        assert!(set.contains("docs"));
        assert!(set.contains("docs/api"));
        assert!(set.contains("docs/api/index.md"));
    }

    #[test]
    fn test_needs_download_with_old_local_mtime() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stale.txt");
        std::fs::write(&path, b"x").unwrap();
        let old = SystemTime::now() - Duration::from_secs(3600);
        filetime::set_file_mtime(&path, filetime::FileTime::from_system_time(old)).unwrap();

        let remote_ms = system_time_ms(SystemTime::now());
        assert!(needs_download(&path, remote_ms));
    }
}
