//! The transfer client trait and capability probes

use async_trait::async_trait;
use remora_types::{Protocol, RemoteEntry, Result};
use std::path::Path;
use tracing::debug;

/// Optional capabilities a client variant may or may not support
///
/// A probe reports whether the variant supports the operation without
/// attempting it, so callers can branch on capability instead of discovering
/// a limitation via an error mid-operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Changing remote file permissions
    Permissions,
    /// Executing a command on the remote host
    RemoteExec,
    /// Recursive remote file-name search
    NameSearch,
    /// Remote file content search
    ContentSearch,
}

/// Uniform transfer capability over one physical connection
///
/// The required core contract (connect / list / upload / download / delete /
/// ensure-directory) behaves identically across variants; the optional
/// operations fail fast with [`remora_types::Error::Unsupported`] on a
/// variant whose protocol cannot perform them.
#[async_trait]
pub trait TransferClient: Send + Sync {
    /// Wire protocol of this client variant
    fn protocol(&self) -> Protocol;

    /// Probe whether this variant supports an optional capability
    fn supports(&self, capability: Capability) -> bool;

    /// Establish the session using the configuration this client was built
    /// with
    ///
    /// On failure the client stays disconnected and the underlying transport
    /// error is surfaced unchanged.
    async fn connect(&self) -> Result<()>;

    /// Tear down the session
    async fn disconnect(&self) -> Result<()>;

    /// Whether the session is genuinely alive
    ///
    /// Probes the transport (keepalive / NOOP); a stale handle whose
    /// transport has silently died reports `false`.
    async fn is_connected(&self) -> bool;

    /// Re-establish the session after a detected failure
    ///
    /// Only triggered by explicit caller request. Concurrent reconnection
    /// requests collapse into one attempt: subsequent callers observe the
    /// in-progress flag and no-op.
    async fn reconnect(&self) -> Result<()>;

    /// Fetch the attributes of a remote path, `None` when it does not exist
    async fn stat(&self, remote: &str) -> Result<Option<RemoteEntry>>;

    /// List a remote directory, reporting failure distinctly
    async fn try_list_dir(&self, remote: &str) -> Result<Vec<RemoteEntry>>;

    /// List a remote directory, swallowing failure into an empty sequence
    ///
    /// Callers that must distinguish "truly empty" from "listing failed"
    /// should use [`Self::try_list_dir`] or precede the listing with an
    /// explicit [`Self::stat`].
    async fn list_dir(&self, remote: &str) -> Vec<RemoteEntry> {
        match self.try_list_dir(remote).await {
            Ok(entries) => entries,
            Err(e) => {
                debug!("listing '{}' failed, reading as empty: {}", remote, e);
                Vec::new()
            }
        }
    }

    /// Upload a local file to a remote path
    ///
    /// Ensures the remote parent directory exists, streams the file, then
    /// fetches the resulting remote attributes and records them in the
    /// metadata store. Does not retry.
    async fn upload_file(&self, local: &Path, remote: &str) -> Result<RemoteEntry>;

    /// Download a remote file to a local path
    ///
    /// Ensures the local parent directory exists, streams the bytes, then
    /// records metadata the same way as an upload.
    async fn download_file(&self, remote: &str, local: &Path) -> Result<RemoteEntry>;

    /// Delete a remote file, or recursively remove a remote directory
    async fn delete_remote(&self, remote: &str, is_dir: bool) -> Result<()>;

    /// Recursively create all missing segments of a remote directory path
    ///
    /// "Already exists" from a racing concurrent creator is not an error.
    /// When an existence check for the whole path fails unexpectedly, the
    /// client degrades to prefix-by-prefix creation, skipping segments that
    /// already exist.
    async fn ensure_remote_dir(&self, remote: &str) -> Result<()>;

    /// Change permissions of a remote path (capability: [`Capability::Permissions`])
    async fn set_permissions(&self, remote: &str, mode: u32) -> Result<()>;

    /// Execute a command on the remote host (capability: [`Capability::RemoteExec`])
    async fn exec(&self, command: &str) -> Result<String>;

    /// Recursively search remote file names (capability: [`Capability::NameSearch`])
    async fn search_names(&self, root: &str, pattern: &str) -> Result<Vec<String>>;

    /// Search remote file contents (capability: [`Capability::ContentSearch`])
    async fn search_contents(&self, root: &str, needle: &str) -> Result<Vec<String>>;
}
