//! FTP transfer client
//!
//! Covers the required core contract only. The optional capabilities
//! (permissions, remote exec, searches) report a definitive "unsupported"
//! error instead of attempting an approximation, so callers can branch on
//! capability rather than discover the limitation mid-operation.

use crate::client::{Capability, TransferClient};
use crate::util::{join_remote, path_prefixes, remote_file_name, remote_parent};
use async_trait::async_trait;
use remora_config::{AuthMethod, SiteConfig};
use remora_meta::MetadataStore;
use remora_types::{system_time_ms, Error, Protocol, RemoteEntry, Result};
use std::net::ToSocketAddrs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use suppaftp::types::FileType;
use suppaftp::{FtpError, FtpStream, Status};
use tracing::{debug, info};

/// Transfer client over plain FTP
///
/// Owns one control connection. Blocking protocol I/O runs on the blocking
/// thread pool behind a mutex, the same way the SFTP variant works.
pub struct FtpClient {
    config: SiteConfig,
    store: Arc<MetadataStore>,
    stream: Arc<Mutex<Option<FtpStream>>>,
    reconnecting: Arc<AtomicBool>,
}

fn lock_stream(stream: &Mutex<Option<FtpStream>>) -> Result<MutexGuard<'_, Option<FtpStream>>> {
    stream
        .lock()
        .map_err(|_| Error::other("ftp session lock poisoned"))
}

fn is_unavailable(error: &FtpError) -> bool {
    matches!(error, FtpError::UnexpectedResponse(resp) if resp.status == Status::FileUnavailable)
}

fn net(context: &str, error: &FtpError) -> Error {
    Error::network(format!("{}: {}", context, error))
}

/// Probe directory existence with a CWD round-trip
///
/// FTP has no portable stat for directories, so the probe changes into the
/// target and back.
fn dir_exists(stream: &mut FtpStream, path: &str) -> Result<bool> {
    let original = stream
        .pwd()
        .map_err(|e| net("failed to read working directory", &e))?;
    match stream.cwd(path) {
        Ok(()) => {
            stream
                .cwd(&original)
                .map_err(|e| net("failed to restore working directory", &e))?;
            Ok(true)
        }
        Err(e) if is_unavailable(&e) => Ok(false),
        Err(e) => Err(net("directory probe failed", &e)),
    }
}

/// Fetch file attributes via SIZE and MDTM
fn file_entry(stream: &mut FtpStream, path: &str) -> Result<RemoteEntry> {
    let size = stream
        .size(path)
        .map_err(|e| net("failed to read file size", &e))?;
    let modified_ms = stream
        .mdtm(path)
        .map(|dt| dt.and_utc().timestamp_millis())
        .unwrap_or(0);
    Ok(RemoteEntry {
        name: remote_file_name(path).to_string(),
        path: path.to_string(),
        is_dir: false,
        size: Some(size as u64),
        modified_ms,
    })
}

impl FtpClient {
    /// Create a client for the given site, recording transfers into `store`
    pub fn new(config: SiteConfig, store: Arc<MetadataStore>) -> Self {
        Self {
            config,
            store,
            stream: Arc::new(Mutex::new(None)),
            reconnecting: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Establish a fresh control connection, replacing any previous one
    async fn establish(&self) -> Result<()> {
        let config = self.config.clone();
        let stream = Arc::clone(&self.stream);

        tokio::task::spawn_blocking(move || -> Result<()> {
            let addr = (config.host.as_str(), config.effective_port())
                .to_socket_addrs()
                .map_err(|e| Error::connect(format!("failed to resolve '{}': {}", config.host, e)))?
                .next()
                .ok_or_else(|| {
                    Error::connect(format!("no address found for '{}'", config.host))
                })?;

            let mut ftp = FtpStream::connect_timeout(addr, config.timeouts.connect())
                .map_err(|e| Error::connect(format!("ftp connect to {} failed: {}", addr, e)))?;

            let operation = config.timeouts.operation();
            let _ = ftp.get_ref().set_read_timeout(Some(operation));
            let _ = ftp.get_ref().set_write_timeout(Some(operation));

            let AuthMethod::Password { password } = &config.auth else {
                return Err(Error::connect("ftp requires password authentication"));
            };
            ftp.login(&config.username, password)
                .map_err(|e| Error::connect(format!("ftp login failed: {}", e)))?;
            ftp.transfer_type(FileType::Binary)
                .map_err(|e| Error::connect(format!("failed to set binary mode: {}", e)))?;

            *lock_stream(&stream)? = Some(ftp);
            Ok(())
        })
        .await
        .map_err(|e| Error::other(format!("blocking task join failed: {}", e)))?
    }

    /// Run a closure against the live control connection on the blocking pool
    async fn with_stream<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut FtpStream) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let stream = Arc::clone(&self.stream);
        tokio::task::spawn_blocking(move || {
            let mut guard = lock_stream(&stream)?;
            let session = guard
                .as_mut()
                .ok_or_else(|| Error::connect("not connected"))?;
            f(session)
        })
        .await
        .map_err(|e| Error::other(format!("blocking task join failed: {}", e)))?
    }

    fn unsupported(&self, operation: &str) -> Error {
        Error::unsupported(operation, Protocol::Ftp)
    }
}

/// Parse one LIST line into a remote entry, `None` when the line does not
/// parse or names `.`/`..`
fn parse_list_line(dir: &str, line: &str) -> Option<RemoteEntry> {
    match suppaftp::list::File::try_from(line) {
        Ok(file) => {
            let name = file.name().to_string();
            if name == "." || name == ".." {
                return None;
            }
            let path = join_remote(dir, &name);
            let is_dir = file.is_directory();
            Some(RemoteEntry {
                name,
                path,
                is_dir,
                size: if is_dir { None } else { Some(file.size() as u64) },
                modified_ms: system_time_ms(file.modified()),
            })
        }
        Err(e) => {
            debug!("skipping unparsable LIST line '{}': {}", line, e);
            None
        }
    }
}

#[async_trait]
impl TransferClient for FtpClient {
    fn protocol(&self) -> Protocol {
        Protocol::Ftp
    }

    fn supports(&self, _capability: Capability) -> bool {
        false
    }

    async fn connect(&self) -> Result<()> {
        self.establish().await?;
        info!(
            "connected to ftp://{}@{}:{}",
            self.config.username,
            self.config.host,
            self.config.effective_port()
        );
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        let stream = Arc::clone(&self.stream);
        tokio::task::spawn_blocking(move || -> Result<()> {
            if let Some(mut ftp) = lock_stream(&stream)?.take() {
                let _ = ftp.quit();
            }
            Ok(())
        })
        .await
        .map_err(|e| Error::other(format!("blocking task join failed: {}", e)))?
    }

    async fn is_connected(&self) -> bool {
        let stream = Arc::clone(&self.stream);
        tokio::task::spawn_blocking(move || {
            let Ok(mut guard) = stream.lock() else {
                return false;
            };
            match guard.as_mut() {
                Some(ftp) => ftp.noop().is_ok(),
                None => false,
            }
        })
        .await
        .unwrap_or(false)
    }

    async fn reconnect(&self) -> Result<()> {
        if self.reconnecting.swap(true, Ordering::SeqCst) {
            debug!("reconnection already in progress, skipping");
            return Ok(());
        }
        info!("reconnecting to {}", self.config.host);
        let result = self.establish().await;
        self.reconnecting.store(false, Ordering::SeqCst);
        result
    }

    async fn stat(&self, remote: &str) -> Result<Option<RemoteEntry>> {
        let remote = remote.to_string();
        self.with_stream(move |ftp| match ftp.size(&remote) {
            Ok(_) => file_entry(ftp, &remote).map(Some),
            Err(e) if is_unavailable(&e) => {
                if dir_exists(ftp, &remote)? {
                    Ok(Some(RemoteEntry {
                        name: remote_file_name(&remote).to_string(),
                        path: remote.clone(),
                        is_dir: true,
                        size: None,
                        modified_ms: 0,
                    }))
                } else {
                    Ok(None)
                }
            }
            Err(e) => Err(net("stat failed", &e)),
        })
        .await
    }

    async fn try_list_dir(&self, remote: &str) -> Result<Vec<RemoteEntry>> {
        let remote = remote.to_string();
        self.with_stream(move |ftp| {
            let lines = ftp
                .list(Some(remote.as_str()))
                .map_err(|e| net("listing failed", &e))?;
            Ok(lines
                .iter()
                .filter_map(|line| parse_list_line(&remote, line))
                .collect())
        })
        .await
    }

    async fn upload_file(&self, local: &Path, remote: &str) -> Result<RemoteEntry> {
        if let Some(parent) = remote_parent(remote) {
            self.ensure_remote_dir(&parent).await?;
        }

        let local_path = local.to_path_buf();
        let remote_path = remote.to_string();
        let entry = self
            .with_stream(move |ftp| {
                let mut src = std::fs::File::open(&local_path).map_err(|e| Error::Io {
                    message: format!("failed to open '{}': {}", local_path.display(), e),
                })?;
                ftp.put_file(&remote_path, &mut src)
                    .map_err(|e| net("upload failed", &e))?;
                file_entry(ftp, &remote_path)
            })
            .await?;

        self.store
            .record_transfer(local, remote, entry.modified_ms, entry.size.unwrap_or(0))
            .await;
        debug!("uploaded '{}' -> '{}'", local.display(), remote);
        Ok(entry)
    }

    async fn download_file(&self, remote: &str, local: &Path) -> Result<RemoteEntry> {
        if let Some(parent) = local.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| Error::Io {
                message: format!("failed to create '{}': {}", parent.display(), e),
            })?;
        }

        let local_path = local.to_path_buf();
        let remote_path = remote.to_string();
        let entry = self
            .with_stream(move |ftp| {
                let buffer = ftp
                    .retr_as_buffer(&remote_path)
                    .map_err(|e| net("download failed", &e))?;
                std::fs::write(&local_path, buffer.into_inner()).map_err(|e| Error::Io {
                    message: format!("failed to write '{}': {}", local_path.display(), e),
                })?;

                let entry = file_entry(ftp, &remote_path)?;

                // Propagate the remote mtime so later pull passes can skip
                // files inside the comparison tolerance
                let mtime = filetime::FileTime::from_unix_time(entry.modified_ms / 1000, 0);
                let _ = filetime::set_file_mtime(&local_path, mtime);
                Ok(entry)
            })
            .await?;

        self.store
            .record_transfer(local, remote, entry.modified_ms, entry.size.unwrap_or(0))
            .await;
        debug!("downloaded '{}' -> '{}'", remote, local.display());
        Ok(entry)
    }

    async fn delete_remote(&self, remote: &str, is_dir: bool) -> Result<()> {
        let remote = remote.to_string();
        self.with_stream(move |ftp| {
            if !is_dir {
                return ftp.rm(&remote).map_err(|e| net("delete failed", &e));
            }

            // Depth-first with an explicit worklist; directories removed in
            // reverse discovery order so children go before parents
            let mut pending = vec![remote.clone()];
            let mut dirs = Vec::new();
            while let Some(dir) = pending.pop() {
                let lines = ftp
                    .list(Some(dir.as_str()))
                    .map_err(|e| net("listing failed", &e))?;
                for entry in lines.iter().filter_map(|line| parse_list_line(&dir, line)) {
                    if entry.is_dir {
                        pending.push(entry.path);
                    } else {
                        ftp.rm(&entry.path).map_err(|e| net("delete failed", &e))?;
                    }
                }
                dirs.push(dir);
            }
            for dir in dirs.iter().rev() {
                ftp.rmdir(dir).map_err(|e| net("rmdir failed", &e))?;
            }
            Ok(())
        })
        .await
    }

    async fn ensure_remote_dir(&self, remote: &str) -> Result<()> {
        let remote = remote.to_string();
        self.with_stream(move |ftp| {
            // Whole-path probe first; on unexpected failure fall back to the
            // prefix-by-prefix walk below
            if let Ok(true) = dir_exists(ftp, &remote) {
                return Ok(());
            }

            for prefix in path_prefixes(&remote) {
                match dir_exists(ftp, &prefix) {
                    Ok(true) => continue,
                    Ok(false) | Err(_) => {}
                }
                if let Err(e) = ftp.mkdir(&prefix) {
                    // A concurrent creator may have won the race; that is
                    // idempotent success, not an error
                    if !dir_exists(ftp, &prefix).unwrap_or(false) {
                        return Err(net("failed to create directory", &e));
                    }
                }
            }
            Ok(())
        })
        .await
    }

    async fn set_permissions(&self, _remote: &str, _mode: u32) -> Result<()> {
        Err(self.unsupported("permission change"))
    }

    async fn exec(&self, _command: &str) -> Result<String> {
        Err(self.unsupported("remote command execution"))
    }

    async fn search_names(&self, _root: &str, _pattern: &str) -> Result<Vec<String>> {
        Err(self.unsupported("file name search"))
    }

    async fn search_contents(&self, _root: &str, _needle: &str) -> Result<Vec<String>> {
        Err(self.unsupported("content search"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use remora_types::ErrorKind;
    use tempfile::TempDir;

    fn client() -> FtpClient {
        let dir = TempDir::new().unwrap();
        let config = SiteConfig {
            protocol: Protocol::Ftp,
            host: "ftp.invalid".to_string(),
            username: "anonymous".to_string(),
            auth: AuthMethod::Password {
                password: "guest".to_string(),
            },
            ..SiteConfig::default()
        };
        FtpClient::new(config, Arc::new(MetadataStore::new(dir.path())))
    }

    #[test]
    fn test_capability_probes_all_report_unsupported() {
        let client = client();
        assert!(!client.supports(Capability::Permissions));
        assert!(!client.supports(Capability::RemoteExec));
        assert!(!client.supports(Capability::NameSearch));
        assert!(!client.supports(Capability::ContentSearch));
        assert_eq!(client.protocol(), Protocol::Ftp);
    }

    #[tokio::test]
    async fn test_unsupported_operations_fail_fast_without_a_session() {
        let client = client();

        let err = client.set_permissions("/srv/file", 0o644).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsupported);

        let err = client.exec("ls").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsupported);

        let err = client.search_names("/", "txt").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsupported);

        let err = client.search_contents("/", "main").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsupported);
    }

    #[tokio::test]
    async fn test_transfer_operations_require_a_connection() {
        let client = client();
        assert!(!client.is_connected().await);

        let err = client.stat("/pub").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connect);
    }

    #[test]
    fn test_parse_list_line_unix_format() {
        let entry =
            parse_list_line("/pub", "-rw-r--r-- 1 ftp ftp 4096 Jan 10 2024 notes.txt").unwrap();
        assert_eq!(entry.name, "notes.txt");
        assert_eq!(entry.path, "/pub/notes.txt");
        assert!(!entry.is_dir);
        assert_eq!(entry.size, Some(4096));

        let dir = parse_list_line("/pub", "drwxr-xr-x 2 ftp ftp 4096 Jan 10 2024 docs").unwrap();
        assert!(dir.is_dir);
        assert_eq!(dir.size, None);
        assert_eq!(dir.path, "/pub/docs");
    }

    #[test]
    fn test_parse_list_line_skips_dot_entries_and_noise() {
        assert!(parse_list_line("/pub", "drwxr-xr-x 2 ftp ftp 4096 Jan 10 2024 .").is_none());
        assert!(parse_list_line("/pub", "total 16").is_none());
    }
}
