//! SFTP transfer client over an SSH session

use crate::client::{Capability, TransferClient};
use crate::util::{path_prefixes, remote_file_name, remote_parent};
use async_trait::async_trait;
use remora_config::{AuthMethod, SiteConfig};
use remora_meta::MetadataStore;
use remora_types::{Error, Protocol, RemoteEntry, Result};
use ssh2::{ErrorCode, FileStat, Session, Sftp};
use std::io::Read;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

/// SFTP status codes for "no such file/path"
const SFTP_NO_SUCH_FILE: i32 = 2;
const SFTP_NO_SUCH_PATH: i32 = 10;

/// One live SSH session plus its SFTP subsystem
struct SftpState {
    sess: Session,
    sftp: Sftp,
}

/// Transfer client over SFTP
///
/// Owns one session. The blocking protocol handle lives behind a mutex and
/// all I/O runs on the blocking thread pool, so the async surface stays
/// non-blocking while the session itself processes requests sequentially.
pub struct SftpClient {
    config: SiteConfig,
    store: Arc<MetadataStore>,
    state: Arc<Mutex<Option<SftpState>>>,
    reconnecting: Arc<AtomicBool>,
}

fn lock_state(state: &Mutex<Option<SftpState>>) -> Result<MutexGuard<'_, Option<SftpState>>> {
    state
        .lock()
        .map_err(|_| Error::other("sftp session lock poisoned"))
}

fn is_not_found(error: &ssh2::Error) -> bool {
    matches!(
        error.code(),
        ErrorCode::SFTP(SFTP_NO_SUCH_FILE) | ErrorCode::SFTP(SFTP_NO_SUCH_PATH)
    )
}

fn entry_from_stat(path: &str, stat: &FileStat) -> RemoteEntry {
    let is_dir = stat.is_dir();
    RemoteEntry {
        name: remote_file_name(path).to_string(),
        path: path.to_string(),
        is_dir,
        size: if is_dir { None } else { stat.size },
        modified_ms: stat
            .mtime
            .map(|secs| i64::try_from(secs).unwrap_or(i64::MAX).saturating_mul(1000))
            .unwrap_or(0),
    }
}

/// Run a command over a fresh channel, returning stdout and the exit status
fn run_command(sess: &Session, command: &str) -> Result<(String, i32)> {
    let mut channel = sess
        .channel_session()
        .map_err(|e| Error::network(format!("failed to open channel: {}", e)))?;
    channel
        .exec(command)
        .map_err(|e| Error::network(format!("failed to execute command: {}", e)))?;
    let mut output = String::new();
    channel
        .read_to_string(&mut output)
        .map_err(|e| Error::network(format!("failed to read command output: {}", e)))?;
    let _ = channel.wait_close();
    let status = channel.exit_status().unwrap_or(-1);
    Ok((output, status))
}

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

impl SftpClient {
    /// Create a client for the given site, recording transfers into `store`
    pub fn new(config: SiteConfig, store: Arc<MetadataStore>) -> Self {
        Self {
            config,
            store,
            state: Arc::new(Mutex::new(None)),
            reconnecting: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Establish a fresh session, replacing any previous one
    async fn establish(&self) -> Result<()> {
        let config = self.config.clone();
        let state = Arc::clone(&self.state);

        tokio::task::spawn_blocking(move || -> Result<()> {
            let addr = (config.host.as_str(), config.effective_port())
                .to_socket_addrs()
                .map_err(|e| Error::connect(format!("failed to resolve '{}': {}", config.host, e)))?
                .next()
                .ok_or_else(|| {
                    Error::connect(format!("no address found for '{}'", config.host))
                })?;

            let tcp = TcpStream::connect_timeout(&addr, config.timeouts.connect())
                .map_err(|e| Error::connect(format!("tcp connect to {} failed: {}", addr, e)))?;

            let mut sess =
                Session::new().map_err(|e| Error::connect(format!("ssh session: {}", e)))?;
            sess.set_tcp_stream(tcp);
            sess.handshake()
                .map_err(|e| Error::connect(format!("ssh handshake failed: {}", e)))?;

            match &config.auth {
                AuthMethod::Password { password } => sess
                    .userauth_password(&config.username, password)
                    .map_err(|e| Error::connect(format!("password auth failed: {}", e)))?,
                AuthMethod::KeyFile { path, passphrase } => sess
                    .userauth_pubkey_file(&config.username, None, path, passphrase.as_deref())
                    .map_err(|e| Error::connect(format!("key auth failed: {}", e)))?,
                AuthMethod::Agent => sess
                    .userauth_agent(&config.username)
                    .map_err(|e| Error::connect(format!("agent auth failed: {}", e)))?,
            }
            if !sess.authenticated() {
                return Err(Error::connect("authentication failed"));
            }

            let op_ms = u32::try_from(config.timeouts.operation().as_millis()).unwrap_or(u32::MAX);
            sess.set_timeout(op_ms);
            sess.set_keepalive(false, 30);

            let sftp = sess
                .sftp()
                .map_err(|e| Error::connect(format!("sftp subsystem failed: {}", e)))?;

            *lock_state(&state)? = Some(SftpState { sess, sftp });
            Ok(())
        })
        .await
        .map_err(|e| Error::other(format!("blocking task join failed: {}", e)))?
    }

    /// Run a closure against the live session on the blocking pool
    async fn with_session<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&SftpState) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let state = Arc::clone(&self.state);
        tokio::task::spawn_blocking(move || {
            let guard = lock_state(&state)?;
            let session = guard
                .as_ref()
                .ok_or_else(|| Error::connect("not connected"))?;
            f(session)
        })
        .await
        .map_err(|e| Error::other(format!("blocking task join failed: {}", e)))?
    }
}

#[async_trait]
impl TransferClient for SftpClient {
    fn protocol(&self) -> Protocol {
        Protocol::Sftp
    }

    fn supports(&self, _capability: Capability) -> bool {
        true
    }

    async fn connect(&self) -> Result<()> {
        self.establish().await?;
        info!(
            "connected to sftp://{}@{}:{}",
            self.config.username,
            self.config.host,
            self.config.effective_port()
        );
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        let state = Arc::clone(&self.state);
        tokio::task::spawn_blocking(move || -> Result<()> {
            if let Some(st) = lock_state(&state)?.take() {
                let _ = st.sess.disconnect(None, "session closed", None);
            }
            Ok(())
        })
        .await
        .map_err(|e| Error::other(format!("blocking task join failed: {}", e)))?
    }

    async fn is_connected(&self) -> bool {
        let state = Arc::clone(&self.state);
        tokio::task::spawn_blocking(move || {
            let Ok(guard) = state.lock() else {
                return false;
            };
            match guard.as_ref() {
                Some(st) => st.sess.keepalive_send().is_ok(),
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
        self.with_session(move |st| match st.sftp.stat(Path::new(&remote)) {
            Ok(stat) => Ok(Some(entry_from_stat(&remote, &stat))),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(Error::network(format!("stat '{}' failed: {}", remote, e))),
        })
        .await
    }

    async fn try_list_dir(&self, remote: &str) -> Result<Vec<RemoteEntry>> {
        let remote = remote.to_string();
        self.with_session(move |st| {
            let listing = st
                .sftp
                .readdir(Path::new(&remote))
                .map_err(|e| Error::network(format!("listing '{}' failed: {}", remote, e)))?;
            Ok(listing
                .iter()
                .map(|(path, stat)| entry_from_stat(&path.to_string_lossy(), stat))
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
            .with_session(move |st| {
                let mut src = std::fs::File::open(&local_path).map_err(|e| Error::Io {
                    message: format!("failed to open '{}': {}", local_path.display(), e),
                })?;
                let mut dst = st.sftp.create(Path::new(&remote_path)).map_err(|e| {
                    Error::network(format!("failed to create '{}': {}", remote_path, e))
                })?;
                std::io::copy(&mut src, &mut dst).map_err(|e| {
                    Error::network(format!("upload of '{}' failed: {}", remote_path, e))
                })?;
                drop(dst);

                let stat = st.sftp.stat(Path::new(&remote_path)).map_err(|e| {
                    Error::network(format!("stat after upload of '{}' failed: {}", remote_path, e))
                })?;
                Ok(entry_from_stat(&remote_path, &stat))
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
            .with_session(move |st| {
                let mut src = st.sftp.open(Path::new(&remote_path)).map_err(|e| {
                    Error::network(format!("failed to open '{}': {}", remote_path, e))
                })?;
                let mut dst = std::fs::File::create(&local_path).map_err(|e| Error::Io {
                    message: format!("failed to create '{}': {}", local_path.display(), e),
                })?;
                std::io::copy(&mut src, &mut dst).map_err(|e| {
                    Error::network(format!("download of '{}' failed: {}", remote_path, e))
                })?;
                drop(dst);

                let stat = st.sftp.stat(Path::new(&remote_path)).map_err(|e| {
                    Error::network(format!(
                        "stat after download of '{}' failed: {}",
                        remote_path, e
                    ))
                })?;
                let entry = entry_from_stat(&remote_path, &stat);

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
        self.with_session(move |st| {
            if !is_dir {
                return st
                    .sftp
                    .unlink(Path::new(&remote))
                    .map_err(|e| Error::network(format!("delete '{}' failed: {}", remote, e)));
            }

            // Depth-first with an explicit worklist; directories removed in
            // reverse discovery order so children go before parents
            let mut pending = vec![remote.clone()];
            let mut dirs = Vec::new();
            while let Some(dir) = pending.pop() {
                let listing = st
                    .sftp
                    .readdir(Path::new(&dir))
                    .map_err(|e| Error::network(format!("listing '{}' failed: {}", dir, e)))?;
                for (path, stat) in listing {
                    if stat.is_dir() {
                        pending.push(path.to_string_lossy().into_owned());
                    } else {
                        st.sftp.unlink(&path).map_err(|e| {
                            Error::network(format!(
                                "delete '{}' failed: {}",
                                path.to_string_lossy(),
                                e
                            ))
                        })?;
                    }
                }
                dirs.push(dir);
            }
            for dir in dirs.iter().rev() {
                st.sftp
                    .rmdir(Path::new(dir))
                    .map_err(|e| Error::network(format!("rmdir '{}' failed: {}", dir, e)))?;
            }
            Ok(())
        })
        .await
    }

    async fn ensure_remote_dir(&self, remote: &str) -> Result<()> {
        let remote = remote.to_string();
        self.with_session(move |st| {
            // Whole-path check first; any unexpected failure degrades to the
            // prefix-by-prefix walk below
            match st.sftp.stat(Path::new(&remote)) {
                Ok(stat) if stat.is_dir() => return Ok(()),
                Ok(_) => {
                    return Err(Error::network(format!(
                        "'{}' exists and is not a directory",
                        remote
                    )))
                }
                Err(_) => {}
            }

            for prefix in path_prefixes(&remote) {
                match st.sftp.stat(Path::new(&prefix)) {
                    Ok(stat) if stat.is_dir() => continue,
                    Ok(_) => {
                        return Err(Error::network(format!(
                            "'{}' exists and is not a directory",
                            prefix
                        )))
                    }
                    Err(_) => {}
                }
                if let Err(e) = st.sftp.mkdir(Path::new(&prefix), 0o755) {
                    // A concurrent creator may have won the race; that is
                    // idempotent success, not an error
                    match st.sftp.stat(Path::new(&prefix)) {
                        Ok(stat) if stat.is_dir() => {}
                        _ => {
                            return Err(Error::network(format!(
                                "failed to create '{}': {}",
                                prefix, e
                            )))
                        }
                    }
                }
            }
            Ok(())
        })
        .await
    }

    async fn set_permissions(&self, remote: &str, mode: u32) -> Result<()> {
        let remote = remote.to_string();
        self.with_session(move |st| {
            st.sftp
                .setstat(
                    Path::new(&remote),
                    FileStat {
                        size: None,
                        uid: None,
                        gid: None,
                        perm: Some(mode),
                        atime: None,
                        mtime: None,
                    },
                )
                .map_err(|e| Error::network(format!("chmod '{}' failed: {}", remote, e)))
        })
        .await
    }

    async fn exec(&self, command: &str) -> Result<String> {
        let command = command.to_string();
        self.with_session(move |st| {
            let (output, status) = run_command(&st.sess, &command)?;
            if status != 0 {
                return Err(Error::network(format!(
                    "remote command exited with status {}",
                    status
                )));
            }
            Ok(output)
        })
        .await
    }

    async fn search_names(&self, root: &str, pattern: &str) -> Result<Vec<String>> {
        let root = root.to_string();
        let pattern = pattern.to_string();
        self.with_session(move |st| {
            let mut matches = Vec::new();
            let mut pending = vec![root.clone()];
            while let Some(dir) = pending.pop() {
                let listing = st
                    .sftp
                    .readdir(Path::new(&dir))
                    .map_err(|e| Error::network(format!("listing '{}' failed: {}", dir, e)))?;
                for (path, stat) in listing {
                    let full = path.to_string_lossy().into_owned();
                    if remote_file_name(&full).contains(&pattern) {
                        matches.push(full.clone());
                    }
                    if stat.is_dir() {
                        pending.push(full);
                    }
                }
            }
            Ok(matches)
        })
        .await
    }

    async fn search_contents(&self, root: &str, needle: &str) -> Result<Vec<String>> {
        let command = format!(
            "grep -rl --binary-files=without-match -e {} -- {}",
            shell_quote(needle),
            shell_quote(root)
        );
        self.with_session(move |st| {
            let (output, status) = run_command(&st.sess, &command)?;
            match status {
                // grep exits 1 when nothing matched
                0 | 1 => Ok(output.lines().map(str::to_string).collect()),
                other => Err(Error::network(format!(
                    "remote search exited with status {}",
                    other
                ))),
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use remora_config::{AuthMethod, SiteConfig};
    use remora_types::ErrorKind;
    use tempfile::TempDir;

    fn client() -> SftpClient {
        let dir = TempDir::new().unwrap();
        let config = SiteConfig {
            host: "sftp.invalid".to_string(),
            username: "nobody".to_string(),
            auth: AuthMethod::Password {
                password: "nope".to_string(),
            },
            ..SiteConfig::default()
        };
        SftpClient::new(config, Arc::new(MetadataStore::new(dir.path())))
    }

    #[test]
    fn test_supports_full_capability_surface() {
        let client = client();
        assert!(client.supports(Capability::Permissions));
        assert!(client.supports(Capability::RemoteExec));
        assert!(client.supports(Capability::NameSearch));
        assert!(client.supports(Capability::ContentSearch));
        assert_eq!(client.protocol(), Protocol::Sftp);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_operations_require_a_connection() {
        let client = client();
        assert!(!client.is_connected().await);

        let err = client.stat("/srv").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connect);
    }

    #[test]
    fn test_shell_quote_escapes_single_quotes() {
        assert_eq!(shell_quote("abc"), "'abc'");
        assert_eq!(shell_quote("a'b"), "'a'\\''b'");
    }

    #[test]
    fn test_entry_from_stat_second_granularity() {
        let stat = FileStat {
            size: Some(42),
            uid: None,
            gid: None,
            perm: Some(0o100644),
            atime: None,
            mtime: Some(1_700_000_000),
        };
        let entry = entry_from_stat("/srv/www/index.html", &stat);
        assert_eq!(entry.name, "index.html");
        assert_eq!(entry.size, Some(42));
        assert_eq!(entry.modified_ms, 1_700_000_000_000);
        assert!(!entry.is_dir);
    }
}
