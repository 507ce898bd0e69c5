//! Core data types shared across the remora crates

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Wire protocol used to reach a remote tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// SFTP over an SSH session
    Sftp,
    /// Plain FTP
    Ftp,
}

impl Protocol {
    /// Default server port for this protocol
    pub fn default_port(self) -> u16 {
        match self {
            Self::Sftp => 22,
            Self::Ftp => 21,
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sftp => write!(f, "sftp"),
            Self::Ftp => write!(f, "ftp"),
        }
    }
}

/// One entry from a remote directory listing
///
/// Ephemeral: produced by every listing call and never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteEntry {
    /// Entry name without any path component
    pub name: String,
    /// Full remote path of the entry
    pub path: String,
    /// Whether the entry is a directory
    pub is_dir: bool,
    /// File size in bytes, `None` for directories
    pub size: Option<u64>,
    /// Modify time in milliseconds since the epoch, as reported by the server
    pub modified_ms: i64,
}

impl RemoteEntry {
    /// Modify time as a UTC datetime, for display
    pub fn modified_utc(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.modified_ms)
            .single()
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }
}

/// Convert a [`SystemTime`] to milliseconds since the epoch
///
/// Times before the epoch clamp to zero; remote servers report second
/// granularity at best, so sub-epoch precision is not worth carrying.
pub fn system_time_ms(time: SystemTime) -> i64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

/// Direction of a synchronization pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncDirection {
    /// Push: mirror local files onto the remote tree
    LocalToRemote,
    /// Pull: mirror remote files into the local tree
    RemoteToLocal,
    /// Both passes, push first
    Bidirectional,
}

impl SyncDirection {
    /// Whether this direction includes the local-to-remote pass
    pub fn includes_push(self) -> bool {
        matches!(self, Self::LocalToRemote | Self::Bidirectional)
    }

    /// Whether this direction includes the remote-to-local pass
    pub fn includes_pull(self) -> bool {
        matches!(self, Self::RemoteToLocal | Self::Bidirectional)
    }
}

/// Deletion reconciliation policy for a synchronization pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeletePolicy {
    /// No deletion reconciliation
    Off,
    /// Remote paths absent locally are deleted
    PruneRemote,
    /// Local files absent remotely are deleted
    PruneLocal,
    /// Both prune passes
    PruneBoth,
}

impl DeletePolicy {
    /// Whether remote-side pruning is enabled
    pub fn prunes_remote(self) -> bool {
        matches!(self, Self::PruneRemote | Self::PruneBoth)
    }

    /// Whether local-side pruning is enabled
    pub fn prunes_local(self) -> bool {
        matches!(self, Self::PruneLocal | Self::PruneBoth)
    }
}

/// The operation that was attempted on a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransferOp {
    /// Upload to the remote tree
    Upload,
    /// Download into the local tree
    Download,
    /// Delete on the remote side
    DeleteRemote,
    /// Delete on the local side
    DeleteLocal,
}

impl std::fmt::Display for TransferOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Upload => write!(f, "upload"),
            Self::Download => write!(f, "download"),
            Self::DeleteRemote => write!(f, "delete-remote"),
            Self::DeleteLocal => write!(f, "delete-local"),
        }
    }
}

/// One failed item from a synchronization pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedTransfer {
    /// Local or remote path identifier of the failed item
    pub path: String,
    /// The operation that failed
    pub op: TransferOp,
}

/// Aggregate result of one synchronization pass
///
/// Mutated incrementally while the pass runs, returned once at the end.
/// Failures are recorded in encounter order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncOutcome {
    /// Number of files uploaded
    pub uploaded: u64,
    /// Number of files downloaded
    pub downloaded: u64,
    /// Number of files and directories deleted
    pub deleted: u64,
    /// Items that failed, with the operation that failed
    pub failed: Vec<FailedTransfer>,
}

impl SyncOutcome {
    /// Create an empty outcome
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a per-item failure
    pub fn record_failure<S: Into<String>>(&mut self, path: S, op: TransferOp) {
        self.failed.push(FailedTransfer {
            path: path.into(),
            op,
        });
    }

    /// Whether the pass completed without any per-item failure
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Progress callback invoked per transferred file
///
/// Arguments are `(current, total, file_name)`. `total` is zero when the
/// true count is not yet known (remote-to-local pass).
pub type ProgressFn = Arc<dyn Fn(u64, u64, &str) + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_default_ports() {
        assert_eq!(Protocol::Sftp.default_port(), 22);
        assert_eq!(Protocol::Ftp.default_port(), 21);
    }

    #[test]
    fn test_direction_pass_selection() {
        assert!(SyncDirection::LocalToRemote.includes_push());
        assert!(!SyncDirection::LocalToRemote.includes_pull());
        assert!(SyncDirection::RemoteToLocal.includes_pull());
        assert!(!SyncDirection::RemoteToLocal.includes_push());
        assert!(SyncDirection::Bidirectional.includes_push());
        assert!(SyncDirection::Bidirectional.includes_pull());
    }

    #[test]
    fn test_delete_policy_sides() {
        assert!(!DeletePolicy::Off.prunes_remote());
        assert!(!DeletePolicy::Off.prunes_local());
        assert!(DeletePolicy::PruneRemote.prunes_remote());
        assert!(!DeletePolicy::PruneRemote.prunes_local());
        assert!(DeletePolicy::PruneBoth.prunes_remote());
        assert!(DeletePolicy::PruneBoth.prunes_local());
    }

    #[test]
    fn test_system_time_ms_round_trip() {
        let now = SystemTime::now();
        let ms = system_time_ms(now);
        assert!(ms > 0);

        let back = UNIX_EPOCH + std::time::Duration::from_millis(ms as u64);
        let diff = now
            .duration_since(back)
            .unwrap_or_default()
            .as_millis();
        assert!(diff < 1);
    }

    #[test]
    fn test_system_time_before_epoch_clamps() {
        let before = UNIX_EPOCH - std::time::Duration::from_secs(10);
        assert_eq!(system_time_ms(before), 0);
    }

    #[test]
    fn test_outcome_failure_order_is_preserved() {
        let mut outcome = SyncOutcome::new();
        outcome.record_failure("b.txt", TransferOp::Upload);
        outcome.record_failure("a.txt", TransferOp::Download);

        assert!(!outcome.is_clean());
        assert_eq!(outcome.failed[0].path, "b.txt");
        assert_eq!(outcome.failed[1].path, "a.txt");
    }
}
