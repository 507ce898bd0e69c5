//! Conflict arbitration for the single-file upload path
//!
//! Used when one file is uploaded opportunistically (e.g. on a save trigger)
//! rather than via a bulk pass. The arbiter never resolves a conflict
//! itself: it signals the caller, which must obtain an explicit policy
//! choice before retrying with the forced flag.

use remora_meta::TransferRecord;
use remora_types::RemoteEntry;

/// Ternary decision for a single-file upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadDecision {
    /// Safe to upload: the remote is unchanged since the last sync, or the
    /// file was never transferred
    Proceed,
    /// The caller explicitly requested an overwrite
    ForceProceed,
    /// The remote changed since this client last touched it; block and
    /// report instead of overwriting
    Conflict,
}

/// Classify a single-file upload against the stored record and the freshly
/// fetched remote attributes
///
/// No stored record means first-ever transfer: local edits are always safe
/// to push. A stored record whose modify time and size exactly equal the
/// fresh attributes means the remote is unchanged. A remote file that no
/// longer exists overwrites nothing, so it also classifies as safe.
pub fn classify(
    stored: Option<&TransferRecord>,
    fresh: Option<&RemoteEntry>,
    force: bool,
) -> UploadDecision {
    if force {
        return UploadDecision::ForceProceed;
    }
    let (Some(stored), Some(fresh)) = (stored, fresh) else {
        return UploadDecision::Proceed;
    };
    if stored.matches(fresh.modified_ms, fresh.size.unwrap_or(0)) {
        UploadDecision::Proceed
    } else {
        UploadDecision::Conflict
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(mtime: i64, size: u64) -> TransferRecord {
        TransferRecord {
            remote_path: "/srv/a.txt".to_string(),
            remote_modify_time: mtime,
            remote_file_size: size,
            local_path: "a.txt".to_string(),
            download_time: 0,
            config_name: None,
        }
    }

    fn entry(mtime: i64, size: u64) -> RemoteEntry {
        RemoteEntry {
            name: "a.txt".to_string(),
            path: "/srv/a.txt".to_string(),
            is_dir: false,
            size: Some(size),
            modified_ms: mtime,
        }
    }

    #[test]
    fn test_matching_attributes_proceed() {
        let stored = record(100, 50);
        let fresh = entry(100, 50);
        assert_eq!(
            classify(Some(&stored), Some(&fresh), false),
            UploadDecision::Proceed
        );
    }

    #[test]
    fn test_changed_mtime_conflicts() {
        let stored = record(100, 50);
        let fresh = entry(200, 50);
        assert_eq!(
            classify(Some(&stored), Some(&fresh), false),
            UploadDecision::Conflict
        );
    }

    #[test]
    fn test_changed_size_conflicts() {
        let stored = record(100, 50);
        let fresh = entry(100, 51);
        assert_eq!(
            classify(Some(&stored), Some(&fresh), false),
            UploadDecision::Conflict
        );
    }

    #[test]
    fn test_untracked_file_proceeds() {
        let fresh = entry(200, 50);
        assert_eq!(classify(None, Some(&fresh), false), UploadDecision::Proceed);
    }

    #[test]
    fn test_vanished_remote_proceeds() {
        let stored = record(100, 50);
        assert_eq!(classify(Some(&stored), None, false), UploadDecision::Proceed);
    }

    #[test]
    fn test_force_overrides_conflict() {
        let stored = record(100, 50);
        let fresh = entry(200, 99);
        assert_eq!(
            classify(Some(&stored), Some(&fresh), true),
            UploadDecision::ForceProceed
        );
    }
}
