//! The persisted sidecar record

use serde::{Deserialize, Serialize};

/// Last-known-synced remote attributes for one local file
///
/// Serialized as one JSON object per tracked file. The camelCase field names
/// are read by external status/decoration tooling and are preserved exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRecord {
    /// Remote path the file was last transferred against
    pub remote_path: String,
    /// Remote modify time at last sync, milliseconds since the epoch
    pub remote_modify_time: i64,
    /// Remote file size at last sync, bytes
    pub remote_file_size: u64,
    /// Local path of the tracked file
    pub local_path: String,
    /// Time of the last sync action, milliseconds since the epoch
    pub download_time: i64,
    /// Owning profile name, when configured
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_name: Option<String>,
}

impl TransferRecord {
    /// Whether the freshly fetched remote attributes match this record
    ///
    /// An exact match on both modify time and size means the remote file has
    /// not changed since this client last touched it.
    pub fn matches(&self, remote_modify_time: i64, remote_file_size: u64) -> bool {
        self.remote_modify_time == remote_modify_time && self.remote_file_size == remote_file_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_field_names_are_stable() {
        let record = TransferRecord {
            remote_path: "/srv/www/index.html".to_string(),
            remote_modify_time: 1_700_000_000_000,
            remote_file_size: 512,
            local_path: "site/index.html".to_string(),
            download_time: 1_700_000_100_000,
            config_name: Some("staging".to_string()),
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["remotePath"], "/srv/www/index.html");
        assert_eq!(json["remoteModifyTime"], 1_700_000_000_000_i64);
        assert_eq!(json["remoteFileSize"], 512);
        assert_eq!(json["localPath"], "site/index.html");
        assert_eq!(json["downloadTime"], 1_700_000_100_000_i64);
        assert_eq!(json["configName"], "staging");
    }

    #[test]
    fn test_config_name_omitted_when_absent() {
        let record = TransferRecord {
            remote_path: "/f".to_string(),
            remote_modify_time: 0,
            remote_file_size: 0,
            local_path: "f".to_string(),
            download_time: 0,
            config_name: None,
        };

        let json = serde_json::to_string(&record).unwrap();
        assert!(!json.contains("configName"));
    }

    #[test]
    fn test_matches_requires_both_fields() {
        let record = TransferRecord {
            remote_path: "/f".to_string(),
            remote_modify_time: 100,
            remote_file_size: 50,
            local_path: "f".to_string(),
            download_time: 0,
            config_name: None,
        };

        assert!(record.matches(100, 50));
        assert!(!record.matches(101, 50));
        assert!(!record.matches(100, 51));
    }
}
