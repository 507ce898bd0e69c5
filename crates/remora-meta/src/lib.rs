//! Per-file transfer metadata store for remora
//!
//! This crate persists the last-known-synced remote attributes for each
//! local file that has ever been transferred. A record exists for a local
//! path iff that file has been uploaded or downloaded at least once —
//! absence means "untracked", not "unchanged".
//!
//! Records are stored as flat sibling JSON files under one metadata
//! directory per workspace root. The JSON field names are an external
//! contract read by other tooling and must not change.
//!
//! # Examples
//!
//! ```rust,no_run
//! use remora_meta::MetadataStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = MetadataStore::new(".remora/meta");
//! if let Some(record) = store.read_transfer("src/main.rs").await {
//!     println!("last synced against {}", record.remote_path);
//! }
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod record;
pub mod store;

pub use record::TransferRecord;
pub use store::{storage_key, MetadataStore};
