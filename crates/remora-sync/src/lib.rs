//! Bidirectional synchronization engine for remora
//!
//! This crate reconciles a local root and a remote root through a
//! [`remora_client::TransferClient`], with:
//!
//! - **Push pass**: every local file re-rooted and uploaded unconditionally
//! - **Pull pass**: worklist traversal of the remote tree, downloading only
//!   files that are absent locally or differ beyond the mtime tolerance
//! - **Deletion reconciliation**: per-side pruning of paths absent on the
//!   peer, with optional backup of locally pruned files
//! - **Partial-failure isolation**: one file's failure never aborts the pass
//! - **Conflict arbitration**: the single-file upload path classifies
//!   conflicts against the metadata store instead of overwriting blindly
//!
//! # Examples
//!
//! ```rust,no_run
//! use remora_client::MemoryClient;
//! use remora_meta::MetadataStore;
//! use remora_sync::{SyncEngine, SyncRequest};
//! use remora_types::SyncDirection;
//! use std::sync::Arc;
//!
//! # async fn example() {
//! let store = Arc::new(MetadataStore::new(".remora/meta"));
//! let client = Arc::new(MemoryClient::new(Arc::clone(&store)));
//! let engine = SyncEngine::new(client, store);
//! let request = SyncRequest::new("site", "/srv/www")
//!     .with_direction(SyncDirection::LocalToRemote);
//! let outcome = engine.sync(&request).await;
//! println!("uploaded {} files", outcome.uploaded);
//! # }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod arbiter;
pub mod engine;
pub mod ignore;

pub use arbiter::{classify, UploadDecision};
pub use engine::{PutOutcome, SyncEngine, SyncRequest, MTIME_TOLERANCE_MS};
pub use ignore::IgnoreRules;
