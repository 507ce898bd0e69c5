//! Protocol-abstracted transfer clients for remora
//!
//! This crate provides a uniform transfer capability over one physical
//! connection, for either of two wire protocols, hiding protocol differences
//! behind explicit capability probes rather than silent behavioral
//! divergence:
//!
//! - **SFTP** ([`SftpClient`]): full capability surface over an SSH session
//! - **FTP** ([`FtpClient`]): core transfer contract; optional capabilities
//!   report a definitive "unsupported" error instead of approximating
//! - **In-memory** ([`MemoryClient`]): backend for tests, with per-path
//!   failure injection
//!
//! One client owns one live session. All operations against a client are
//! issued sequentially; reconnection is only attempted on explicit caller
//! request and concurrent requests collapse into a single attempt.
//!
//! # Examples
//!
//! ```rust,no_run
//! use remora_client::{SftpClient, TransferClient};
//! use remora_config::ConfigLoader;
//! use remora_meta::MetadataStore;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let site = ConfigLoader::load_default()?;
//! let store = Arc::new(MetadataStore::new(".remora/meta"));
//! let client = SftpClient::new(site, store);
//! client.connect().await?;
//! for entry in client.list_dir("/srv/www").await {
//!     println!("{}", entry.path);
//! }
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod ftp;
pub mod memory;
pub mod sftp;
pub mod util;

pub use client::{Capability, TransferClient};
pub use ftp::FtpClient;
pub use memory::MemoryClient;
pub use sftp::SftpClient;
