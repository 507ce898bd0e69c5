//! Core type system and error handling for remora
//!
//! This crate provides the foundational types shared by the remora crates:
//!
//! - **Error handling**: the [`Error`] taxonomy with fatal/transient
//!   classification and the shared [`Result`] alias
//! - **Core types**: remote directory entries, sync directions and deletion
//!   policies, and the [`SyncOutcome`] aggregate returned by every pass
//!
//! # Examples
//!
//! ```rust
//! use remora_types::{SyncOutcome, TransferOp};
//!
//! let mut outcome = SyncOutcome::new();
//! outcome.uploaded += 1;
//! outcome.record_failure("docs/readme.md", TransferOp::Upload);
//! assert!(!outcome.is_clean());
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod result;
pub mod types;

pub use error::{Error, ErrorKind};
pub use result::Result;
pub use types::*;
