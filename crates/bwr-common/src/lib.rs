//! BWR Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, utilities, and error handling for the BWR workspace.
//!
//! # Overview
//!
//! - **Error Handling**: [`BwrError`] and the [`Result`] alias used by the format crates
//! - **Logging**: `tracing` subscriber setup driven by environment variables
//! - **Checksums**: MD5/SHA-256 file verification, NCBI `.md5` sidecars
//! - **Types**: strand and checksum algorithm enums shared by parsers and fetchers
//!
//! # Example
//!
//! ```no_run
//! use bwr_common::checksum::compute_file_checksum;
//! use bwr_common::types::ChecksumAlgorithm;
//!
//! fn main() -> bwr_common::Result<()> {
//!     let digest = compute_file_checksum("nt.00.tar.gz", ChecksumAlgorithm::Md5)?;
//!     println!("{digest}");
//!     Ok(())
//! }
//! ```

pub mod checksum;
pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{BwrError, Result};
pub use types::{ChecksumAlgorithm, Strand};
