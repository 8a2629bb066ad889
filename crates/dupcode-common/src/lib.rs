//! dupcode Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Pieces shared by the dupcode workspace members:
//!
//! - **Error Handling**: [`CommonError`] and the [`Result`] alias
//! - **Logging**: tracing subscriber setup driven by [`logging::LogConfig`]
//! - **Compression**: gzip helpers for archiving scanned record files
//!
//! # Example
//!
//! ```no_run
//! use dupcode_common::compress::{compress, derive_output_name};
//!
//! fn archive(name: &str, data: &[u8]) -> dupcode_common::Result<(String, Vec<u8>)> {
//!     Ok((derive_output_name(name, "gz")?, compress(data)?))
//! }
//! ```

pub mod compress;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{CommonError, Result};
