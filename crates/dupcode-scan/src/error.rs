//! Error types for the duplicate detector
//!
//! Duplicate keys are not errors: they surface as
//! [`RunOutcome::DuplicateFound`](crate::RunOutcome::DuplicateFound). Everything
//! here is local to one work unit except `InvalidRoot` and `Config`, which are
//! raised before any worker starts.

use std::path::PathBuf;
use thiserror::Error;

use crate::types::UnitId;

pub type Result<T> = std::result::Result<T, ScanError>;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("cannot list work units under '{}': {source}", path.display())]
    InvalidRoot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to open {unit}: {source}")]
    Open {
        unit: UnitId,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read {unit} at record {ordinal}: {source}")]
    Read {
        unit: UnitId,
        ordinal: u64,
        #[source]
        source: std::io::Error,
    },

    #[error("{unit} record {ordinal} has {fields} field(s) and no key")]
    MalformedRecord {
        unit: UnitId,
        ordinal: u64,
        fields: usize,
    },

    #[error("worker for {unit} panicked")]
    WorkerPanicked { unit: UnitId },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ScanError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
