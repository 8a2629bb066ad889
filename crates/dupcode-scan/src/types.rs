//! Core types shared by the detector components

use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use uuid::Uuid;

use crate::error::ScanError;

/// Field value whose uniqueness is being verified
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Key(String);

impl Key {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Identifier of a work unit, usually the file path
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitId(String);

impl UnitId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UnitId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Where a key was first inserted into the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyOrigin {
    pub unit: UnitId,
    /// 1-based position of the record within its unit, headers included
    pub ordinal: u64,
}

impl fmt::Display for KeyOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} record {}", self.unit, self.ordinal)
    }
}

/// A key collision observed by a worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateEvent {
    pub key: Key,
    pub unit: UnitId,
    pub ordinal: u64,
    pub first_seen: KeyOrigin,
}

impl fmt::Display for DuplicateEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Duplicate key '{}' in {} record {} (first seen in {})",
            self.key, self.unit, self.ordinal, self.first_seen
        )
    }
}

/// Terminal status of a single worker
#[derive(Debug)]
pub enum WorkerStatus {
    Clean,
    DuplicateFound(DuplicateEvent),
    Failed(ScanError),
    /// Stopped by the coordinator; not an error
    Cancelled,
}

impl WorkerStatus {
    pub fn state(&self) -> UnitState {
        match self {
            WorkerStatus::Clean => UnitState::Clean,
            WorkerStatus::DuplicateFound(_) => UnitState::DuplicateFound,
            WorkerStatus::Failed(_) => UnitState::Failed,
            WorkerStatus::Cancelled => UnitState::Cancelled,
        }
    }
}

/// What a worker hands back to the coordinator when it terminates
#[derive(Debug)]
pub struct WorkerReport {
    pub unit: UnitId,
    pub status: WorkerStatus,
    pub records_read: u64,
    pub keys_inserted: u64,
}

impl WorkerReport {
    pub(crate) fn new(unit: UnitId, status: WorkerStatus) -> Self {
        Self {
            unit,
            status,
            records_read: 0,
            keys_inserted: 0,
        }
    }
}

/// Payload-free view of [`WorkerStatus`] used in run summaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitState {
    Clean,
    DuplicateFound,
    Failed,
    Cancelled,
}

impl UnitState {
    pub fn as_str(&self) -> &str {
        match self {
            UnitState::Clean => "clean",
            UnitState::DuplicateFound => "duplicate_found",
            UnitState::Failed => "failed",
            UnitState::Cancelled => "cancelled",
        }
    }
}

/// Per-unit line of a [`RunReport`]
#[derive(Debug, Clone, Serialize)]
pub struct UnitSummary {
    pub unit: UnitId,
    pub state: UnitState,
    pub records_read: u64,
    pub keys_inserted: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Final classification of a detection pass
#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunOutcome {
    Clean,
    DuplicateFound(DuplicateEvent),
    Failed {
        unit: UnitId,
        #[serde(serialize_with = "serialize_display")]
        cause: ScanError,
    },
}

impl RunOutcome {
    pub fn is_clean(&self) -> bool {
        matches!(self, RunOutcome::Clean)
    }

    pub fn duplicate(&self) -> Option<&DuplicateEvent> {
        match self {
            RunOutcome::DuplicateFound(event) => Some(event),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RunOutcome::Clean => "clean",
            RunOutcome::DuplicateFound(_) => "duplicate_found",
            RunOutcome::Failed { .. } => "failed",
        }
    }
}

/// Everything the coordinator learned during one run
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub outcome: RunOutcome,
    /// Units in worker termination order
    pub units: Vec<UnitSummary>,
    /// Every collision reported, first one first
    pub duplicates: Vec<DuplicateEvent>,
    pub distinct_keys: usize,
    pub elapsed_ms: u64,
}

fn serialize_display<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
where
    T: fmt::Display,
    S: Serializer,
{
    serializer.collect_str(value)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_event_display() {
        let event = DuplicateEvent {
            key: Key::from("200"),
            unit: UnitId::from("b.csv"),
            ordinal: 2,
            first_seen: KeyOrigin {
                unit: UnitId::from("a.csv"),
                ordinal: 3,
            },
        };

        assert_eq!(
            event.to_string(),
            "Duplicate key '200' in b.csv record 2 (first seen in a.csv record 3)"
        );
    }

    #[test]
    fn test_outcome_serializes_with_kind_tag() {
        let outcome = RunOutcome::Failed {
            unit: UnitId::from("missing.csv"),
            cause: ScanError::WorkerPanicked {
                unit: UnitId::from("missing.csv"),
            },
        };

        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["kind"], "failed");
        assert_eq!(json["unit"], "missing.csv");
        assert_eq!(json["cause"], "worker for missing.csv panicked");
        assert_eq!(serde_json::to_value(RunOutcome::Clean).unwrap()["kind"], "clean");
    }
}
