//! Per-unit worker
//!
//! A worker drains one work unit, checking every key against the shared
//! registry. It stops at its first collision, at a read failure, or when the
//! coordinator cancels the run. Cancellation is only observed between records,
//! never inside a registry check.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace, warn};

use crate::error::ScanError;
use crate::record::KeyExtractor;
use crate::registry::{Insertion, KeyRegistry};
use crate::source::WorkUnit;
use crate::types::{DuplicateEvent, KeyOrigin, WorkerReport, WorkerStatus};

/// Records between cooperative yields for streams that never suspend
const YIELD_EVERY: u64 = 1024;

pub struct Worker {
    unit: Box<dyn WorkUnit>,
    registry: Arc<KeyRegistry>,
    extractor: Arc<dyn KeyExtractor>,
    cancel: CancellationToken,
}

impl Worker {
    pub fn new(
        unit: Box<dyn WorkUnit>,
        registry: Arc<KeyRegistry>,
        extractor: Arc<dyn KeyExtractor>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            unit,
            registry,
            extractor,
            cancel,
        }
    }

    /// Scan the unit to a terminal status
    #[instrument(name = "worker", skip_all, fields(unit = %self.unit.id()))]
    pub async fn run(self) -> WorkerReport {
        let mut report = WorkerReport::new(self.unit.id().clone(), WorkerStatus::Clean);
        let status = self.scan(&mut report).await;
        report.status = status;

        match &report.status {
            WorkerStatus::Clean => debug!(
                records = report.records_read,
                keys = report.keys_inserted,
                "Unit scanned clean"
            ),
            WorkerStatus::DuplicateFound(event) => debug!(
                key = %event.key,
                ordinal = event.ordinal,
                first_seen = %event.first_seen,
                "Duplicate key detected"
            ),
            WorkerStatus::Failed(err) => warn!(error = %err, "Unit failed"),
            WorkerStatus::Cancelled => debug!(records = report.records_read, "Worker cancelled"),
        }

        report
    }

    async fn scan(&self, report: &mut WorkerReport) -> WorkerStatus {
        if self.cancel.is_cancelled() {
            return WorkerStatus::Cancelled;
        }

        let mut stream = match self.unit.open().await {
            Ok(stream) => stream,
            Err(err) => return WorkerStatus::Failed(err),
        };

        loop {
            if self.cancel.is_cancelled() {
                return WorkerStatus::Cancelled;
            }

            let fields = match stream.next_record().await {
                Ok(Some(fields)) => fields,
                Ok(None) => return WorkerStatus::Clean,
                Err(err) => return WorkerStatus::Failed(err),
            };
            report.records_read += 1;
            let ordinal = report.records_read;

            if self.extractor.is_header(&fields) {
                trace!(ordinal, "Skipping header row");
                continue;
            }

            let Some(key) = self.extractor.extract_key(&fields) else {
                return WorkerStatus::Failed(ScanError::MalformedRecord {
                    unit: report.unit.clone(),
                    ordinal,
                    fields: fields.len(),
                });
            };

            let origin = KeyOrigin {
                unit: report.unit.clone(),
                ordinal,
            };
            match self.registry.check_and_insert(key.clone(), origin) {
                Insertion::Inserted => report.keys_inserted += 1,
                Insertion::AlreadyPresent(first_seen) => {
                    return WorkerStatus::DuplicateFound(DuplicateEvent {
                        key,
                        unit: report.unit.clone(),
                        ordinal,
                        first_seen,
                    });
                },
            }

            if ordinal % YIELD_EVERY == 0 {
                tokio::task::yield_now().await;
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::record::RecordLayout;
    use crate::source::InMemoryUnit;
    use crate::types::{Key, UnitId};

    fn worker(unit: InMemoryUnit, registry: &Arc<KeyRegistry>, cancel: &CancellationToken) -> Worker {
        Worker::new(
            unit.boxed(),
            registry.clone(),
            Arc::new(RecordLayout::default()),
            cancel.clone(),
        )
    }

    #[tokio::test]
    async fn test_clean_unit_inserts_every_key() {
        let registry = Arc::new(KeyRegistry::new());
        let cancel = CancellationToken::new();
        let unit = InMemoryUnit::parse("a", "barcode,1\nx,100\ny,200", ',');

        let report = worker(unit, &registry, &cancel).run().await;

        assert!(matches!(report.status, WorkerStatus::Clean));
        assert_eq!(report.records_read, 3);
        assert_eq!(report.keys_inserted, 2);
        assert_eq!(registry.keys(), vec![Key::from("100"), Key::from("200")]);
    }

    #[tokio::test]
    async fn test_duplicate_within_unit_stops_scanning() {
        let registry = Arc::new(KeyRegistry::new());
        let cancel = CancellationToken::new();
        let unit = InMemoryUnit::parse("a", "x,100\ny,100\nz,300", ',');

        let report = worker(unit, &registry, &cancel).run().await;

        match report.status {
            WorkerStatus::DuplicateFound(event) => {
                assert_eq!(event.key, Key::from("100"));
                assert_eq!(event.ordinal, 2);
                assert_eq!(event.first_seen.unit, UnitId::from("a"));
                assert_eq!(event.first_seen.ordinal, 1);
            },
            other => panic!("expected duplicate, got {other:?}"),
        }
        assert_eq!(report.records_read, 2);
        assert!(!registry.contains(&Key::from("300")));
    }

    #[tokio::test]
    async fn test_record_without_key_fails_unit() {
        let registry = Arc::new(KeyRegistry::new());
        let cancel = CancellationToken::new();
        let unit = InMemoryUnit::parse("a", "x,100\nlonely", ',');

        let report = worker(unit, &registry, &cancel).run().await;

        assert!(matches!(
            report.status,
            WorkerStatus::Failed(ScanError::MalformedRecord { ordinal: 2, fields: 1, .. })
        ));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let registry = Arc::new(KeyRegistry::new());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let unit = InMemoryUnit::parse("a", "x,100", ',');

        let report = worker(unit, &registry, &cancel).run().await;

        assert!(matches!(report.status, WorkerStatus::Cancelled));
        assert_eq!(report.records_read, 0);
        assert!(registry.is_empty());
    }
}
