//! Launches one worker per work unit and hands back their reports

use futures::FutureExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::error::ScanError;
use crate::record::KeyExtractor;
use crate::registry::KeyRegistry;
use crate::source::WorkUnit;
use crate::types::{UnitId, WorkerReport, WorkerStatus};
use crate::worker::Worker;

pub struct Dispatcher {
    registry: Arc<KeyRegistry>,
    extractor: Arc<dyn KeyExtractor>,
    cancel: CancellationToken,
    limiter: Option<Arc<Semaphore>>,
}

impl Dispatcher {
    /// `max_workers` bounds how many workers scan at once; `None` runs all of them
    pub fn new(
        registry: Arc<KeyRegistry>,
        extractor: Arc<dyn KeyExtractor>,
        cancel: CancellationToken,
        max_workers: Option<usize>,
    ) -> Self {
        Self {
            registry,
            extractor,
            cancel,
            limiter: max_workers.map(|limit| Arc::new(Semaphore::new(limit.max(1)))),
        }
    }

    /// Spawn a worker task for every unit
    pub fn dispatch<I>(&self, units: I) -> Dispatched
    where
        I: IntoIterator<Item = Box<dyn WorkUnit>>,
    {
        let mut dispatched = Dispatched {
            tasks: JoinSet::new(),
            pending: HashMap::new(),
            pending_count: 0,
        };

        for unit in units {
            let id = unit.id().clone();
            let worker = Worker::new(
                unit,
                self.registry.clone(),
                self.extractor.clone(),
                self.cancel.clone(),
            );
            let limiter = self.limiter.clone();
            let cancel = self.cancel.clone();
            let task_id = id.clone();

            dispatched.tasks.spawn(async move {
                let _permit = match limiter {
                    Some(limiter) => tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            return WorkerReport::new(task_id, WorkerStatus::Cancelled);
                        },
                        permit = limiter.acquire_owned() => permit.ok(),
                    },
                    None => None,
                };

                match AssertUnwindSafe(worker.run()).catch_unwind().await {
                    Ok(report) => report,
                    Err(_) => {
                        error!(unit = %task_id, "Worker panicked");
                        let unit = task_id.clone();
                        WorkerReport::new(task_id, WorkerStatus::Failed(ScanError::WorkerPanicked { unit }))
                    },
                }
            });

            debug!(unit = %id, "Worker dispatched");
            *dispatched.pending.entry(id).or_insert(0) += 1;
            dispatched.pending_count += 1;
        }

        dispatched
    }
}

/// Handle on every launched worker
///
/// Reports come back in termination order. Workers aborted after the drain
/// grace period are reported as cancelled once every live task has finished.
pub struct Dispatched {
    tasks: JoinSet<WorkerReport>,
    pending: HashMap<UnitId, usize>,
    pending_count: usize,
}

impl Dispatched {
    /// Workers that have not yet produced a report
    pub fn remaining(&self) -> usize {
        self.pending_count
    }

    pub fn is_empty(&self) -> bool {
        self.pending_count == 0
    }

    /// Abort every worker still running; each will be reported as cancelled
    pub fn abort_all(&mut self) {
        self.tasks.abort_all();
    }

    /// Next terminal report, or `None` once every worker is accounted for
    pub async fn next(&mut self) -> Option<WorkerReport> {
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(report) => {
                    self.settle(&report.unit);
                    return Some(report);
                },
                // Aborted; accounted for below once the set is empty.
                Err(err) if err.is_cancelled() => continue,
                Err(err) => error!(error = %err, "Worker task failed to join"),
            }
        }

        let unit = self.pending.keys().next().cloned()?;
        self.settle(&unit);
        Some(WorkerReport::new(unit, WorkerStatus::Cancelled))
    }

    fn settle(&mut self, unit: &UnitId) {
        if let Some(count) = self.pending.get_mut(unit) {
            *count -= 1;
            if *count == 0 {
                self.pending.remove(unit);
            }
            self.pending_count -= 1;
        }
    }
}
