//! Run coordinator
//!
//! Owns the registry for the duration of a run, dispatches the workers, and
//! folds their reports into a single [`RunOutcome`].
//!
//! State machine:
//!
//! ```text
//! Idle -> Dispatching -> Running -> Terminated
//!                           |            ^
//!                           v            |
//!                        Draining -------+
//! ```
//!
//! The first worker to report a duplicate moves the run to `Draining`: the
//! cancellation token is fired and the remaining workers get `drain_grace` to
//! stop on their own before they are aborted.

use serde::Serialize;
use std::sync::Arc;
use tokio::time::{timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::ScanConfig;
use crate::dispatcher::Dispatcher;
use crate::error::ScanError;
use crate::record::{KeyExtractor, RecordLayout};
use crate::registry::KeyRegistry;
use crate::source::WorkUnit;
use crate::types::{
    DuplicateEvent, RunOutcome, RunReport, UnitId, UnitSummary, WorkerReport, WorkerStatus,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinatorState {
    Idle,
    Dispatching,
    Running,
    Draining,
    Terminated,
}

impl CoordinatorState {
    pub fn as_str(&self) -> &str {
        match self {
            CoordinatorState::Idle => "idle",
            CoordinatorState::Dispatching => "dispatching",
            CoordinatorState::Running => "running",
            CoordinatorState::Draining => "draining",
            CoordinatorState::Terminated => "terminated",
        }
    }
}

pub struct Coordinator {
    config: ScanConfig,
    extractor: Arc<dyn KeyExtractor>,
    registry: Arc<KeyRegistry>,
    state: CoordinatorState,
}

impl Coordinator {
    /// Coordinator using the fixed-column [`RecordLayout`] from `config`
    pub fn new(config: ScanConfig) -> Self {
        let extractor = Arc::new(RecordLayout::from_config(&config));
        Self::with_extractor(config, extractor)
    }

    pub fn with_extractor(config: ScanConfig, extractor: Arc<dyn KeyExtractor>) -> Self {
        let registry = Arc::new(KeyRegistry::with_shards(config.registry_shards));
        Self {
            config,
            extractor,
            registry,
            state: CoordinatorState::Idle,
        }
    }

    pub fn state(&self) -> CoordinatorState {
        self.state
    }

    /// Registry of the most recent run
    pub fn registry(&self) -> &KeyRegistry {
        &self.registry
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Run the detector over `units` and classify the result
    pub async fn run<I>(&mut self, units: I) -> RunOutcome
    where
        I: IntoIterator<Item = Box<dyn WorkUnit>>,
    {
        self.run_report(units).await.outcome
    }

    /// Like [`Coordinator::run`], keeping per-unit detail
    pub async fn run_report<I>(&mut self, units: I) -> RunReport
    where
        I: IntoIterator<Item = Box<dyn WorkUnit>>,
    {
        let run_id = Uuid::new_v4();
        let span = info_span!("run", %run_id);
        self.execute(run_id, units).instrument(span).await
    }

    async fn execute<I>(&mut self, run_id: Uuid, units: I) -> RunReport
    where
        I: IntoIterator<Item = Box<dyn WorkUnit>>,
    {
        let started = std::time::Instant::now();

        // Fresh registry per run; the previous one is released here.
        self.registry = Arc::new(KeyRegistry::with_shards(self.config.registry_shards));
        self.state = CoordinatorState::Idle;
        self.transition(CoordinatorState::Dispatching);

        let cancel = CancellationToken::new();
        let dispatcher = Dispatcher::new(
            self.registry.clone(),
            self.extractor.clone(),
            cancel.clone(),
            self.config.max_workers,
        );
        let mut workers = dispatcher.dispatch(units);
        info!(units = workers.remaining(), "Workers dispatched");
        self.transition(CoordinatorState::Running);

        let mut tally = Tally::default();
        let mut drain_deadline = None;

        loop {
            let next = match drain_deadline {
                None => workers.next().await,
                Some(deadline) => match timeout_at(deadline, workers.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        warn!(
                            remaining = workers.remaining(),
                            grace_ms = self.config.drain_grace.as_millis() as u64,
                            "Drain grace period elapsed, aborting workers"
                        );
                        workers.abort_all();
                        drain_deadline = None;
                        continue;
                    },
                },
            };
            let Some(report) = next else { break };

            let first_duplicate = matches!(report.status, WorkerStatus::DuplicateFound(_))
                && self.state == CoordinatorState::Running;
            tally.record(report);

            if first_duplicate {
                cancel.cancel();
                self.transition(CoordinatorState::Draining);
                drain_deadline = Some(Instant::now() + self.config.drain_grace);
            }
        }

        self.transition(CoordinatorState::Terminated);

        let report = tally.finish(
            run_id,
            self.registry.len(),
            started.elapsed().as_millis() as u64,
        );
        info!(
            outcome = report.outcome.kind(),
            distinct_keys = report.distinct_keys,
            elapsed_ms = report.elapsed_ms,
            "Run finished"
        );
        report
    }

    fn transition(&mut self, next: CoordinatorState) {
        debug!(from = self.state.as_str(), to = next.as_str(), "Coordinator state change");
        self.state = next;
    }
}

/// Accumulates worker reports in termination order
#[derive(Default)]
struct Tally {
    units: Vec<UnitSummary>,
    duplicates: Vec<DuplicateEvent>,
    first_failure: Option<(UnitId, ScanError)>,
}

impl Tally {
    fn record(&mut self, report: WorkerReport) {
        let WorkerReport {
            unit,
            status,
            records_read,
            keys_inserted,
        } = report;
        let state = status.state();

        let error = match status {
            WorkerStatus::DuplicateFound(event) => {
                if self.duplicates.is_empty() {
                    warn!(key = %event.key, unit = %event.unit, ordinal = event.ordinal, "First duplicate key found");
                }
                self.duplicates.push(event);
                None
            },
            WorkerStatus::Failed(err) => {
                warn!(unit = %unit, error = %err, "Work unit failed");
                let message = err.to_string();
                if self.first_failure.is_none() {
                    self.first_failure = Some((unit.clone(), err));
                }
                Some(message)
            },
            WorkerStatus::Clean | WorkerStatus::Cancelled => None,
        };

        self.units.push(UnitSummary {
            unit,
            state,
            records_read,
            keys_inserted,
            error,
        });
    }

    fn finish(self, run_id: Uuid, distinct_keys: usize, elapsed_ms: u64) -> RunReport {
        let outcome = match (self.duplicates.first(), self.first_failure) {
            (Some(event), _) => RunOutcome::DuplicateFound(event.clone()),
            (None, Some((unit, cause))) => RunOutcome::Failed { unit, cause },
            (None, None) => RunOutcome::Clean,
        };

        RunReport {
            run_id,
            outcome,
            units: self.units,
            duplicates: self.duplicates,
            distinct_keys,
            elapsed_ms,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::source::InMemoryUnit;
    use crate::types::{Key, UnitState};

    fn unit(id: &str, text: &str) -> Box<dyn WorkUnit> {
        InMemoryUnit::parse(id, text, ',').boxed()
    }

    #[tokio::test]
    async fn test_clean_run_registers_every_key() {
        let mut coordinator = Coordinator::new(ScanConfig::default());
        assert_eq!(coordinator.state(), CoordinatorState::Idle);

        let outcome = coordinator
            .run(vec![unit("A", "x,100"), unit("B", "y,200")])
            .await;

        assert!(outcome.is_clean());
        assert_eq!(coordinator.state(), CoordinatorState::Terminated);
        assert_eq!(coordinator.registry().keys(), vec![Key::from("100"), Key::from("200")]);
    }

    #[tokio::test]
    async fn test_duplicate_across_units_skips_headers() {
        let mut coordinator = Coordinator::new(ScanConfig::default());

        let outcome = coordinator
            .run(vec![
                unit("A", "barcode,1\nx,100\ny,200"),
                unit("B", "barcode,1\ny,200"),
            ])
            .await;

        let event = outcome.duplicate().expect("duplicate expected");
        assert_eq!(event.key, Key::from("200"));
        assert_ne!(event.unit, event.first_seen.unit);
    }

    #[tokio::test]
    async fn test_empty_input_is_clean() {
        let mut coordinator = Coordinator::new(ScanConfig::default());
        let report = coordinator.run_report(Vec::new()).await;

        assert!(report.outcome.is_clean());
        assert!(report.units.is_empty());
        assert_eq!(report.distinct_keys, 0);
        assert_eq!(coordinator.state(), CoordinatorState::Terminated);
    }

    #[tokio::test]
    async fn test_malformed_record_fails_without_touching_siblings() {
        let mut coordinator = Coordinator::new(ScanConfig::default());
        let report = coordinator
            .run_report(vec![unit("bad", "x,1\nbroken"), unit("good", "y,2\nz,3")])
            .await;

        match &report.outcome {
            RunOutcome::Failed { unit, cause } => {
                assert_eq!(unit.as_str(), "bad");
                assert!(matches!(cause, ScanError::MalformedRecord { .. }));
            },
            other => panic!("expected failure, got {other:?}"),
        }
        let good = report.units.iter().find(|u| u.unit.as_str() == "good").unwrap();
        assert_eq!(good.state, UnitState::Clean);
        assert_eq!(good.keys_inserted, 2);
    }

    #[tokio::test]
    async fn test_registry_is_reset_between_runs() {
        let mut coordinator = Coordinator::new(ScanConfig::default());

        assert!(coordinator.run(vec![unit("A", "x,100")]).await.is_clean());
        assert!(coordinator.run(vec![unit("A", "x,100")]).await.is_clean());
        assert_eq!(coordinator.registry().len(), 1);
    }
}
