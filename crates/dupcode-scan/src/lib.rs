//! dupcode scan library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Concurrent duplicate-key detection over a directory of delimited record
//! files. Every file is scanned by its own worker; all workers share one
//! [`KeyRegistry`] and the first collision cancels the rest of the run.
//!
//! # Components
//!
//! - [`KeyRegistry`]: sharded, linearizable check-and-insert of keys
//! - [`Worker`]: scans one [`WorkUnit`] and stops at its first collision
//! - [`Dispatcher`]: launches one worker per unit, optionally bounded
//! - [`Coordinator`]: drives the run and computes the [`RunOutcome`]
//!
//! # Example
//!
//! ```no_run
//! use dupcode_scan::{list_work_units, Coordinator, RunOutcome, ScanConfig, WorkUnit};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ScanConfig::from_env()?;
//!     let units = list_work_units("./code_files", None, config.delimiter).await?;
//!
//!     let mut coordinator = Coordinator::new(config);
//!     match coordinator.run(units.into_iter().map(WorkUnit::boxed)).await {
//!         RunOutcome::Clean => println!("no duplicates"),
//!         RunOutcome::DuplicateFound(event) => println!("{event}"),
//!         RunOutcome::Failed { unit, cause } => eprintln!("{unit}: {cause}"),
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod coordinator;
pub mod dispatcher;
pub mod error;
pub mod record;
pub mod registry;
pub mod source;
pub mod types;
pub mod worker;

// Re-export commonly used types
pub use config::ScanConfig;
pub use coordinator::{Coordinator, CoordinatorState};
pub use dispatcher::{Dispatched, Dispatcher};
pub use error::{Result, ScanError};
pub use record::{KeyExtractor, RecordLayout};
pub use registry::{Insertion, KeyRegistry};
pub use source::{list_work_units, FileUnit, InMemoryUnit, RecordStream, WorkUnit};
pub use types::{
    DuplicateEvent, Key, KeyOrigin, RunOutcome, RunReport, UnitId, UnitState, UnitSummary,
    WorkerReport, WorkerStatus,
};
pub use worker::Worker;
