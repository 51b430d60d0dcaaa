//! The aggregation pipeline.
//!
//! - `canonicalize`: raw items to canonical records
//! - `filter`: inclusion rules
//! - `dedup`: diff against and commit to the stored table
//! - `notify`: one summary per run
//! - `run`: one full pass over every enabled adapter
//! - `scheduler`: run lock and repeat timer
//! - `stats` / `export`: read-only views of the table

pub mod canonicalize;
pub mod dedup;
pub mod export;
pub mod filter;
pub mod notify;
pub mod run;
pub mod scheduler;
pub mod stats;

pub use dedup::{DedupDiff, DedupStore};
pub use export::ExportFormat;
pub use filter::FilterEngine;
pub use notify::{NotificationDispatcher, NotificationSummary, Notifier, OpenAction};
pub use run::{Aggregator, RunContext};
pub use scheduler::{Scheduler, SchedulerState, TriggerOutcome};
pub use stats::StoreStats;
