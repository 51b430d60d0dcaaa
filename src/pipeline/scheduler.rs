// src/pipeline/scheduler.rs

//! Run lock, enable toggle and the repeat timer.
//!
//! Manual and timed triggers go through the same [`Scheduler::trigger`],
//! which runs the aggregator only if no other run holds the lock. A
//! trigger that finds the lock taken is dropped, never queued.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::error::AppError;
use crate::models::{Config, RunReport};
use crate::pipeline::run::{Aggregator, RunContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerState {
    Idle,
    Running,
}

/// What a trigger amounted to.
#[derive(Debug)]
pub enum TriggerOutcome {
    Completed(RunReport),
    /// The run aborted on a store error
    Failed(AppError),
    /// Another run held the lock
    Skipped,
}

pub struct Scheduler {
    aggregator: Arc<Aggregator>,
    run_lock: Mutex<()>,
    enabled: AtomicBool,
    interval: Duration,
}

impl Scheduler {
    pub fn new(aggregator: Arc<Aggregator>, interval: Duration) -> Self {
        Self {
            aggregator,
            run_lock: Mutex::new(()),
            enabled: AtomicBool::new(true),
            interval,
        }
    }

    pub fn from_config(aggregator: Arc<Aggregator>, config: &Config) -> Self {
        let hours = config.settings.interval_hours.max(1);
        Self::new(aggregator, Duration::from_secs(hours * 3600))
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Turn the repeat loop on or off. Manual triggers are unaffected.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn state(&self) -> SchedulerState {
        match self.run_lock.try_lock() {
            Ok(_) => SchedulerState::Idle,
            Err(_) => SchedulerState::Running,
        }
    }

    /// Run once if nothing else is running, in this process or another.
    pub async fn trigger(&self, ctx: &RunContext) -> TriggerOutcome {
        let Ok(_guard) = self.run_lock.try_lock() else {
            log::info!("Run {} skipped: another run is in progress", ctx.run_id);
            return TriggerOutcome::Skipped;
        };
        let _store_lock = match self.aggregator.try_lock_store() {
            Ok(Some(lock)) => lock,
            Ok(None) => {
                log::info!("Run {} skipped: table is locked by another process", ctx.run_id);
                return TriggerOutcome::Skipped;
            }
            Err(e) => {
                log::error!("Run {} aborted: {}", ctx.run_id, e);
                return TriggerOutcome::Failed(e);
            }
        };

        match self.aggregator.run(ctx).await {
            Ok(report) => TriggerOutcome::Completed(report),
            Err(e) => {
                log::error!("Run {} aborted: {}", ctx.run_id, e);
                TriggerOutcome::Failed(e)
            }
        }
    }

    /// Fire a run every interval until `shutdown` is cancelled.
    ///
    /// The first run happens immediately. Ticks that fall due while a run
    /// is still going are skipped. Failed runs are logged and the loop
    /// carries on with the next tick.
    pub async fn run_loop(&self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        log::info!("Monitoring every {:?}", self.interval);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if !self.is_enabled() {
                log::debug!("Timer fired while disabled");
                continue;
            }

            let ctx = RunContext::new(Utc::now()).with_cancel(shutdown.child_token());
            match self.trigger(&ctx).await {
                TriggerOutcome::Completed(report) => log::info!(
                    "Run {} finished: {} new, {} total",
                    report.run_id,
                    report.new_count,
                    report.total_count
                ),
                TriggerOutcome::Failed(e) if e.is_store_error() => {
                    log::warn!("Store unavailable, retrying next tick: {}", e)
                }
                TriggerOutcome::Failed(e) => log::warn!("Run failed: {}", e),
                TriggerOutcome::Skipped => {}
            }
        }
        log::info!("Monitoring stopped");
    }
}
