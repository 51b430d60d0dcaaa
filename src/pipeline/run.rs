// src/pipeline/run.rs

//! One aggregation run: fetch, canonicalize, filter, diff, commit, notify.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    AdapterOutcome, CanonicalRecord, Config, DispatchResult, PlatformReport, PlatformToggles,
    RunReport, SkipReason,
};
use crate::pipeline::canonicalize::canonicalize;
use crate::pipeline::dedup::DedupStore;
use crate::pipeline::filter::FilterEngine;
use crate::pipeline::notify::{NotificationDispatcher, Notifier, notifier_for};
use crate::services::{PlatformAdapter, build_adapters};
use crate::storage::{RecordStorage, StoreLock};
use crate::utils::http::HttpFetcher;

/// Everything a run needs to know about "now".
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: Uuid,
    pub now: DateTime<Utc>,
    pub cancel: CancellationToken,
}

impl RunContext {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            now,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// A fresh run at `now` that stops when this one is cancelled.
    pub fn child(&self, now: DateTime<Utc>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            now,
            cancel: self.cancel.child_token(),
        }
    }
}

/// Wires adapters, filter, dedup store and dispatcher into one pass.
pub struct Aggregator {
    adapters: Vec<Arc<dyn PlatformAdapter>>,
    storage: Arc<dyn RecordStorage>,
    dispatcher: NotificationDispatcher,
    filter: FilterEngine,
    platforms: PlatformToggles,
    max_concurrent: usize,
    notifications_enabled: bool,
    notify_when_empty: bool,
}

impl Aggregator {
    pub fn new(
        config: &Config,
        adapters: Vec<Arc<dyn PlatformAdapter>>,
        storage: Arc<dyn RecordStorage>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            adapters,
            storage,
            dispatcher: NotificationDispatcher::new(notifier, &config.notifications),
            filter: FilterEngine::new(&config.filters, &config.platforms),
            platforms: config.platforms.clone(),
            max_concurrent: config.crawler.max_concurrent.max(1),
            notifications_enabled: config.settings.notifications_enabled,
            notify_when_empty: config.settings.notify_when_empty,
        }
    }

    /// Build the production wiring: HTTP adapters and the configured channel.
    pub fn from_config(config: &Config, storage: Arc<dyn RecordStorage>) -> Result<Self> {
        let fetcher = HttpFetcher::from_config(&config.crawler)?;
        let adapters = build_adapters(config, &fetcher);
        let notifier = notifier_for(config.notifications.channel);
        Ok(Self::new(config, adapters, storage, notifier))
    }

    /// Take the table's run lock; `Ok(None)` when another process holds it.
    pub fn try_lock_store(&self) -> Result<Option<StoreLock>> {
        self.storage.try_lock()
    }

    /// Execute one run.
    ///
    /// Store read and write failures abort the run and are returned as
    /// errors. Adapter and notification failures only show up in the
    /// report.
    pub async fn run(&self, ctx: &RunContext) -> Result<RunReport> {
        log::info!("Run {} starting at {}", ctx.run_id, ctx.now);

        // Prior state first: if it cannot be read there is nothing to diff against
        let mut store = DedupStore::load(self.storage.as_ref()).await?;

        let outcomes = self.fetch_all(ctx).await;

        let mut platforms = Vec::with_capacity(outcomes.len());
        let mut raw_items = Vec::new();
        for outcome in outcomes {
            platforms.push(PlatformReport {
                platform: outcome.platform,
                status: outcome.result.status,
                fetched: outcome.items.len(),
                error: outcome.result.error,
            });
            raw_items.extend(outcome.items);
        }

        let candidates: Vec<CanonicalRecord> = raw_items
            .iter()
            .filter_map(|raw| canonicalize(raw, ctx.now))
            .collect();
        let canonical_count = candidates.len();

        let today = ctx.now.date_naive();
        let passing: Vec<CanonicalRecord> = candidates
            .into_iter()
            .filter(|record| self.filter.passes(record, today))
            .collect();
        let filtered_out = canonical_count - passing.len();

        let diff = store.diff(&passing);
        if diff.candidate_count() > 0 {
            store.commit(&diff, self.storage.as_ref()).await?;
        }
        log::info!(
            "Run {}: {} candidates, {} filtered out, {} new, {} refreshed, {} stored",
            ctx.run_id,
            diff.candidate_count(),
            filtered_out,
            diff.added.len(),
            diff.refreshed.len(),
            store.len()
        );

        let notification = self.dispatch(ctx, &diff.added, store.len()).await;

        Ok(RunReport {
            run_id: ctx.run_id,
            started_at: ctx.now,
            finished_at: Utc::now(),
            platforms,
            candidate_count: diff.candidate_count(),
            filtered_out,
            new_count: diff.added.len(),
            refreshed_count: diff.refreshed.len(),
            total_count: store.len(),
            cancelled: ctx.cancel.is_cancelled(),
            notification,
        })
    }

    /// Fetch every enabled platform, at most `max_concurrent` at a time.
    ///
    /// Outcomes come back in platform order whatever order they finish in.
    async fn fetch_all(&self, ctx: &RunContext) -> Vec<AdapterOutcome> {
        let fetches: Vec<BoxFuture<'static, (usize, AdapterOutcome)>> = self
            .adapters
            .iter()
            .filter(|adapter| self.platforms.is_enabled(adapter.platform()))
            .cloned()
            .enumerate()
            .map(|(index, adapter)| {
                let now = ctx.now;
                let cancel = ctx.cancel.clone();
                async move {
                    let platform = adapter.platform();
                    if cancel.is_cancelled() {
                        let outcome =
                            AdapterOutcome::not_started(platform, "cancelled before start");
                        return (index, outcome);
                    }
                    let outcome = adapter.fetch(now, &cancel).await;
                    log::info!(
                        "{}: {:?}, {} items",
                        platform,
                        outcome.result.status,
                        outcome.items.len()
                    );
                    (index, outcome)
                }
                .boxed()
            })
            .collect();

        let mut outcomes: Vec<(usize, AdapterOutcome)> = stream::iter(fetches)
            .buffer_unordered(self.max_concurrent)
            .collect()
            .await;
        outcomes.sort_by_key(|(index, outcome)| (outcome.platform, *index));
        outcomes.into_iter().map(|(_, outcome)| outcome).collect()
    }

    async fn dispatch(
        &self,
        ctx: &RunContext,
        added: &[CanonicalRecord],
        total: usize,
    ) -> DispatchResult {
        if !self.notifications_enabled {
            return DispatchResult::Skipped {
                reason: SkipReason::Disabled,
            };
        }
        let open_action = self.storage.open_action();
        if !added.is_empty() {
            self.dispatcher
                .notify(ctx.run_id, added, total, open_action)
                .await
        } else if self.notify_when_empty {
            self.dispatcher
                .heartbeat(ctx.run_id, total, open_action)
                .await
        } else {
            DispatchResult::Skipped {
                reason: SkipReason::NothingNew,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::models::{AdapterResult, AdapterStatus, Platform, RawItem};
    use crate::pipeline::notify::{NotificationSummary, OpenAction};
    use crate::storage::MemoryStorage;
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct StaticAdapter {
        platform: Platform,
        items: Vec<RawItem>,
        result: AdapterResult,
        delay: std::time::Duration,
    }

    impl StaticAdapter {
        fn ok(platform: Platform, items: Vec<RawItem>) -> Arc<dyn PlatformAdapter> {
            Self::delayed(platform, items, std::time::Duration::ZERO)
        }

        fn delayed(
            platform: Platform,
            items: Vec<RawItem>,
            delay: std::time::Duration,
        ) -> Arc<dyn PlatformAdapter> {
            Arc::new(Self {
                platform,
                items,
                result: AdapterResult::ok(),
                delay,
            })
        }

        fn failing(platform: Platform) -> Arc<dyn PlatformAdapter> {
            Arc::new(Self {
                platform,
                items: Vec::new(),
                result: AdapterResult::failed("503 Service Unavailable"),
                delay: std::time::Duration::ZERO,
            })
        }
    }

    #[async_trait]
    impl PlatformAdapter for StaticAdapter {
        fn platform(&self) -> Platform {
            self.platform
        }

        async fn fetch(&self, _now: DateTime<Utc>, _cancel: &CancellationToken) -> AdapterOutcome {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            AdapterOutcome {
                platform: self.platform,
                items: self.items.clone(),
                result: self.result.clone(),
                pages_fetched: 1,
            }
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        delivered: Mutex<Vec<NotificationSummary>>,
        broken: bool,
    }

    impl RecordingNotifier {
        fn delivered(&self) -> Vec<NotificationSummary> {
            self.delivered.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn deliver(&self, summary: &NotificationSummary) -> Result<()> {
            if self.broken {
                return Err(AppError::notification("no display"));
            }
            self.delivered.lock().unwrap().push(summary.clone());
            Ok(())
        }
    }

    /// Storage whose reads and writes can be switched off.
    #[derive(Default)]
    struct FlakyStorage {
        inner: MemoryStorage,
        fail_reads: AtomicBool,
        fail_writes: AtomicBool,
    }

    #[async_trait]
    impl RecordStorage for FlakyStorage {
        async fn load(&self) -> Result<Vec<CanonicalRecord>> {
            if self.fail_reads.load(Ordering::SeqCst) {
                return Err(AppError::Io(std::io::Error::other("disk gone")));
            }
            self.inner.load().await
        }

        async fn save(&self, records: &[CanonicalRecord]) -> Result<()> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(AppError::Io(std::io::Error::other("read-only fs")));
            }
            self.inner.save(records).await
        }

        fn open_action(&self) -> OpenAction {
            self.inner.open_action()
        }
    }

    fn feb(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 2, day, 8, 0, 0).unwrap()
    }

    fn config() -> Config {
        let mut config = Config::default();
        config.notifications.retry_delay_ms = 0;
        config
    }

    fn ai_hack(start: &str) -> RawItem {
        RawItem::new(Platform::Devpost, "AI Hack")
            .with_url("https://x.com/e1?utm=fb")
            .with_start_date(start)
    }

    fn aggregator(
        config: &Config,
        adapters: Vec<Arc<dyn PlatformAdapter>>,
        storage: Arc<dyn RecordStorage>,
        notifier: Arc<RecordingNotifier>,
    ) -> Aggregator {
        Aggregator::new(config, adapters, storage, notifier)
    }

    #[tokio::test]
    async fn test_scenario_new_record_is_committed_and_notified() {
        let storage = Arc::new(MemoryStorage::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let agg = aggregator(
            &config(),
            vec![StaticAdapter::ok(Platform::Devpost, vec![ai_hack("2025-03-01")])],
            storage.clone(),
            notifier.clone(),
        );

        let report = agg.run(&RunContext::new(feb(1))).await.unwrap();

        assert_eq!(report.new_count, 1);
        assert_eq!(report.total_count, 1);
        assert_eq!(report.status_of(Platform::Devpost), Some(AdapterStatus::Ok));
        assert_eq!(report.notification, DispatchResult::Sent { attempts: 1 });

        let stored = storage.snapshot();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].url.as_deref(), Some("https://x.com/e1"));
        assert_eq!(stored[0].discovered_at, feb(1));

        let delivered = notifier.delivered();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].count, 1);
    }

    #[tokio::test]
    async fn test_scenario_past_event_is_filtered_out() {
        let storage = Arc::new(MemoryStorage::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let agg = aggregator(
            &config(),
            vec![StaticAdapter::ok(Platform::Devpost, vec![ai_hack("2024-01-01")])],
            storage.clone(),
            notifier.clone(),
        );

        let report = agg.run(&RunContext::new(feb(1))).await.unwrap();

        assert_eq!(report.filtered_out, 1);
        assert_eq!(report.new_count, 0);
        assert!(storage.snapshot().is_empty());
        assert!(notifier.delivered().is_empty());
        assert_eq!(
            report.notification,
            DispatchResult::Skipped {
                reason: SkipReason::NothingNew
            }
        );
    }

    #[tokio::test]
    async fn test_scenario_rerun_refreshes_without_notifying() {
        let storage = Arc::new(MemoryStorage::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let agg = aggregator(
            &config(),
            vec![StaticAdapter::ok(Platform::Devpost, vec![ai_hack("2025-03-01")])],
            storage.clone(),
            notifier.clone(),
        );

        agg.run(&RunContext::new(feb(1))).await.unwrap();
        let later = feb(1) + Duration::hours(6);
        let second = agg.run(&RunContext::new(later)).await.unwrap();

        assert_eq!(second.new_count, 0);
        assert_eq!(second.refreshed_count, 1);
        assert!(!second.notification.was_sent());
        assert_eq!(notifier.delivered().len(), 1);

        let stored = storage.snapshot();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].discovered_at, feb(1));
        assert_eq!(stored[0].last_seen_at, later);
    }

    #[tokio::test]
    async fn test_dedup_completeness_across_runs() {
        let storage = Arc::new(MemoryStorage::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let item = |slug: &str| {
            RawItem::new(Platform::Mlh, slug)
                .with_url(format!("https://mlh.io/e/{slug}"))
                .with_start_date("2025-03-20")
        };
        let batches = [
            vec![item("a")],
            vec![item("a"), item("b")],
            vec![item("b"), item("c"), item("c")],
        ];

        for (day, batch) in batches.into_iter().enumerate() {
            let agg = aggregator(
                &config(),
                vec![StaticAdapter::ok(Platform::Mlh, batch)],
                storage.clone(),
                notifier.clone(),
            );
            agg.run(&RunContext::new(feb(day as u32 + 1))).await.unwrap();
        }

        let stored = storage.snapshot();
        assert_eq!(stored.len(), 3);
        let discovered = |slug: &str| {
            stored
                .iter()
                .find(|r| r.url.as_deref() == Some(&format!("https://mlh.io/e/{slug}")[..]))
                .map(|r| r.discovered_at)
        };
        assert_eq!(discovered("a"), Some(feb(1)));
        assert_eq!(discovered("b"), Some(feb(2)));
        assert_eq!(discovered("c"), Some(feb(3)));
        assert_eq!(notifier.delivered().len(), 3);
    }

    #[tokio::test]
    async fn test_partial_failure_isolation() {
        let storage = Arc::new(MemoryStorage::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let mlh_item = RawItem::new(Platform::Mlh, "Hack the North")
            .with_url("https://hackthenorth.com")
            .with_start_date("2025-02-20");
        let agg = aggregator(
            &config(),
            vec![
                StaticAdapter::failing(Platform::Devpost),
                StaticAdapter::ok(Platform::Mlh, vec![mlh_item]),
            ],
            storage.clone(),
            notifier.clone(),
        );

        let report = agg.run(&RunContext::new(feb(1))).await.unwrap();

        assert_eq!(report.status_of(Platform::Devpost), Some(AdapterStatus::Failed));
        assert_eq!(report.status_of(Platform::Mlh), Some(AdapterStatus::Ok));
        assert_eq!(report.failed_platforms(), vec![Platform::Devpost]);
        assert_eq!(report.new_count, 1);
        assert_eq!(storage.snapshot()[0].platform, Platform::Mlh);
    }

    #[tokio::test]
    async fn test_disabled_platform_is_not_fetched() {
        let mut config = config();
        config.platforms.unstop = false;
        let storage = Arc::new(MemoryStorage::new());
        let agg = aggregator(
            &config,
            vec![StaticAdapter::ok(
                Platform::Unstop,
                vec![RawItem::new(Platform::Unstop, "Campus Build").with_start_date("2025-02-10")],
            )],
            storage.clone(),
            Arc::new(RecordingNotifier::default()),
        );

        let report = agg.run(&RunContext::new(feb(1))).await.unwrap();
        assert!(report.platforms.is_empty());
        assert!(storage.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_store_read_failure_aborts_before_fetch() {
        let storage = Arc::new(FlakyStorage::default());
        storage.fail_reads.store(true, Ordering::SeqCst);
        let notifier = Arc::new(RecordingNotifier::default());
        let agg = aggregator(
            &config(),
            vec![StaticAdapter::ok(Platform::Devpost, vec![ai_hack("2025-03-01")])],
            storage.clone(),
            notifier.clone(),
        );

        let err = agg.run(&RunContext::new(feb(1))).await.unwrap_err();
        assert!(matches!(err, AppError::StoreRead(_)));
        assert!(notifier.delivered().is_empty());
    }

    #[tokio::test]
    async fn test_store_write_failure_keeps_previous_table() {
        let storage = Arc::new(FlakyStorage::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let first = aggregator(
            &config(),
            vec![StaticAdapter::ok(Platform::Devpost, vec![ai_hack("2025-03-01")])],
            storage.clone(),
            notifier.clone(),
        );
        first.run(&RunContext::new(feb(1))).await.unwrap();

        storage.fail_writes.store(true, Ordering::SeqCst);
        let second = aggregator(
            &config(),
            vec![StaticAdapter::ok(
                Platform::Devpost,
                vec![
                    ai_hack("2025-03-01"),
                    RawItem::new(Platform::Devpost, "Night Owl Jam")
                        .with_url("https://x.com/owl")
                        .with_start_date("2025-02-15"),
                ],
            )],
            storage.clone(),
            notifier.clone(),
        );
        let err = second.run(&RunContext::new(feb(2))).await.unwrap_err();

        assert!(matches!(err, AppError::StoreWrite(_)));
        let stored = storage.inner.snapshot();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].last_seen_at, feb(1));
        assert_eq!(notifier.delivered().len(), 1);
    }

    #[tokio::test]
    async fn test_notification_failure_does_not_fail_run() {
        let storage = Arc::new(MemoryStorage::new());
        let notifier = Arc::new(RecordingNotifier {
            broken: true,
            ..RecordingNotifier::default()
        });
        let agg = aggregator(
            &config(),
            vec![StaticAdapter::ok(Platform::Devpost, vec![ai_hack("2025-03-01")])],
            storage.clone(),
            notifier,
        );

        let report = agg.run(&RunContext::new(feb(1))).await.unwrap();
        assert!(matches!(
            report.notification,
            DispatchResult::Failed { attempts: 2, .. }
        ));
        assert_eq!(storage.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn test_notifications_disabled() {
        let mut config = config();
        config.settings.notifications_enabled = false;
        let notifier = Arc::new(RecordingNotifier::default());
        let agg = aggregator(
            &config,
            vec![StaticAdapter::ok(Platform::Devpost, vec![ai_hack("2025-03-01")])],
            Arc::new(MemoryStorage::new()),
            notifier.clone(),
        );

        let report = agg.run(&RunContext::new(feb(1))).await.unwrap();
        assert_eq!(report.new_count, 1);
        assert_eq!(
            report.notification,
            DispatchResult::Skipped {
                reason: SkipReason::Disabled
            }
        );
        assert!(notifier.delivered().is_empty());
    }

    #[tokio::test]
    async fn test_heartbeat_when_enabled_and_nothing_new() {
        let mut config = config();
        config.settings.notify_when_empty = true;
        let notifier = Arc::new(RecordingNotifier::default());
        let agg = aggregator(
            &config,
            Vec::new(),
            Arc::new(MemoryStorage::new()),
            notifier.clone(),
        );

        let report = agg.run(&RunContext::new(feb(1))).await.unwrap();
        assert!(report.notification.was_sent());
        assert_eq!(notifier.delivered()[0].count, 0);
    }

    #[tokio::test]
    async fn test_cancelled_run_starts_no_adapters() {
        let storage = Arc::new(MemoryStorage::new());
        let agg = aggregator(
            &config(),
            vec![
                StaticAdapter::ok(Platform::Devpost, vec![ai_hack("2025-03-01")]),
                StaticAdapter::ok(Platform::Mlh, Vec::new()),
            ],
            storage.clone(),
            Arc::new(RecordingNotifier::default()),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = agg
            .run(&RunContext::new(feb(1)).with_cancel(cancel))
            .await
            .unwrap();

        assert!(report.cancelled);
        assert_eq!(report.failed_platforms(), vec![Platform::Devpost, Platform::Mlh]);
        assert!(storage.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_run_can_be_spawned() {
        let storage = Arc::new(MemoryStorage::new());
        let agg = Arc::new(aggregator(
            &config(),
            vec![StaticAdapter::ok(Platform::Devpost, vec![ai_hack("2025-03-01")])],
            storage.clone(),
            Arc::new(RecordingNotifier::default()),
        ));

        let handle = tokio::spawn({
            let agg = agg.clone();
            async move { agg.run(&RunContext::new(feb(1))).await }
        });

        assert_eq!(handle.await.unwrap().unwrap().new_count, 1);
        assert_eq!(storage.snapshot().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_records_are_reported_in_platform_order() {
        let notifier = Arc::new(RecordingNotifier::default());
        let campus = RawItem::new(Platform::Unstop, "Campus Build")
            .with_url("https://unstop.com/hackathons/campus-build")
            .with_start_date("2025-02-10");
        let agg = aggregator(
            &config(),
            vec![
                StaticAdapter::ok(Platform::Unstop, vec![campus]),
                StaticAdapter::delayed(
                    Platform::Devpost,
                    vec![ai_hack("2025-03-01")],
                    std::time::Duration::from_secs(5),
                ),
            ],
            Arc::new(MemoryStorage::new()),
            notifier.clone(),
        );

        let report = agg.run(&RunContext::new(feb(1))).await.unwrap();

        let order: Vec<Platform> = report.platforms.iter().map(|p| p.platform).collect();
        assert_eq!(order, vec![Platform::Devpost, Platform::Unstop]);
        let body = &notifier.delivered()[0].body;
        let devpost = body.find("AI Hack").unwrap();
        let unstop = body.find("Campus Build").unwrap();
        assert!(devpost < unstop);
    }

    #[test]
    fn test_child_context_shares_cancellation() {
        let parent = RunContext::new(feb(1));
        let child = parent.child(feb(2));
        assert_ne!(parent.run_id, child.run_id);
        parent.cancel.cancel();
        assert!(child.cancel.is_cancelled());
    }
}
