// src/pipeline/notify.rs

//! Run summaries and their delivery.
//!
//! One summary per run, never one per record. Delivery is best effort:
//! a failed send is retried once and then reported, never raised.

use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{
    CanonicalRecord, DispatchResult, NotificationConfig, NotifyChannel, SkipReason,
};

const NAME_LIMIT: usize = 30;

/// What clicking a notification should open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "target", rename_all = "lowercase")]
pub enum OpenAction {
    /// A file on disk, e.g. the store table
    Path(PathBuf),
    /// Any other locator (URL, in-memory label)
    Reference(String),
}

impl fmt::Display for OpenAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpenAction::Path(path) => write!(f, "{}", path.display()),
            OpenAction::Reference(reference) => f.write_str(reference),
        }
    }
}

/// Payload handed to a notifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationSummary {
    pub title: String,
    pub body: String,
    pub count: usize,
    pub open_action: OpenAction,
}

impl NotificationSummary {
    /// Summarize a batch of new records.
    pub fn for_new_records(
        records: &[CanonicalRecord],
        total: usize,
        max_highlights: usize,
        open_action: OpenAction,
    ) -> Self {
        let count = records.len();
        let plural = if count == 1 { "" } else { "s" };

        let mut body = format!("Found {count} new hackathon{plural}!\nTotal: {total} hackathons in store");
        if !records.is_empty() {
            body.push_str("\n\nNew hackathons:");
            for record in records.iter().take(max_highlights) {
                body.push_str(&format!(
                    "\n• {} ({})",
                    truncate_name(&record.name),
                    record.platform
                ));
            }
            if count > max_highlights {
                body.push_str(&format!("\n• +{} more...", count - max_highlights));
            }
        }
        body.push_str(&format!("\n\nOpen: {open_action}"));

        Self {
            title: "Hackathon Monitor Update".into(),
            body,
            count,
            open_action,
        }
    }

    /// Heartbeat for runs that found nothing new.
    pub fn heartbeat(total: usize, open_action: OpenAction) -> Self {
        Self {
            title: "Hackathon Monitor".into(),
            body: format!(
                "Monitoring active - no new hackathons found.\nTotal: {total} hackathons in store"
            ),
            count: 0,
            open_action,
        }
    }
}

fn truncate_name(name: &str) -> String {
    if name.chars().count() > NAME_LIMIT {
        let head: String = name.chars().take(NAME_LIMIT - 3).collect();
        format!("{head}...")
    } else {
        name.to_string()
    }
}

/// A concrete delivery mechanism.
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &'static str;

    async fn deliver(&self, summary: &NotificationSummary) -> Result<()>;
}

/// Writes summaries to the log.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn deliver(&self, summary: &NotificationSummary) -> Result<()> {
        log::info!("{}: {}", summary.title, summary.body.replace('\n', " | "));
        Ok(())
    }
}

/// Shows a desktop toast through the platform's notification command.
#[derive(Debug, Default, Clone)]
pub struct DesktopNotifier;

impl DesktopNotifier {
    fn command(summary: &NotificationSummary) -> Result<tokio::process::Command> {
        if cfg!(target_os = "linux") {
            let mut cmd = tokio::process::Command::new("notify-send");
            cmd.arg("--app-name=hackathon-monitor")
                .arg(&summary.title)
                .arg(&summary.body);
            Ok(cmd)
        } else if cfg!(target_os = "macos") {
            let script = format!(
                "display notification {} with title {}",
                applescript_quote(&summary.body),
                applescript_quote(&summary.title)
            );
            let mut cmd = tokio::process::Command::new("osascript");
            cmd.arg("-e").arg(script);
            Ok(cmd)
        } else {
            Err(AppError::notification(
                "desktop notifications are not supported on this platform",
            ))
        }
    }
}

fn applescript_quote(text: &str) -> String {
    format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
}

#[async_trait]
impl Notifier for DesktopNotifier {
    fn name(&self) -> &'static str {
        "desktop"
    }

    async fn deliver(&self, summary: &NotificationSummary) -> Result<()> {
        let output = Self::command(summary)?
            .output()
            .await
            .map_err(|e| AppError::notification(format!("spawn failed: {e}")))?;
        if !output.status.success() {
            return Err(AppError::notification(format!(
                "notifier exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}

/// Build the notifier selected in config.
pub fn notifier_for(channel: NotifyChannel) -> Arc<dyn Notifier> {
    match channel {
        NotifyChannel::Log => Arc::new(LogNotifier),
        NotifyChannel::Desktop => Arc::new(DesktopNotifier),
    }
}

/// Turns a run's new records into at most one delivered summary.
pub struct NotificationDispatcher {
    notifier: Arc<dyn Notifier>,
    max_highlights: usize,
    retry_delay: Duration,
    /// Last run that dispatched; runs never overlap
    last_dispatched: Mutex<Option<Uuid>>,
}

impl NotificationDispatcher {
    pub fn new(notifier: Arc<dyn Notifier>, config: &NotificationConfig) -> Self {
        Self {
            notifier,
            max_highlights: config.max_highlights.max(1),
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            last_dispatched: Mutex::new(None),
        }
    }

    /// Notify about `new_records` found by run `run_id`.
    ///
    /// A run id that already dispatched is skipped, as is an empty batch.
    pub async fn notify(
        &self,
        run_id: Uuid,
        new_records: &[CanonicalRecord],
        total: usize,
        open_action: OpenAction,
    ) -> DispatchResult {
        if new_records.is_empty() {
            return DispatchResult::Skipped {
                reason: SkipReason::NothingNew,
            };
        }
        let summary = NotificationSummary::for_new_records(
            new_records,
            total,
            self.max_highlights,
            open_action,
        );
        self.dispatch_once(run_id, &summary).await
    }

    /// Send the "nothing new" heartbeat for `run_id`.
    pub async fn heartbeat(
        &self,
        run_id: Uuid,
        total: usize,
        open_action: OpenAction,
    ) -> DispatchResult {
        let summary = NotificationSummary::heartbeat(total, open_action);
        self.dispatch_once(run_id, &summary).await
    }

    /// Deliver a summary outside any run, bypassing the run-id guard.
    pub async fn send_direct(&self, summary: &NotificationSummary) -> DispatchResult {
        self.deliver_with_retry(summary).await
    }

    async fn dispatch_once(&self, run_id: Uuid, summary: &NotificationSummary) -> DispatchResult {
        let first_time = {
            let mut last = self
                .last_dispatched
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            last.replace(run_id) != Some(run_id)
        };
        if !first_time {
            log::info!("Run {} already notified; skipping", run_id);
            return DispatchResult::Skipped {
                reason: SkipReason::AlreadyDispatched,
            };
        }
        self.deliver_with_retry(summary).await
    }

    async fn deliver_with_retry(&self, summary: &NotificationSummary) -> DispatchResult {
        match self.notifier.deliver(summary).await {
            Ok(()) => return DispatchResult::Sent { attempts: 1 },
            Err(e) => {
                log::warn!(
                    "{} notifier failed: {}. Retrying in {:?}",
                    self.notifier.name(),
                    e,
                    self.retry_delay
                );
            }
        }

        tokio::time::sleep(self.retry_delay).await;

        match self.notifier.deliver(summary).await {
            Ok(()) => DispatchResult::Sent { attempts: 2 },
            Err(e) => {
                log::error!("{} notifier failed again: {}", self.notifier.name(), e);
                DispatchResult::Failed {
                    attempts: 2,
                    error: e.to_string(),
                }
            }
        }
    }
}
