// src/models/report.rs

//! Structured status returned by adapters, the dispatcher and whole runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Platform, RawItem};

/// Outcome class of one adapter invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdapterStatus {
    Ok,
    Partial,
    Failed,
}

/// Status half of an adapter's return value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterResult {
    pub status: AdapterStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AdapterResult {
    pub fn ok() -> Self {
        Self {
            status: AdapterStatus::Ok,
            error: None,
        }
    }

    pub fn partial(reason: impl Into<String>) -> Self {
        Self {
            status: AdapterStatus::Partial,
            error: Some(reason.into()),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: AdapterStatus::Failed,
            error: Some(error.into()),
        }
    }
}

/// Everything an adapter hands back: the items gathered plus its status.
#[derive(Debug, Clone)]
pub struct AdapterOutcome {
    pub platform: Platform,
    pub items: Vec<RawItem>,
    pub result: AdapterResult,
    pub pages_fetched: usize,
}

impl AdapterOutcome {
    /// An adapter that never got to run.
    pub fn not_started(platform: Platform, reason: impl Into<String>) -> Self {
        Self {
            platform,
            items: Vec::new(),
            result: AdapterResult::failed(reason),
            pages_fetched: 0,
        }
    }
}

/// Per-platform line of a run report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformReport {
    pub platform: Platform,
    pub status: AdapterStatus,
    pub fetched: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of one notification dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DispatchResult {
    Sent { attempts: u32 },
    Skipped { reason: SkipReason },
    Failed { attempts: u32, error: String },
}

impl DispatchResult {
    pub fn was_sent(&self) -> bool {
        matches!(self, DispatchResult::Sent { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// No new records this run.
    NothingNew,
    /// This run id already dispatched.
    AlreadyDispatched,
    /// Notifications are turned off in config.
    Disabled,
}

/// Aggregate result of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub platforms: Vec<PlatformReport>,
    /// Canonical candidates after within-run dedup.
    pub candidate_count: usize,
    pub filtered_out: usize,
    pub new_count: usize,
    pub refreshed_count: usize,
    /// Records in the store after commit.
    pub total_count: usize,
    pub cancelled: bool,
    pub notification: DispatchResult,
}

impl RunReport {
    pub fn status_of(&self, platform: Platform) -> Option<AdapterStatus> {
        self.platforms
            .iter()
            .find(|p| p.platform == platform)
            .map(|p| p.status)
    }

    pub fn failed_platforms(&self) -> Vec<Platform> {
        self.platforms
            .iter()
            .filter(|p| p.status == AdapterStatus::Failed)
            .map(|p| p.platform)
            .collect()
    }
}
