// src/models/mod.rs

//! Domain models for the hackathon monitor.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod config;
mod platform;
mod record;
mod report;

// Re-export all public types
pub use config::{
    Config, CrawlerConfig, FilterConfig, MissingDatePolicy, NotificationConfig, NotifyChannel,
    PlatformToggles, Settings,
};
pub use platform::Platform;
pub use record::{CanonicalRecord, RawItem, StoredRow, identity_key};
pub use report::{
    AdapterOutcome, AdapterResult, AdapterStatus, DispatchResult, PlatformReport, RunReport,
    SkipReason,
};
