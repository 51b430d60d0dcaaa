// src/pipeline/stats.rs

//! Summary figures over the stored table.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::models::{CanonicalRecord, Platform};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub total: usize,
    pub by_platform: BTreeMap<Platform, usize>,
    /// Records first discovered on `today`
    pub discovered_today: usize,
    /// Records starting on or after `today`
    pub upcoming: usize,
    /// Latest sighting across the table
    pub last_updated: Option<DateTime<Utc>>,
}

impl StoreStats {
    pub fn compute(records: &[CanonicalRecord], today: NaiveDate) -> Self {
        let mut by_platform: BTreeMap<Platform, usize> =
            Platform::ALL.iter().map(|p| (*p, 0)).collect();
        for record in records {
            *by_platform.entry(record.platform).or_default() += 1;
        }

        Self {
            total: records.len(),
            by_platform,
            discovered_today: records
                .iter()
                .filter(|r| r.discovered_at.date_naive() == today)
                .count(),
            upcoming: records
                .iter()
                .filter(|r| r.start_date.is_some_and(|d| d >= today))
                .count(),
            last_updated: records.iter().map(|r| r.last_seen_at).max(),
        }
    }

    /// Multi-line human readable rendering.
    pub fn render(&self) -> String {
        let mut out = format!("Total hackathons: {}\n", self.total);
        for (platform, count) in &self.by_platform {
            out.push_str(&format!("  {platform}: {count}\n"));
        }
        out.push_str(&format!("Discovered today: {}\n", self.discovered_today));
        out.push_str(&format!("Upcoming: {}\n", self.upcoming));
        match self.last_updated {
            Some(at) => out.push_str(&format!("Last updated: {}", at.format("%Y-%m-%d %H:%M UTC"))),
            None => out.push_str("Last updated: never"),
        }
        out
    }
}
