// src/models/record.rs

//! Raw listings, canonical records and their persisted row form.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{AppError, Result};
use crate::models::Platform;

/// One listing as scraped from a source, before any normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawItem {
    pub platform: Platform,
    pub name: String,
    pub url: Option<String>,
    /// Free-form start date text, or a whole range like `Mar 01 - 15, 2025`.
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub tags: Vec<String>,
}

impl RawItem {
    pub fn new(platform: Platform, name: impl Into<String>) -> Self {
        Self {
            platform,
            name: name.into(),
            url: None,
            start_date: None,
            end_date: None,
            tags: Vec::new(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_start_date(mut self, date: impl Into<String>) -> Self {
        self.start_date = Some(date.into());
        self
    }

    pub fn with_end_date(mut self, date: impl Into<String>) -> Self {
        self.end_date = Some(date.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }
}

/// The normalized, dedup-ready representation of one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub identity_key: String,
    pub name: String,
    pub platform: Platform,
    pub url: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub tags: BTreeSet<String>,
    pub discovered_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

impl CanonicalRecord {
    /// Refresh mutable fields from a newer sighting of the same event.
    ///
    /// `discovered_at` is kept; `last_seen_at` only ever moves forward.
    pub fn refresh_from(&mut self, sighting: &CanonicalRecord) {
        debug_assert_eq!(self.identity_key, sighting.identity_key);
        self.name = sighting.name.clone();
        self.url = sighting.url.clone();
        self.start_date = sighting.start_date;
        self.end_date = sighting.end_date.or(self.end_date);
        self.tags = sighting.tags.clone();
        if sighting.last_seen_at > self.last_seen_at {
            self.last_seen_at = sighting.last_seen_at;
        }
    }

    /// Fold a duplicate sighting from the same batch into this one.
    pub fn absorb(&mut self, other: &CanonicalRecord) {
        self.tags.extend(other.tags.iter().cloned());
        if self.end_date.is_none() {
            self.end_date = other.end_date;
        }
    }

    /// Days from `today` until the event starts, if the start is known.
    pub fn days_until_start(&self, today: NaiveDate) -> Option<i64> {
        self.start_date.map(|d| (d - today).num_days())
    }
}

/// Compute the identity key of an event.
///
/// Uses the canonical URL when there is one, otherwise a SHA-256 over
/// platform, whitespace-collapsed lowercase name and start date.
pub fn identity_key(
    platform: Platform,
    url: Option<&str>,
    name: &str,
    start_date: Option<NaiveDate>,
) -> String {
    if let Some(url) = url.filter(|u| !u.is_empty()) {
        return format!("url:{url}");
    }

    let name = name.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    let start = start_date.map(|d| d.to_string()).unwrap_or_default();

    let mut hasher = Sha256::new();
    hasher.update(platform.name().as_bytes());
    hasher.update([0x1f]);
    hasher.update(name.as_bytes());
    hasher.update([0x1f]);
    hasher.update(start.as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("sha:{}", &digest[..32])
}

/// One row of the persisted table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRow {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Platform")]
    pub platform: Platform,
    #[serde(rename = "URL", default)]
    pub url: String,
    #[serde(rename = "StartDate", default)]
    pub start_date: String,
    #[serde(rename = "EndDate", default)]
    pub end_date: String,
    #[serde(rename = "Tags", default)]
    pub tags: String,
    #[serde(rename = "DiscoveredAt")]
    pub discovered_at: DateTime<Utc>,
    #[serde(rename = "LastSeenAt")]
    pub last_seen_at: DateTime<Utc>,
}

impl From<&CanonicalRecord> for StoredRow {
    fn from(record: &CanonicalRecord) -> Self {
        Self {
            name: record.name.clone(),
            platform: record.platform,
            url: record.url.clone().unwrap_or_default(),
            start_date: record.start_date.map(|d| d.to_string()).unwrap_or_default(),
            end_date: record.end_date.map(|d| d.to_string()).unwrap_or_default(),
            tags: record.tags.iter().cloned().collect::<Vec<_>>().join(", "),
            discovered_at: record.discovered_at,
            last_seen_at: record.last_seen_at,
        }
    }
}

impl StoredRow {
    /// Rebuild the canonical record, recomputing its identity key.
    pub fn into_record(self) -> Result<CanonicalRecord> {
        let start_date = parse_column_date("StartDate", &self.start_date)?;
        let end_date = parse_column_date("EndDate", &self.end_date)?;
        let url = Some(self.url.trim().to_string()).filter(|u| !u.is_empty());
        let tags = self
            .tags
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();

        // A row edited by hand may carry LastSeenAt < DiscoveredAt.
        let last_seen_at = self.last_seen_at.max(self.discovered_at);

        Ok(CanonicalRecord {
            identity_key: identity_key(self.platform, url.as_deref(), &self.name, start_date),
            name: self.name,
            platform: self.platform,
            url,
            start_date,
            end_date,
            tags,
            discovered_at: self.discovered_at,
            last_seen_at,
        })
    }
}

fn parse_column_date(column: &str, value: &str) -> Result<Option<NaiveDate>> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map(Some)
        .map_err(|e| AppError::store_read(format!("bad {column} '{value}': {e}")))
}
