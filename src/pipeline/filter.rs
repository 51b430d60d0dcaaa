// src/pipeline/filter.rs

//! User inclusion criteria applied to canonical candidates.

use chrono::NaiveDate;

use crate::models::{CanonicalRecord, FilterConfig, MissingDatePolicy, PlatformToggles};

/// Why a candidate was filtered out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    PlatformDisabled,
    NoKeywordMatch,
    MissingStartDate,
    TooSoon,
    TooFarAhead,
}

/// Evaluates candidates against the configured criteria.
#[derive(Debug, Clone)]
pub struct FilterEngine {
    keywords: Vec<String>,
    min_days_notice: i64,
    max_days_advance: i64,
    missing_start_date: MissingDatePolicy,
    platforms: PlatformToggles,
}

impl FilterEngine {
    pub fn new(filters: &FilterConfig, platforms: &PlatformToggles) -> Self {
        Self {
            keywords: filters
                .keywords
                .iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
            min_days_notice: filters.min_days_notice,
            max_days_advance: filters.max_days_advance,
            missing_start_date: filters.missing_start_date,
            platforms: platforms.clone(),
        }
    }

    /// Whether `record` should reach the store, judged on day `today`.
    pub fn passes(&self, record: &CanonicalRecord, today: NaiveDate) -> bool {
        self.evaluate(record, today).is_ok()
    }

    /// Like [`passes`](Self::passes) but says which criterion failed first.
    pub fn evaluate(
        &self,
        record: &CanonicalRecord,
        today: NaiveDate,
    ) -> Result<(), Rejection> {
        if !self.platforms.is_enabled(record.platform) {
            return Err(Rejection::PlatformDisabled);
        }
        if !self.matches_keywords(record) {
            return Err(Rejection::NoKeywordMatch);
        }

        match record.days_until_start(today) {
            None => match self.missing_start_date {
                MissingDatePolicy::Include => Ok(()),
                MissingDatePolicy::Exclude => Err(Rejection::MissingStartDate),
            },
            Some(days) if days < self.min_days_notice => Err(Rejection::TooSoon),
            Some(days) if days > self.max_days_advance => Err(Rejection::TooFarAhead),
            Some(_) => Ok(()),
        }
    }

    fn matches_keywords(&self, record: &CanonicalRecord) -> bool {
        if self.keywords.is_empty() {
            return true;
        }
        let name = record.name.to_lowercase();
        self.keywords.iter().any(|keyword| {
            name.contains(keyword.as_str()) || record.tags.iter().any(|t| t.contains(keyword.as_str()))
        })
    }
}
