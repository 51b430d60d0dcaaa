// src/pipeline/canonicalize.rs

//! Normalization of raw scraped items into canonical records.
//!
//! Everything here is pure: the same `RawItem` and timestamp always give
//! the same record, which is what keeps re-scrapes from looking new.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use crate::models::{CanonicalRecord, RawItem, identity_key};
use crate::utils::{dates, url};

/// Tag spellings folded into one canonical tag.
const TAG_SYNONYMS: &[(&str, &str)] = &[
    ("artificial intelligence", "ai"),
    ("a.i.", "ai"),
    ("ai/ml", "ai"),
    ("machine learning/ai", "ai"),
    ("machine learning", "ml"),
    ("web 3", "web3"),
    ("web3.0", "web3"),
    ("web 3.0", "web3"),
    ("blockchain & crypto", "blockchain"),
    ("crypto", "blockchain"),
    ("virtual", "online"),
    ("remote", "online"),
    ("digital only", "online"),
    ("in-person only", "in-person"),
    ("in person", "in-person"),
    ("mobile apps", "mobile"),
];

/// Turn one raw item into a canonical record sighted at `seen_at`.
///
/// Returns `None` only when the item has no usable name. Unparseable
/// dates and URLs are dropped rather than rejecting the item.
pub fn canonicalize(raw: &RawItem, seen_at: DateTime<Utc>) -> Option<CanonicalRecord> {
    let name = clean_name(&raw.name);
    if name.is_empty() {
        return None;
    }

    let url = raw.url.as_deref().and_then(url::normalize);

    let (start_date, range_end) = raw
        .start_date
        .as_deref()
        .map(dates::parse_date_range)
        .unwrap_or((None, None));
    let end_date = raw
        .end_date
        .as_deref()
        .and_then(dates::parse_date)
        .or(range_end)
        .filter(|end| start_date.is_none_or(|start| *end >= start));

    Some(CanonicalRecord {
        identity_key: identity_key(raw.platform, url.as_deref(), &name, start_date),
        name,
        platform: raw.platform,
        url,
        start_date,
        end_date,
        tags: normalize_tags(&raw.tags),
        discovered_at: seen_at,
        last_seen_at: seen_at,
    })
}

/// Trim and collapse internal whitespace of a display name.
pub fn clean_name(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalize a single tag, folding known synonyms.
pub fn normalize_tag(tag: &str) -> Option<String> {
    let tag = tag
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_matches(|c: char| c == '#' || c == ',' || c == ';')
        .to_lowercase();
    if tag.is_empty() {
        return None;
    }
    let folded = TAG_SYNONYMS
        .iter()
        .find(|(from, _)| *from == tag)
        .map(|(_, to)| (*to).to_string());
    Some(folded.unwrap_or(tag))
}

/// Normalize a tag list. Commas separate tags, here as in the stored table.
pub fn normalize_tags(tags: &[String]) -> BTreeSet<String> {
    tags.iter()
        .flat_map(|t| t.split(','))
        .filter_map(normalize_tag)
        .collect()
}
