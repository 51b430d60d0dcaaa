// src/utils/dates.rs

//! Parsing of the date strings listing sites print.
//!
//! Anything that cannot be pinned to a calendar day with a known year
//! yields `None`; callers treat that as "date absent".

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate};
use regex::Regex;

/// `Mar 01 - 15, 2025`, `Feb 28 - Mar 15, 2025`, `Dec 20, 2024 - Jan 05, 2025`
static MONTH_RANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?ix)^
        (?P<m1>[a-z]{3,9})\.?\s+(?P<d1>\d{1,2})(?:st|nd|rd|th)?(?:,?\s+(?P<y1>\d{4}))?
        \s*(?:-|–|—|to)\s*
        (?:(?P<m2>[a-z]{3,9})\.?\s+)?(?P<d2>\d{1,2})(?:st|nd|rd|th)?,?\s+(?P<y2>\d{4})
        $",
    )
    .expect("valid range regex")
});

/// `Jan 15, 2024`, `January 15th 2024`
static MONTH_DAY_YEAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^([a-z]{3,9})\.?\s+(\d{1,2})(?:st|nd|rd|th)?,?\s+(\d{4})$")
        .expect("valid date regex")
});

/// `15 Jan 2024`, `15th January, 2024`
static DAY_MONTH_YEAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(\d{1,2})(?:st|nd|rd|th)?\s+([a-z]{3,9})\.?,?\s+(\d{4})$")
        .expect("valid date regex")
});

/// Parse a single date in any of the supported shapes.
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = collapse(text);
    if text.is_empty() {
        return None;
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(&text) {
        return Some(ts.date_naive());
    }
    // ISO date with a trailing time part we don't care about
    if let Some(date) = text.get(..10).and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
    {
        return Some(date);
    }
    for format in ["%m/%d/%Y", "%Y/%m/%d", "%d.%m.%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(&text, format) {
            return Some(date);
        }
    }

    if let Some(caps) = MONTH_DAY_YEAR.captures(&text) {
        return ymd(&caps[3], month_number(&caps[1])?, &caps[2]);
    }
    if let Some(caps) = DAY_MONTH_YEAR.captures(&text) {
        return ymd(&caps[3], month_number(&caps[2])?, &caps[1]);
    }

    None
}

/// Parse either a date range or a single date.
///
/// Returns `(start, end)`; `end` is only set for ranges. A start without a
/// year borrows the end's year, stepping back one when the months wrap.
pub fn parse_date_range(text: &str) -> (Option<NaiveDate>, Option<NaiveDate>) {
    let text = collapse(text);

    if let Some(caps) = MONTH_RANGE.captures(&text) {
        let Some(m1) = month_number(&caps["m1"]) else {
            return (None, None);
        };
        let m2 = match caps.name("m2") {
            Some(m) => month_number(m.as_str()),
            None => Some(m1),
        };
        let Some(m2) = m2 else {
            return (None, None);
        };

        let end = ymd(&caps["y2"], m2, &caps["d2"]);
        let start = match caps.name("y1") {
            Some(y1) => ymd(y1.as_str(), m1, &caps["d1"]),
            None => {
                let year: i32 = caps["y2"].parse().ok().unwrap_or_default();
                let year = if m1 > m2 { year - 1 } else { year };
                ymd(&year.to_string(), m1, &caps["d1"])
            }
        };
        return (start, end);
    }

    // Two complete dates joined by a separator
    for sep in [" - ", " – ", " — ", " to "] {
        if let Some((a, b)) = text.split_once(sep) {
            if let (Some(start), Some(end)) = (parse_date(a), parse_date(b)) {
                return (Some(start), Some(end));
            }
        }
    }

    (parse_date(&text), None)
}

fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn ymd(year: &str, month: u32, day: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year.parse().ok()?, month, day.parse().ok()?)
}

fn month_number(name: &str) -> Option<u32> {
    let prefix = name.get(..3)?.to_ascii_lowercase();
    let month = match prefix.as_str() {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}
