// src/models/platform.rs

//! Known listing sources.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// A source site hackathons are collected from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Platform {
    Devpost,
    #[serde(rename = "MLH")]
    Mlh,
    Unstop,
}

impl Platform {
    /// All platforms in their canonical display order.
    pub const ALL: [Platform; 3] = [Platform::Devpost, Platform::Mlh, Platform::Unstop];

    /// Display name, also used in the persisted `Platform` column.
    pub fn name(&self) -> &'static str {
        match self {
            Platform::Devpost => "Devpost",
            Platform::Mlh => "MLH",
            Platform::Unstop => "Unstop",
        }
    }

    /// Key used in the `[platforms]` config table.
    pub fn config_key(&self) -> &'static str {
        match self {
            Platform::Devpost => "devpost",
            Platform::Mlh => "mlh",
            Platform::Unstop => "unstop",
        }
    }

    /// Public site root adapters fetch from by default.
    pub fn default_base_url(&self) -> &'static str {
        match self {
            Platform::Devpost => "https://devpost.com",
            Platform::Mlh => "https://mlh.io",
            Platform::Unstop => "https://unstop.com",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Platform {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "devpost" => Ok(Platform::Devpost),
            "mlh" => Ok(Platform::Mlh),
            "unstop" => Ok(Platform::Unstop),
            other => Err(AppError::validation(format!("Unknown platform '{other}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("MLH".parse::<Platform>().unwrap(), Platform::Mlh);
        assert_eq!(" devpost ".parse::<Platform>().unwrap(), Platform::Devpost);
        assert!("eventbrite".parse::<Platform>().is_err());
    }

    #[test]
    fn test_serde_uses_display_names() {
        let json = serde_json::to_string(&Platform::Mlh).unwrap();
        assert_eq!(json, "\"MLH\"");
        let back: Platform = serde_json::from_str("\"Unstop\"").unwrap();
        assert_eq!(back, Platform::Unstop);
    }
}
