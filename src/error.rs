// src/error.rs

//! Unified error handling for the hackathon monitor.

use std::fmt;

use thiserror::Error;

use crate::models::Platform;

/// Result type alias for monitor operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization failed
    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// CSS selector parsing failed
    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Network or parse failure for one source
    #[error("Fetch error for {platform}: {message}")]
    Fetch { platform: Platform, message: String },

    /// The persisted store could not be read
    #[error("Store read error: {0}")]
    StoreRead(String),

    /// The merged store could not be written
    #[error("Store write error: {0}")]
    StoreWrite(String),

    /// Notification delivery failed
    #[error("Notification error: {0}")]
    Notification(String),

    /// Work was stopped by a cancellation request
    #[error("Operation cancelled")]
    Cancelled,
}

impl AppError {
    /// Create a selector parsing error.
    pub fn selector(selector: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Selector {
            selector: selector.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a fetch error for a platform.
    pub fn fetch(platform: Platform, message: impl fmt::Display) -> Self {
        Self::Fetch {
            platform,
            message: message.to_string(),
        }
    }

    pub fn store_read(message: impl fmt::Display) -> Self {
        Self::StoreRead(message.to_string())
    }

    pub fn store_write(message: impl fmt::Display) -> Self {
        Self::StoreWrite(message.to_string())
    }

    pub fn notification(message: impl fmt::Display) -> Self {
        Self::Notification(message.to_string())
    }

    /// Whether a retry has a chance of succeeding.
    ///
    /// Timeouts, connection failures, HTTP 5xx and HTTP 429 are transient;
    /// everything else (4xx, parse failures, bad config) is permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => {
                if e.is_timeout() || e.is_connect() {
                    return true;
                }
                e.status()
                    .map(|s| s.is_server_error() || s.as_u16() == 429)
                    .unwrap_or(false)
            }
            _ => false,
        }
    }

    /// Whether this error aborts a run rather than being folded into its report.
    pub fn is_store_error(&self) -> bool {
        matches!(self, Self::StoreRead(_) | Self::StoreWrite(_))
    }
}
