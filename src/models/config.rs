//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::Platform;

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Scheduling and storage settings
    #[serde(default)]
    pub settings: Settings,

    /// Which sources are polled
    #[serde(default)]
    pub platforms: PlatformToggles,

    /// Inclusion criteria applied to every candidate
    #[serde(default)]
    pub filters: FilterConfig,

    /// HTTP and crawling behavior settings
    #[serde(default)]
    pub crawler: CrawlerConfig,

    /// Notification delivery settings
    #[serde(default)]
    pub notifications: NotificationConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Load configuration, writing the defaults first if the file is missing.
    pub fn load_or_init(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            let config = Self::default();
            config.save(path)?;
            log::info!("Created default configuration at {}", path.display());
            return Ok(config);
        }
        Self::load(path)
    }

    /// Write configuration as pretty TOML.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Set a single `section.key` value in the file at `path`.
    ///
    /// The value is read as a TOML literal (`true`, `12`, `["ai"]`) and
    /// falls back to a plain string. The edited file must still validate.
    pub fn set(path: impl AsRef<Path>, key: &str, value: &str) -> Result<Self> {
        let path = path.as_ref();
        let current = Self::load_or_init(path)?;

        let (section, field) = key
            .split_once('.')
            .ok_or_else(|| AppError::config(format!("Expected 'section.key', got '{key}'")))?;

        let known = toml::Value::try_from(Self::default())?;
        let is_known = known
            .get(section)
            .and_then(|s| s.as_table())
            .is_some_and(|s| s.contains_key(field));
        if !is_known {
            return Err(AppError::config(format!("Unknown config key '{key}'")));
        }

        let mut root = toml::Value::try_from(&current)?;
        root.get_mut(section)
            .and_then(|s| s.as_table_mut())
            .ok_or_else(|| AppError::config(format!("'{section}' is not a table")))?
            .insert(field.to_string(), parse_literal(value));

        let updated: Config = root.try_into()?;
        updated.validate()?;
        updated.save(path)?;
        Ok(updated)
    }

    /// Resolve the store file against the data directory.
    pub fn store_path(&self, data_dir: &Path) -> PathBuf {
        data_dir.join(&self.settings.store_file)
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.settings.interval_hours == 0 {
            return Err(AppError::validation("settings.interval_hours must be > 0"));
        }
        if self.settings.store_file.as_os_str().is_empty() {
            return Err(AppError::validation("settings.store_file is empty"));
        }
        if self.filters.min_days_notice > self.filters.max_days_advance {
            return Err(AppError::validation(
                "filters.min_days_notice must not exceed filters.max_days_advance",
            ));
        }
        if self.crawler.user_agent.trim().is_empty() {
            return Err(AppError::validation("crawler.user_agent is empty"));
        }
        if self.crawler.timeout_secs == 0 {
            return Err(AppError::validation("crawler.timeout_secs must be > 0"));
        }
        if self.crawler.max_attempts == 0 {
            return Err(AppError::validation("crawler.max_attempts must be > 0"));
        }
        if self.crawler.max_pages == 0 {
            return Err(AppError::validation("crawler.max_pages must be > 0"));
        }
        if self.crawler.max_concurrent == 0 {
            return Err(AppError::validation("crawler.max_concurrent must be > 0"));
        }
        if self.notifications.max_highlights == 0 {
            return Err(AppError::validation(
                "notifications.max_highlights must be > 0",
            ));
        }
        Ok(())
    }
}

fn parse_literal(value: &str) -> toml::Value {
    toml::from_str::<toml::Table>(&format!("v = {value}"))
        .ok()
        .and_then(|mut t| t.remove("v"))
        .unwrap_or_else(|| toml::Value::String(value.to_string()))
}

/// Scheduling and storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Hours between scheduled runs
    #[serde(default = "defaults::interval_hours")]
    pub interval_hours: u64,

    #[serde(default = "defaults::enabled")]
    pub notifications_enabled: bool,

    /// Store file, relative to the data directory
    #[serde(default = "defaults::store_file")]
    pub store_file: PathBuf,

    /// Send a heartbeat notification when a run finds nothing new
    #[serde(default)]
    pub notify_when_empty: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            interval_hours: defaults::interval_hours(),
            notifications_enabled: defaults::enabled(),
            store_file: defaults::store_file(),
            notify_when_empty: false,
        }
    }
}

/// Per-platform on/off switches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformToggles {
    #[serde(default = "defaults::enabled")]
    pub devpost: bool,
    #[serde(default = "defaults::enabled")]
    pub mlh: bool,
    #[serde(default = "defaults::enabled")]
    pub unstop: bool,
}

impl PlatformToggles {
    pub fn is_enabled(&self, platform: Platform) -> bool {
        match platform {
            Platform::Devpost => self.devpost,
            Platform::Mlh => self.mlh,
            Platform::Unstop => self.unstop,
        }
    }

    pub fn enabled(&self) -> Vec<Platform> {
        Platform::ALL
            .into_iter()
            .filter(|p| self.is_enabled(*p))
            .collect()
    }
}

impl Default for PlatformToggles {
    fn default() -> Self {
        Self {
            devpost: true,
            mlh: true,
            unstop: true,
        }
    }
}

/// What to do with records whose start date is unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingDatePolicy {
    /// Undated records skip the date window and may still pass.
    #[default]
    Include,
    /// Undated records never pass.
    Exclude,
}

/// Declarative inclusion criteria.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Empty means no keyword filtering
    #[serde(default)]
    pub keywords: Vec<String>,

    #[serde(default = "defaults::min_days_notice")]
    pub min_days_notice: i64,

    #[serde(default = "defaults::max_days_advance")]
    pub max_days_advance: i64,

    #[serde(default)]
    pub missing_start_date: MissingDatePolicy,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            keywords: Vec::new(),
            min_days_notice: defaults::min_days_notice(),
            max_days_advance: defaults::max_days_advance(),
            missing_start_date: MissingDatePolicy::default(),
        }
    }
}

/// HTTP client and crawling behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Timeout for a single request attempt, in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Attempts per request before the adapter gives up
    #[serde(default = "defaults::max_attempts")]
    pub max_attempts: u32,

    /// First backoff delay; doubles on each retry
    #[serde(default = "defaults::retry_base_delay")]
    pub retry_base_delay_ms: u64,

    #[serde(default = "defaults::retry_max_delay")]
    pub retry_max_delay_ms: u64,

    /// Listing pages fetched per platform
    #[serde(default = "defaults::max_pages")]
    pub max_pages: usize,

    /// Adapters fetched in parallel
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,

    /// Delay between page requests in milliseconds
    #[serde(default = "defaults::request_delay")]
    pub request_delay_ms: u64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            max_attempts: defaults::max_attempts(),
            retry_base_delay_ms: defaults::retry_base_delay(),
            retry_max_delay_ms: defaults::retry_max_delay(),
            max_pages: defaults::max_pages(),
            max_concurrent: defaults::max_concurrent(),
            request_delay_ms: defaults::request_delay(),
        }
    }
}

/// Where summaries are delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifyChannel {
    #[default]
    Log,
    Desktop,
}

/// Notification delivery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    #[serde(default)]
    pub channel: NotifyChannel,

    /// Names listed in the summary body
    #[serde(default = "defaults::max_highlights")]
    pub max_highlights: usize,

    /// Backoff before the single retry
    #[serde(default = "defaults::notify_retry_delay")]
    pub retry_delay_ms: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            channel: NotifyChannel::default(),
            max_highlights: defaults::max_highlights(),
            retry_delay_ms: defaults::notify_retry_delay(),
        }
    }
}

mod defaults {
    use std::path::PathBuf;

    pub fn interval_hours() -> u64 {
        6
    }
    pub fn enabled() -> bool {
        true
    }
    pub fn store_file() -> PathBuf {
        PathBuf::from("hackathons.json")
    }

    // Filter defaults
    pub fn min_days_notice() -> i64 {
        1
    }
    pub fn max_days_advance() -> i64 {
        90
    }

    // Crawler defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; hackathon-monitor/0.1)".into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn max_attempts() -> u32 {
        3
    }
    pub fn retry_base_delay() -> u64 {
        500
    }
    pub fn retry_max_delay() -> u64 {
        8_000
    }
    pub fn max_pages() -> usize {
        5
    }
    pub fn max_concurrent() -> usize {
        3
    }
    pub fn request_delay() -> u64 {
        0
    }

    // Notification defaults
    pub fn max_highlights() -> usize {
        3
    }
    pub fn notify_retry_delay() -> u64 {
        2_000
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.settings.interval_hours, 6);
        assert_eq!(config.filters.min_days_notice, 1);
        assert_eq!(config.filters.max_days_advance, 90);
        assert!(config.filters.keywords.is_empty());
        assert_eq!(config.platforms.enabled(), Platform::ALL.to_vec());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [platforms]
            mlh = false

            [filters]
            keywords = ["AI", "web3"]
            missing_start_date = "exclude"
            "#,
        )
        .unwrap();

        assert!(config.platforms.devpost);
        assert!(!config.platforms.mlh);
        assert_eq!(config.filters.keywords, vec!["AI", "web3"]);
        assert_eq!(config.filters.missing_start_date, MissingDatePolicy::Exclude);
        assert_eq!(config.crawler.max_attempts, 3);
        assert_eq!(config.platforms.enabled(), vec![Platform::Devpost, Platform::Unstop]);
    }

    #[test]
    fn test_validate_rejects_inverted_window() {
        let mut config = Config::default();
        config.filters.min_days_notice = 30;
        config.filters.max_days_advance = 7;
        assert!(matches!(config.validate(), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let mut config = Config::default();
        config.settings.interval_hours = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_or_init_writes_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("config.toml");

        let config = Config::load_or_init(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.settings.interval_hours, 6);

        let reloaded = Config::load(&path).unwrap();
        assert_eq!(reloaded.crawler.user_agent, config.crawler.user_agent);
    }

    #[test]
    fn test_load_or_default_survives_broken_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        fs::write(&path, "[settings\ninterval_hours = ").unwrap();

        let config = Config::load_or_default(&path);
        assert_eq!(config.settings.interval_hours, 6);
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn test_set_parses_literals_and_strings() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");

        Config::set(&path, "settings.interval_hours", "12").unwrap();
        Config::set(&path, "platforms.unstop", "false").unwrap();
        Config::set(&path, "filters.keywords", r#"["ai", "ml"]"#).unwrap();
        let config = Config::set(&path, "crawler.user_agent", "my-bot/1.0").unwrap();

        assert_eq!(config.settings.interval_hours, 12);
        assert!(!config.platforms.unstop);
        assert_eq!(config.filters.keywords, vec!["ai", "ml"]);
        assert_eq!(config.crawler.user_agent, "my-bot/1.0");

        let reloaded = Config::load(&path).unwrap();
        assert_eq!(reloaded.settings.interval_hours, 12);
    }

    #[test]
    fn test_set_rejects_unknown_and_invalid() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");

        assert!(Config::set(&path, "settings.colour", "blue").is_err());
        assert!(Config::set(&path, "interval_hours", "3").is_err());
        assert!(Config::set(&path, "settings.interval_hours", "0").is_err());

        // Rejected edits leave the file untouched
        let config = Config::load(&path).unwrap();
        assert_eq!(config.settings.interval_hours, 6);
    }
}
