//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::utils::window::ActiveWindow;

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// HTTP and fetching behavior settings
    #[serde(default)]
    pub crawler: CrawlerConfig,

    /// Archive dispatch settings
    #[serde(default)]
    pub archive: ArchiveConfig,

    /// Local time window in which cycles may run
    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// Store location
    #[serde(default)]
    pub storage: StorageConfig,
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

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.crawler.user_agent.trim().is_empty() {
            return Err(AppError::validation("crawler.user_agent is empty"));
        }
        if self.crawler.timeout_secs == 0 {
            return Err(AppError::validation("crawler.timeout_secs must be > 0"));
        }
        if self.crawler.max_concurrent == 0 {
            return Err(AppError::validation("crawler.max_concurrent must be > 0"));
        }
        if self.archive.max_attempts == 0 {
            return Err(AppError::validation("archive.max_attempts must be > 0"));
        }
        if self.archive.status_timeout_secs == 0 {
            return Err(AppError::validation(
                "archive.status_timeout_secs must be > 0",
            ));
        }
        if self.archive.capture_timeout_secs == 0 {
            return Err(AppError::validation(
                "archive.capture_timeout_secs must be > 0",
            ));
        }
        url::Url::parse(&self.archive.save_endpoint).map_err(|e| {
            AppError::validation(format!(
                "archive.save_endpoint '{}' is not a URL: {e}",
                self.archive.save_endpoint
            ))
        })?;
        if !(-12..=14).contains(&self.schedule.utc_offset_hours) {
            return Err(AppError::validation(
                "schedule.utc_offset_hours must be within -12..=14",
            ));
        }
        self.schedule.window()?;
        if self.storage.root.as_os_str().is_empty() {
            return Err(AppError::validation("storage.root is empty"));
        }
        Ok(())
    }
}

/// HTTP client and fetching behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// Fallback User-Agent when the store pool is empty
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Maximum targets evaluated at once
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            max_concurrent: defaults::max_concurrent(),
        }
    }
}

/// Archive dispatcher settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Minimum seconds between the starts of two capture attempts
    #[serde(default = "defaults::min_interval")]
    pub min_interval_secs: u64,

    /// Attempts per request before it is dropped
    #[serde(default = "defaults::max_attempts")]
    pub max_attempts: u32,

    /// Timeout of the HEAD check before capture
    #[serde(default = "defaults::status_timeout")]
    pub status_timeout_secs: u64,

    /// Timeout of one Save Page Now capture request
    #[serde(default = "defaults::capture_timeout")]
    pub capture_timeout_secs: u64,

    /// Save Page Now endpoint; the page URL is appended
    #[serde(default = "defaults::save_endpoint")]
    pub save_endpoint: String,
}

impl ArchiveConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_secs(self.min_interval_secs)
    }
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            min_interval_secs: defaults::min_interval(),
            max_attempts: defaults::max_attempts(),
            status_timeout_secs: defaults::status_timeout(),
            capture_timeout_secs: defaults::capture_timeout(),
            save_endpoint: defaults::save_endpoint(),
        }
    }
}

/// Local time window gating.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Skip cycles outside the window unless forced
    #[serde(default = "defaults::schedule_enabled")]
    pub enabled: bool,

    /// Offset of the local zone from UTC
    #[serde(default = "defaults::utc_offset_hours")]
    pub utc_offset_hours: i32,

    /// Window start, `HH:MM`
    #[serde(default = "defaults::window_start")]
    pub start: String,

    /// Window end (inclusive), `HH:MM`
    #[serde(default = "defaults::window_end")]
    pub end: String,
}

impl ScheduleConfig {
    /// Parse the configured window.
    pub fn window(&self) -> Result<ActiveWindow> {
        ActiveWindow::parse(self.utc_offset_hours, &self.start, &self.end)
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: defaults::schedule_enabled(),
            utc_offset_hours: defaults::utc_offset_hours(),
            start: defaults::window_start(),
            end: defaults::window_end(),
        }
    }
}

/// Store location settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the JSON tables
    #[serde(default = "defaults::storage_root")]
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: defaults::storage_root(),
        }
    }
}

mod defaults {
    use std::path::PathBuf;

    // Crawler defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; webwatch/0.1)".into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn max_concurrent() -> usize {
        5
    }

    // Archive defaults
    pub fn min_interval() -> u64 {
        20
    }
    pub fn max_attempts() -> u32 {
        3
    }
    pub fn status_timeout() -> u64 {
        10
    }
    pub fn capture_timeout() -> u64 {
        120
    }
    pub fn save_endpoint() -> String {
        "https://web.archive.org/save/".into()
    }

    // Schedule defaults (07:00-19:00 JST)
    pub fn schedule_enabled() -> bool {
        true
    }
    pub fn utc_offset_hours() -> i32 {
        9
    }
    pub fn window_start() -> String {
        "07:00".into()
    }
    pub fn window_end() -> String {
        "19:00".into()
    }

    pub fn storage_root() -> PathBuf {
        PathBuf::from("storage")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_default_config_ok() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_user_agent() {
        let mut config = Config::default();
        config.crawler.user_agent = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_concurrency() {
        let mut config = Config::default();
        config.crawler.max_concurrent = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_capture_timeout() {
        let mut config = Config::default();
        config.archive.capture_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_bad_window() {
        let mut config = Config::default();
        config.schedule.start = "7 o'clock".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [archive]
            min_interval_secs = 30

            [storage]
            root = "/var/lib/webwatch"
            "#,
        )
        .unwrap();

        assert_eq!(config.archive.min_interval(), Duration::from_secs(30));
        assert_eq!(config.archive.max_attempts, 3);
        assert_eq!(config.archive.capture_timeout_secs, 120);
        assert_eq!(config.crawler.max_concurrent, 5);
        assert_eq!(config.schedule.utc_offset_hours, 9);
        assert_eq!(config.storage.root, PathBuf::from("/var/lib/webwatch"));
    }
}
