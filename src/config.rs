//! Configuration and settings management
//!
//! Loads settings from config files and environment variables and defines
//! runtime constants.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Public Invidious instances used as fallback download sources.
pub const DEFAULT_INVIDIOUS_INSTANCES: &[&str] = &[
    "https://inv.tux.pizza",
    "https://invidious.projectsegfau.lt",
    "https://invidious.drgns.space",
    "https://yt.artemislena.eu",
    "https://invidious.flokinet.to",
];

/// Upper bound for results shown per search.
pub const MAX_SEARCH_RESULTS: usize = 5;

/// Default number of downloads allowed to run at once
pub const DEFAULT_MAX_CONCURRENT_DOWNLOADS: usize = 2;

/// Bot API upload ceiling for regular bots (50 MiB).
pub const TELEGRAM_UPLOAD_LIMIT: u64 = 50 * 1024 * 1024;

// Telegram API retry configuration
/// Initial backoff for Telegram API retries
pub const TELEGRAM_API_INITIAL_BACKOFF_MS: u64 = 500;
/// Maximum backoff for Telegram API retries
pub const TELEGRAM_API_MAX_BACKOFF_MS: u64 = 4000;
/// Retries after the first attempt for Telegram API operations (4 attempts in total)
pub const TELEGRAM_API_MAX_RETRIES: usize = 3;

/// Application settings loaded from config files and environment variables
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Telegram Bot API token
    pub telegram_bot_token: String,

    /// Directory for downloaded audio files
    #[serde(default = "default_downloads_dir")]
    pub downloads_dir: String,

    /// Path or name of the yt-dlp binary
    #[serde(default = "default_ytdlp_path")]
    pub ytdlp_path: String,

    /// Value passed to `--audio-quality`
    #[serde(default = "default_audio_quality")]
    pub audio_quality: String,

    /// Number of results per search
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,

    /// Comma-separated list of Invidious base URLs
    #[serde(rename = "invidious_instances")]
    pub invidious_instances_str: Option<String>,

    /// Largest file the bot will try to upload
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,

    /// Number of yt-dlp downloads allowed to run at once
    #[serde(default = "default_max_concurrent_downloads")]
    pub max_concurrent_downloads: usize,
}

fn default_downloads_dir() -> String {
    "downloads".to_string()
}

fn default_ytdlp_path() -> String {
    "yt-dlp".to_string()
}

fn default_audio_quality() -> String {
    "192K".to_string()
}

const fn default_search_limit() -> usize {
    MAX_SEARCH_RESULTS
}

const fn default_max_upload_bytes() -> u64 {
    TELEGRAM_UPLOAD_LIMIT
}

const fn default_max_concurrent_downloads() -> usize {
    DEFAULT_MAX_CONCURRENT_DOWNLOADS
}

/// Build the layered configuration source.
///
/// # Errors
///
/// Returns a `ConfigError` if a present config file cannot be parsed.
pub fn build_config() -> Result<Config, ConfigError> {
    let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

    Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
        // Local overrides, not checked into git
        .add_source(File::with_name("config/local").required(false))
        // Eg. `APP__SEARCH_LIMIT=3` sets `search_limit`
        .add_source(Environment::with_prefix("APP").separator("__"))
        // Plain UPPER_SNAKE_CASE variables map to snake_case keys; empty ones count as unset
        .add_source(Environment::default().ignore_empty(true))
        .build()
}

impl Settings {
    /// Create new settings by loading from environment and files
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use ytmusic_dl_bot::config::Settings;
    ///
    /// let settings = Settings::new().expect("Failed to load configuration");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails or the bot token is missing.
    pub fn new() -> Result<Self, ConfigError> {
        Self::from_config(build_config()?)
    }

    /// Deserialize and validate settings from an already built `Config`.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if a field is malformed or the bot token is empty.
    pub fn from_config(config: Config) -> Result<Self, ConfigError> {
        let settings: Self = config.try_deserialize()?;

        if settings.telegram_bot_token.trim().is_empty() {
            return Err(ConfigError::Message(
                "TELEGRAM_BOT_TOKEN must not be empty".to_string(),
            ));
        }

        Ok(settings)
    }

    /// Number of results to request per search, clamped to `1..=MAX_SEARCH_RESULTS`
    #[must_use]
    pub fn effective_search_limit(&self) -> usize {
        self.search_limit.clamp(1, MAX_SEARCH_RESULTS)
    }

    /// Concurrent download limit, at least one
    #[must_use]
    pub fn effective_max_concurrent_downloads(&self) -> usize {
        self.max_concurrent_downloads.max(1)
    }

    /// Invidious base URLs, falling back to the built-in list when unset
    #[must_use]
    pub fn invidious_instances(&self) -> Vec<String> {
        self.invidious_instances_str.as_ref().map_or_else(
            || {
                DEFAULT_INVIDIOUS_INSTANCES
                    .iter()
                    .map(ToString::to_string)
                    .collect()
            },
            |s| {
                s.split(|c: char| c == ',' || c == ';' || c.is_whitespace())
                    .filter(|token| !token.is_empty())
                    .map(|url| url.trim_end_matches('/').to_string())
                    .collect()
            },
        )
    }

    /// Directory for downloaded audio files
    #[must_use]
    pub fn downloads_path(&self) -> PathBuf {
        PathBuf::from(&self.downloads_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let mut builder = Config::builder();
        for (key, value) in pairs {
            builder = builder.set_override(*key, *value)?;
        }
        builder.build()
    }

    #[test]
    fn test_defaults_applied() -> Result<(), ConfigError> {
        let settings = Settings::from_config(config_with(&[("telegram_bot_token", "123:abc")])?)?;

        assert_eq!(settings.telegram_bot_token, "123:abc");
        assert_eq!(settings.downloads_dir, "downloads");
        assert_eq!(settings.ytdlp_path, "yt-dlp");
        assert_eq!(settings.audio_quality, "192K");
        assert_eq!(settings.effective_search_limit(), 5);
        assert_eq!(settings.max_upload_bytes, TELEGRAM_UPLOAD_LIMIT);
        assert_eq!(
            settings.effective_max_concurrent_downloads(),
            DEFAULT_MAX_CONCURRENT_DOWNLOADS
        );
        assert_eq!(
            settings.invidious_instances().len(),
            DEFAULT_INVIDIOUS_INSTANCES.len()
        );
        Ok(())
    }

    #[test]
    fn test_missing_token_is_error() -> Result<(), ConfigError> {
        let result = Settings::from_config(config_with(&[("downloads_dir", "/tmp/x")])?);
        assert!(result.is_err());
        Ok(())
    }

    #[test]
    fn test_empty_token_is_error() -> Result<(), ConfigError> {
        let result = Settings::from_config(config_with(&[("telegram_bot_token", "  ")])?);
        assert!(result.is_err());
        Ok(())
    }

    #[test]
    fn test_search_limit_clamped() -> Result<(), ConfigError> {
        let settings = Settings::from_config(config_with(&[
            ("telegram_bot_token", "t"),
            ("search_limit", "50"),
        ])?)?;
        assert_eq!(settings.effective_search_limit(), MAX_SEARCH_RESULTS);

        let settings = Settings::from_config(config_with(&[
            ("telegram_bot_token", "t"),
            ("search_limit", "0"),
        ])?)?;
        assert_eq!(settings.effective_search_limit(), 1);
        Ok(())
    }

    #[test]
    fn test_download_concurrency_never_zero() -> Result<(), ConfigError> {
        let settings = Settings::from_config(config_with(&[
            ("telegram_bot_token", "t"),
            ("max_concurrent_downloads", "0"),
        ])?)?;
        assert_eq!(settings.effective_max_concurrent_downloads(), 1);

        let settings = Settings::from_config(config_with(&[
            ("telegram_bot_token", "t"),
            ("max_concurrent_downloads", "4"),
        ])?)?;
        assert_eq!(settings.effective_max_concurrent_downloads(), 4);
        Ok(())
    }

    #[test]
    fn test_instance_list_parsing() -> Result<(), ConfigError> {
        let settings = Settings::from_config(config_with(&[
            ("telegram_bot_token", "t"),
            (
                "invidious_instances",
                "https://a.example/; https://b.example,https://c.example",
            ),
        ])?)?;

        assert_eq!(
            settings.invidious_instances(),
            vec![
                "https://a.example".to_string(),
                "https://b.example".to_string(),
                "https://c.example".to_string(),
            ]
        );
        Ok(())
    }
}
