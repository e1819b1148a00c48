//! Runtime configuration.
//!
//! Values come from `WARENBUCHUNG_*` environment variables; anything unset
//! falls back to the defaults the mobile client shipped with.

use std::path::PathBuf;
use std::time::Duration;

use crate::api::normalize_api_url;
use crate::error::ConfigError;

pub const DEFAULT_API_URL: &str = "http://localhost:5232/api";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_CONNECTIVITY_TIMEOUT: Duration = Duration::from_secs(5);
/// Quiet period before a reference search is issued.
pub const DEFAULT_SEARCH_DEBOUNCE: Duration = Duration::from_millis(500);
pub const DEFAULT_LOCATION: &str = "Lager S03";

const APP_DIR_NAME: &str = "de.optimi.warenbuchung";

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub api_base_url: String,
    pub request_timeout: Duration,
    pub connectivity_timeout: Duration,
    pub search_debounce: Duration,
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub default_location: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        let data_dir = default_data_dir();
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            connectivity_timeout: DEFAULT_CONNECTIVITY_TIMEOUT,
            search_debounce: DEFAULT_SEARCH_DEBOUNCE,
            log_dir: data_dir.join("logs"),
            data_dir,
            default_location: DEFAULT_LOCATION.to_string(),
        }
    }
}

impl AppConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut config = AppConfig::default();

        if let Some(url) = get("WARENBUCHUNG_API_URL") {
            config.api_base_url = normalize_api_url(&url);
        }
        if let Some(raw) = get("WARENBUCHUNG_REQUEST_TIMEOUT_MS") {
            config.request_timeout = parse_millis("WARENBUCHUNG_REQUEST_TIMEOUT_MS", &raw)?;
        }
        if let Some(raw) = get("WARENBUCHUNG_CONNECTIVITY_TIMEOUT_MS") {
            config.connectivity_timeout =
                parse_millis("WARENBUCHUNG_CONNECTIVITY_TIMEOUT_MS", &raw)?;
        }
        if let Some(raw) = get("WARENBUCHUNG_SEARCH_DEBOUNCE_MS") {
            config.search_debounce = parse_millis("WARENBUCHUNG_SEARCH_DEBOUNCE_MS", &raw)?;
        }
        if let Some(dir) = get("WARENBUCHUNG_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
            config.log_dir = config.data_dir.join("logs");
        }
        if let Some(dir) = get("WARENBUCHUNG_LOG_DIR") {
            config.log_dir = PathBuf::from(dir);
        }
        if let Some(location) = get("WARENBUCHUNG_DEFAULT_LOCATION") {
            config.default_location = location;
        }

        Ok(config)
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(crate::db::DB_FILE_NAME)
    }
}

fn parse_millis(key: &'static str, raw: &str) -> Result<Duration, ConfigError> {
    raw.parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|_| ConfigError::InvalidValue {
            key,
            value: raw.to_string(),
        })
}

fn default_data_dir() -> PathBuf {
    let base = std::env::var("XDG_DATA_HOME")
        .or_else(|_| std::env::var("LOCALAPPDATA"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()))
                .join(".local")
                .join("share")
        });
    base.join(APP_DIR_NAME)
}
