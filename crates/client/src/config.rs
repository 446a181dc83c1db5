//! Client configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! All optional:
//! - `KAPTAZE_API_BASE_URL` - REST API base (default: production backend)
//! - `KAPTAZE_PUSH_URL` - Push channel endpoint (default: the API base URL)
//! - `KAPTAZE_STORAGE_PATH` - Device storage file (default: `.kaptaze/storage.json`)
//! - `KAPTAZE_REQUEST_TIMEOUT_SECS` - HTTP timeout in seconds (default: 30)
//! - `KAPTAZE_CATALOG_CACHE_TTL_SECS` - Restaurant catalog cache TTL (default: 300)
//! - `KAPTAZE_PURGE_ON_LOGOUT` - Delete the user's collections on logout (default: true)
//! - `KAPTAZE_LOG_FORMAT` - `pretty` or `json` (default: pretty)

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::store::StoreOptions;

/// Production backend.
pub const DEFAULT_API_BASE_URL: &str = "https://kaptaze-backend-api.onrender.com";

const DEFAULT_STORAGE_PATH: &str = ".kaptaze/storage.json";
const DEFAULT_TIMEOUT_SECS: &str = "30";
const DEFAULT_CACHE_TTL_SECS: &str = "300";

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Full client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Backend REST API settings
    pub api: ApiConfig,
    /// Push channel endpoint
    pub push_url: Url,
    /// Device storage file
    pub storage_path: PathBuf,
    /// Store behavior
    pub store: StoreOptions,
    /// Log output
    pub log: LogConfig,
}

/// Backend REST API settings.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: Url,
    /// Bound on every HTTP request, connect included
    pub timeout: Duration,
    /// How long restaurant catalog reads are cached
    pub catalog_cache_ttl: Duration,
}

/// Log output settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogConfig {
    pub format: LogFormat,
}

/// Log line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is set but cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_lookup(get_optional_env)
    }

    /// Build configuration from an arbitrary variable source.
    ///
    /// `lookup` returns `None` for unset variables; defaults apply to those.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is set but cannot be parsed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let get_or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let base_url = parse_url(
            "KAPTAZE_API_BASE_URL",
            &get_or("KAPTAZE_API_BASE_URL", DEFAULT_API_BASE_URL),
        )?;
        let push_url = match get("KAPTAZE_PUSH_URL") {
            Some(raw) => parse_url("KAPTAZE_PUSH_URL", &raw)?,
            None => base_url.clone(),
        };

        let api = ApiConfig {
            base_url,
            timeout: parse_secs(
                "KAPTAZE_REQUEST_TIMEOUT_SECS",
                &get_or("KAPTAZE_REQUEST_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS),
            )?,
            catalog_cache_ttl: parse_secs(
                "KAPTAZE_CATALOG_CACHE_TTL_SECS",
                &get_or("KAPTAZE_CATALOG_CACHE_TTL_SECS", DEFAULT_CACHE_TTL_SECS),
            )?,
        };

        let store = StoreOptions {
            purge_partition_on_logout: parse_bool(
                "KAPTAZE_PURGE_ON_LOGOUT",
                &get_or("KAPTAZE_PURGE_ON_LOGOUT", "true"),
            )?,
        };

        let format = get_or("KAPTAZE_LOG_FORMAT", "pretty")
            .parse::<LogFormat>()
            .map_err(|e| ConfigError::InvalidEnvVar("KAPTAZE_LOG_FORMAT".to_string(), e))?;

        Ok(Self {
            api,
            push_url,
            storage_path: PathBuf::from(get_or("KAPTAZE_STORAGE_PATH", DEFAULT_STORAGE_PATH)),
            store,
            log: LogConfig { format },
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn parse_url(key: &str, raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw.trim())
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https" | "ws" | "wss") {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            format!("unsupported scheme '{}'", url.scheme()),
        ));
    }
    Ok(url)
}

fn parse_secs(key: &str, raw: &str) -> Result<Duration, ConfigError> {
    let secs = raw
        .trim()
        .parse::<u64>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;
    if secs == 0 {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            "must be greater than zero".to_string(),
        ));
    }
    Ok(Duration::from_secs(secs))
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            format!("expected a boolean, got '{other}'"),
        )),
    }
}
