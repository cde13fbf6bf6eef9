//! # Configuration
//!
//! Centralizes all settings with a clear override hierarchy:
//! defaults → config file → env vars → CLI flags.
//!
//! Config lives at `~/.ridekit/config.toml`. If missing on first run, a
//! commented-out default is generated so users can discover all options.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

// ============================================================================
// Config Structs (all fields Option<T> for sparse TOML)
// ============================================================================

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct RideKitConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub driver: DriverConfig,
    #[serde(default)]
    pub realtime: RealtimeConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ApiConfig {
    pub base_url: Option<String>,
    pub stream_url: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct DriverConfig {
    pub request_countdown_secs: Option<u32>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct RealtimeConfig {
    pub pending_action_ttl_secs: Option<u64>,
    pub reconnect_base_ms: Option<u64>,
    pub reconnect_max_ms: Option<u64>,
    pub max_reconnect_attempts: Option<u32>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct StorageConfig {
    pub credentials_file: Option<String>,
}

// ============================================================================
// Defaults
// ============================================================================

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:3000/api";
pub const DEFAULT_TIMEOUT_SECS: u64 = 15;
pub const DEFAULT_REQUEST_COUNTDOWN_SECS: u32 = crate::core::driver::DEFAULT_REQUEST_COUNTDOWN_SECS;
pub const DEFAULT_PENDING_ACTION_TTL_SECS: u64 = 5 * 60;
pub const DEFAULT_RECONNECT_BASE_MS: u64 = 500;
pub const DEFAULT_RECONNECT_MAX_MS: u64 = 10_000;
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 8;

// ============================================================================
// Resolved Config (concrete values, no Options)
// ============================================================================

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub api_base_url: String,
    pub stream_url: String,
    pub timeout: Duration,
    pub request_countdown_secs: u32,
    pub pending_action_ttl: Duration,
    pub reconnect_base: Duration,
    pub reconnect_max: Duration,
    pub max_reconnect_attempts: u32,
    pub credentials_file: Option<PathBuf>,
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "config I/O error: {e}"),
            ConfigError::Parse(e) => write!(f, "config parse error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

// ============================================================================
// Loading
// ============================================================================

/// Returns `~/.ridekit/`.
pub fn config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".ridekit"))
}

/// Returns the path to `~/.ridekit/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}

/// Load config from `~/.ridekit/config.toml`.
///
/// If the file doesn't exist, generates a commented-out default and
/// returns `RideKitConfig::default()`. If it exists but is malformed,
/// returns `ConfigError::Parse`.
pub fn load_config() -> Result<RideKitConfig, ConfigError> {
    let path = match config_path() {
        Some(p) => p,
        None => {
            warn!("Could not determine home directory, using default config");
            return Ok(RideKitConfig::default());
        }
    };
    load_config_from(&path)
}

pub fn load_config_from(path: &Path) -> Result<RideKitConfig, ConfigError> {
    if !path.exists() {
        info!("No config file found, generating default at {}", path.display());
        generate_default_config(path);
        return Ok(RideKitConfig::default());
    }

    let contents = fs::read_to_string(path).map_err(ConfigError::Io)?;
    let config: RideKitConfig = toml::from_str(&contents).map_err(ConfigError::Parse)?;
    info!("Loaded config from {}", path.display());
    debug!("Config: {:?}", config);
    Ok(config)
}

/// Generates a commented-out default config file at the given path.
fn generate_default_config(path: &Path) {
    let default_content = r#"# ridekit configuration
# All settings are optional; defaults are used for anything not specified.
# Override hierarchy: defaults → this file → env vars → CLI flags.

# [api]
# base_url = "http://localhost:3000/api"   # Or set RIDEKIT_API_URL
# stream_url = "http://localhost:3000/api/stream"   # Or set RIDEKIT_STREAM_URL
# timeout_secs = 15

# [driver]
# request_countdown_secs = 30

# [realtime]
# pending_action_ttl_secs = 300      # Queued cancel/refresh older than this are dropped
# reconnect_base_ms = 500
# reconnect_max_ms = 10000
# max_reconnect_attempts = 8

# [storage]
# credentials_file = "~/.ridekit/credentials.json"   # Or set RIDEKIT_CREDENTIALS
"#;

    if let Some(parent) = path.parent()
        && let Err(e) = fs::create_dir_all(parent)
    {
        warn!("Failed to create config directory: {}", e);
        return;
    }
    if let Err(e) = fs::write(path, default_content) {
        warn!("Failed to write default config: {}", e);
    }
}

// ============================================================================
// Resolution
// ============================================================================

/// Resolve the final config by collapsing: defaults → config file → env vars → CLI.
///
/// `cli_api_url` comes from the `--api-url` flag (None = not specified).
pub fn resolve(config: &RideKitConfig, cli_api_url: Option<&str>) -> ResolvedConfig {
    // Base URL: CLI → env → config → default
    let api_base_url = cli_api_url
        .map(|s| s.to_string())
        .or_else(|| std::env::var("RIDEKIT_API_URL").ok())
        .or_else(|| config.api.base_url.clone())
        .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string())
        .trim_end_matches('/')
        .to_string();

    // Stream URL: env → config → derived from base
    let stream_url = std::env::var("RIDEKIT_STREAM_URL")
        .ok()
        .or_else(|| config.api.stream_url.clone())
        .map(|s| s.trim_end_matches('/').to_string())
        .unwrap_or_else(|| format!("{api_base_url}/stream"));

    // Credentials file: env → config (with ~ expansion) → default location
    let credentials_file = std::env::var("RIDEKIT_CREDENTIALS")
        .ok()
        .or_else(|| config.storage.credentials_file.clone())
        .map(|s| expand_home(&s))
        .or_else(|| config_dir().map(|d| d.join("credentials.json")));

    ResolvedConfig {
        api_base_url,
        stream_url,
        timeout: Duration::from_secs(config.api.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
        request_countdown_secs: config
            .driver
            .request_countdown_secs
            .unwrap_or(DEFAULT_REQUEST_COUNTDOWN_SECS)
            .max(1),
        pending_action_ttl: Duration::from_secs(
            config
                .realtime
                .pending_action_ttl_secs
                .unwrap_or(DEFAULT_PENDING_ACTION_TTL_SECS),
        ),
        reconnect_base: Duration::from_millis(
            config.realtime.reconnect_base_ms.unwrap_or(DEFAULT_RECONNECT_BASE_MS),
        ),
        reconnect_max: Duration::from_millis(
            config.realtime.reconnect_max_ms.unwrap_or(DEFAULT_RECONNECT_MAX_MS),
        ),
        max_reconnect_attempts: config
            .realtime
            .max_reconnect_attempts
            .unwrap_or(DEFAULT_MAX_RECONNECT_ATTEMPTS),
        credentials_file,
    }
}

fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_uses_defaults_when_empty() {
        let config = RideKitConfig::default();
        let resolved = resolve(&config, Some(DEFAULT_API_BASE_URL));
        assert_eq!(resolved.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(resolved.timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        assert_eq!(resolved.request_countdown_secs, 30);
        assert_eq!(resolved.pending_action_ttl, Duration::from_secs(300));
        assert_eq!(resolved.max_reconnect_attempts, DEFAULT_MAX_RECONNECT_ATTEMPTS);
    }

    #[test]
    fn test_resolve_config_values_override_defaults() {
        let config = RideKitConfig {
            api: ApiConfig {
                base_url: Some("https://rides.example.com/api/".to_string()),
                stream_url: None,
                timeout_secs: Some(5),
            },
            driver: DriverConfig {
                request_countdown_secs: Some(20),
            },
            realtime: RealtimeConfig {
                pending_action_ttl_secs: Some(60),
                ..Default::default()
            },
            ..Default::default()
        };
        let resolved = resolve(&config, None);
        if std::env::var("RIDEKIT_API_URL").is_err() {
            assert_eq!(resolved.api_base_url, "https://rides.example.com/api");
        }
        assert_eq!(resolved.timeout, Duration::from_secs(5));
        assert_eq!(resolved.request_countdown_secs, 20);
        assert_eq!(resolved.pending_action_ttl, Duration::from_secs(60));
    }

    #[test]
    fn test_resolve_raises_zero_countdown() {
        let config = RideKitConfig {
            driver: DriverConfig {
                request_countdown_secs: Some(0),
            },
            ..Default::default()
        };
        let resolved = resolve(&config, Some(DEFAULT_API_BASE_URL));
        assert_eq!(resolved.request_countdown_secs, 1);
    }

    #[test]
    fn test_resolve_cli_url_wins_and_derives_stream() {
        let config = RideKitConfig {
            api: ApiConfig {
                base_url: Some("https://config.example.com".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let resolved = resolve(&config, Some("http://127.0.0.1:9000"));
        assert_eq!(resolved.api_base_url, "http://127.0.0.1:9000");
        if std::env::var("RIDEKIT_STREAM_URL").is_err() {
            assert_eq!(resolved.stream_url, "http://127.0.0.1:9000/stream");
        }
    }

    #[test]
    fn test_toml_round_trip() {
        let toml_str = r#"
[api]
base_url = "https://rides.example.com/api"
stream_url = "https://stream.example.com"
timeout_secs = 10

[driver]
request_countdown_secs = 45

[realtime]
pending_action_ttl_secs = 120
max_reconnect_attempts = 3

[storage]
credentials_file = "/tmp/creds.json"
"#;
        let config: RideKitConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.api.base_url.as_deref(), Some("https://rides.example.com/api"));
        assert_eq!(config.api.timeout_secs, Some(10));
        assert_eq!(config.driver.request_countdown_secs, Some(45));
        assert_eq!(config.realtime.max_reconnect_attempts, Some(3));
        assert_eq!(config.realtime.reconnect_base_ms, None);
        assert_eq!(config.storage.credentials_file.as_deref(), Some("/tmp/creds.json"));
    }

    #[test]
    fn test_sparse_toml_parses() {
        let toml_str = r#"
[driver]
request_countdown_secs = 10
"#;
        let config: RideKitConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.driver.request_countdown_secs, Some(10));
        assert!(config.api.base_url.is_none());
        assert!(config.storage.credentials_file.is_none());
    }

    #[test]
    fn test_missing_file_generates_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ridekit").join("config.toml");
        let config = load_config_from(&path).unwrap();
        assert!(config.api.base_url.is_none());
        let written = fs::read_to_string(&path).unwrap();
        assert!(written.contains("# [api]"));
        // The generated file is all comments and parses back to defaults
        assert!(load_config_from(&path).unwrap().driver.request_countdown_secs.is_none());
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[api\nbase_url = ").unwrap();
        assert!(matches!(load_config_from(&path), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_expand_home() {
        assert_eq!(expand_home("/abs/path"), PathBuf::from("/abs/path"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home("~/x.json"), home.join("x.json"));
        }
    }
}
