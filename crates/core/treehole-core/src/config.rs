//! Configuration management and environment variable loading

use crate::{Result, TreeholeError};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default backend address when `TREEHOLE_BASE_URL` is unset
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";

/// Load environment variables from .env file
///
/// This function loads variables from a .env file in the current directory
/// or a parent directory. A missing file is not an error.
///
/// # Example
///
/// ```no_run
/// use treehole_core::load_env;
///
/// load_env().ok();
/// let base = std::env::var("TREEHOLE_BASE_URL").unwrap_or_default();
/// ```
pub fn load_env() -> Result<()> {
    match dotenvy::dotenv() {
        Ok(path) => {
            tracing::info!("Loaded environment from: {}", path.display());
            Ok(())
        }
        Err(dotenvy::Error::LineParse(line, pos)) => Err(TreeholeError::config(format!(
            "Failed to parse .env file at line {}, position {}",
            line, pos
        ))),
        Err(dotenvy::Error::Io(_)) => {
            tracing::debug!("No .env file found - using system environment variables only");
            Ok(())
        }
        Err(e) => Err(TreeholeError::config(format!(
            "Failed to load .env file: {}",
            e
        ))),
    }
}

/// Load environment variables from a specific file
pub fn load_env_from_path<P: AsRef<Path>>(path: P) -> Result<()> {
    match dotenvy::from_path(path.as_ref()) {
        Ok(_) => {
            tracing::info!("Loaded environment from: {}", path.as_ref().display());
            Ok(())
        }
        Err(e) => Err(TreeholeError::config(format!(
            "Failed to load {} environment file: {}",
            path.as_ref().display(),
            e
        ))),
    }
}

/// Get optional environment variable with default
pub fn get_env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Get optional environment variable, treating blank values as unset
pub fn get_env_opt(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Get environment variable as boolean
pub fn get_env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .and_then(|v| match v.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Some(true),
            "false" | "0" | "no" | "off" => Some(false),
            _ => None,
        })
        .unwrap_or(default)
}

/// Get environment variable as integer
pub fn get_env_int<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

/// Client-side settings for talking to a Treehole backend
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Backend origin, without a trailing slash
    pub base_url: String,
    /// Bearer token sent on authenticated endpoints
    pub token: Option<String>,
    /// Character the conversation is scoped to
    pub character_id: Option<String>,
    /// Connect timeout. Streams have no overall timeout.
    pub connect_timeout: Duration,
    /// How long voice synthesis polling may run
    pub tts_poll_timeout: Duration,
    /// Forward log records to the backend's client log endpoint
    pub log_relay: bool,
    /// Default tracing filter
    pub log_level: String,
    /// Local file holding per-character favorability
    pub state_file: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            token: None,
            character_id: None,
            connect_timeout: Duration::from_secs(10),
            tts_poll_timeout: Duration::from_millis(60_000),
            log_relay: false,
            log_level: "info".to_string(),
            state_file: None,
        }
    }
}

impl ClientConfig {
    /// Read configuration from `TREEHOLE_*` environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let base_url = get_env_or("TREEHOLE_BASE_URL", DEFAULT_BASE_URL);
        let config = Self {
            base_url: normalize_base_url(&base_url)?,
            token: get_env_opt("TREEHOLE_TOKEN"),
            character_id: get_env_opt("TREEHOLE_CHARACTER_ID"),
            connect_timeout: Duration::from_secs(get_env_int(
                "TREEHOLE_CONNECT_TIMEOUT_SECS",
                defaults.connect_timeout.as_secs(),
            )),
            tts_poll_timeout: Duration::from_millis(get_env_int(
                "TREEHOLE_TTS_POLL_TIMEOUT_MS",
                defaults.tts_poll_timeout.as_millis() as u64,
            )),
            log_relay: get_env_bool("TREEHOLE_LOG_RELAY", defaults.log_relay),
            log_level: get_env_or("TREEHOLE_LOG_LEVEL", &defaults.log_level),
            state_file: get_env_opt("TREEHOLE_STATE_FILE").map(PathBuf::from),
        };
        Ok(config)
    }

    /// Replace the base URL, validating its scheme
    pub fn with_base_url(mut self, base_url: &str) -> Result<Self> {
        self.base_url = normalize_base_url(base_url)?;
        Ok(self)
    }
}

fn normalize_base_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(TreeholeError::config(format!(
            "Base URL '{}' must start with http:// or https://",
            raw
        )));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_env_bool() {
        env::set_var("TH_TEST_BOOL_TRUE", "true");
        env::set_var("TH_TEST_BOOL_0", "0");

        assert!(get_env_bool("TH_TEST_BOOL_TRUE", false));
        assert!(!get_env_bool("TH_TEST_BOOL_0", true));
        assert!(get_env_bool("TH_NONEXISTENT", true));

        env::remove_var("TH_TEST_BOOL_TRUE");
        env::remove_var("TH_TEST_BOOL_0");
    }

    #[test]
    fn test_get_env_int() {
        env::set_var("TH_TEST_INT", "42");
        assert_eq!(get_env_int("TH_TEST_INT", 0), 42);
        assert_eq!(get_env_int("TH_NONEXISTENT_INT", 99), 99);
        env::remove_var("TH_TEST_INT");
    }

    #[test]
    fn test_get_env_opt_blank_is_none() {
        env::set_var("TH_TEST_BLANK", "   ");
        assert_eq!(get_env_opt("TH_TEST_BLANK"), None);
        env::remove_var("TH_TEST_BLANK");
    }

    #[test]
    fn test_base_url_normalization() {
        let config = ClientConfig::default()
            .with_base_url("https://chat.example.com/")
            .unwrap();
        assert_eq!(config.base_url, "https://chat.example.com");

        let err = ClientConfig::default().with_base_url("chat.example.com");
        assert!(matches!(err, Err(TreeholeError::Config(_))));
    }
}
