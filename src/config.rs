//! Bot configuration.
//!
//! Loaded from an optional TOML file (`geobot.toml` or the path in
//! `GEOBOT_CONFIG`), then overridden by environment variables. Secrets
//! (page access token, webhook verify token, app secret, geocoding API
//! key) normally arrive through the environment.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub messenger: MessengerConfig,
    #[serde(default)]
    pub geocode: GeocodeConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Messenger platform credentials.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessengerConfig {
    /// Page access token for the Send API
    #[serde(default)]
    pub access_token: String,
    /// Token echoed back during the webhook verification handshake
    #[serde(default)]
    pub verify_token: String,
    /// App secret for X-Hub-Signature-256 verification (optional; if unset,
    /// webhook signatures are not checked)
    #[serde(default)]
    pub app_secret: Option<String>,
}

/// Geocoding provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeocodeConfig {
    /// Geocoding endpoint (forward and reverse share it; they differ only
    /// in query parameters)
    #[serde(default = "default_geocode_endpoint")]
    pub endpoint: String,
    /// API key appended as the `key` query parameter when present
    #[serde(default)]
    pub api_key: Option<String>,
    /// Per-request timeout in seconds
    #[serde(default = "default_geocode_timeout_secs")]
    pub timeout_secs: u64,
}

/// HTTP server settings for the webhook listener.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Base log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// "pretty" or "json"
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

fn default_geocode_endpoint() -> String {
    "https://maps.googleapis.com/maps/api/geocode/json".to_string()
}

fn default_geocode_timeout_secs() -> u64 {
    10
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    4000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for GeocodeConfig {
    fn default() -> Self {
        Self {
            endpoint: default_geocode_endpoint(),
            api_key: None,
            timeout_secs: default_geocode_timeout_secs(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration: TOML file if present, then environment overrides,
    /// then validation.
    pub fn load() -> Result<Self> {
        let path = std::env::var("GEOBOT_CONFIG").unwrap_or_else(|_| "geobot.toml".to_string());
        let mut config = Self::from_file(&path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse the TOML file at `path`, or return defaults if it does not exist.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("failed to parse {}: {e}", path.display())))
    }

    /// Apply environment variable overrides on top of file values.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(token) = std::env::var("ACCESS_TOKEN") {
            self.messenger.access_token = token;
        }
        if let Ok(token) = std::env::var("VERIFY_TOKEN") {
            self.messenger.verify_token = token;
        }
        if let Ok(secret) = std::env::var("APP_SECRET") {
            self.messenger.app_secret = Some(secret);
        }
        if let Ok(key) = std::env::var("GOOGLE_API_KEY") {
            self.geocode.api_key = Some(key);
        }
        if let Ok(host) = std::env::var("GEOBOT_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("GEOBOT_PORT") {
            if let Ok(port) = port.parse() {
                self.server.port = port;
            }
        }
        if let Ok(level) = std::env::var("GEOBOT_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Ok(format) = std::env::var("GEOBOT_LOG_FORMAT") {
            self.observability.log_format = format;
        }
    }

    /// Validate fatal-only conditions. Missing credentials abort startup
    /// rather than fail per-event.
    pub fn validate(&self) -> Result<()> {
        if self.messenger.access_token.is_empty() {
            return Err(Error::Config(
                "missing page access token (set ACCESS_TOKEN or [messenger].access_token)".into(),
            ));
        }
        if self.messenger.verify_token.is_empty() {
            return Err(Error::Config(
                "missing webhook verify token (set VERIFY_TOKEN or [messenger].verify_token)"
                    .into(),
            ));
        }
        if self.geocode.endpoint.is_empty() {
            return Err(Error::Config("geocode endpoint must not be empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_google() {
        let config = Config::default();
        assert_eq!(
            config.geocode.endpoint,
            "https://maps.googleapis.com/maps/api/geocode/json"
        );
        assert_eq!(config.geocode.timeout_secs, 10);
        assert_eq!(config.server.port, 4000);
    }

    #[test]
    fn validate_rejects_missing_credentials() {
        let config = Config::default();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.messenger.access_token = "page-token".into();
        assert!(config.validate().is_err());

        config.messenger.verify_token = "verify-me".into();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parses_toml_sections() {
        let config: Config = toml::from_str(
            r#"
            [messenger]
            access_token = "tok"
            verify_token = "ver"

            [geocode]
            timeout_secs = 3

            [server]
            port = 8080
            "#,
        )
        .unwrap();

        assert_eq!(config.messenger.access_token, "tok");
        assert_eq!(config.geocode.timeout_secs, 3);
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.observability.log_level, "info");
    }
}
