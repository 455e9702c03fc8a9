use crate::{RtmError, RtmResult};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Environment variable that overrides the configured bot token.
pub const TOKEN_ENV_VAR: &str = "SLACK_BOT_TOKEN";

/// Client configuration, usually read from `rtmbot.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct RtmConfig {
    /// Bot token. [`TOKEN_ENV_VAR`] takes precedence when set.
    #[serde(default)]
    pub token: Option<String>,
    /// Base URL of the web API that serves `/api/rtm.connect`.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// `Origin` header sent with the WebSocket upgrade request.
    #[serde(default = "default_origin")]
    pub origin: String,
    /// Timeout of the handshake request, in seconds.
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    /// Ping/pong settings.
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,
    /// TLS trust settings.
    #[serde(default)]
    pub tls: TlsConfig,
}

/// Application-level ping/pong settings.
#[derive(Debug, Clone, Deserialize)]
pub struct HeartbeatConfig {
    /// Seconds between two pings.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Largest tolerated gap between the last ping id and the last pong id.
    #[serde(default = "default_max_missed")]
    pub max_missed: i32,
}

/// Extra trust configuration for the WebSocket TLS connection.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TlsConfig {
    /// PEM bundle of additional root certificates, e.g. for an inspecting proxy.
    #[serde(default)]
    pub extra_root_certs: Option<PathBuf>,
}

fn default_api_base_url() -> String {
    "https://slack.com".to_string()
}
fn default_origin() -> String {
    "https://api.slack.com/".to_string()
}
fn default_http_timeout_secs() -> u64 {
    30
}
fn default_interval_secs() -> u64 {
    60
}
fn default_max_missed() -> i32 {
    2
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            max_missed: default_max_missed(),
        }
    }
}

impl Default for RtmConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_base_url: default_api_base_url(),
            origin: default_origin(),
            http_timeout_secs: default_http_timeout_secs(),
            heartbeat: HeartbeatConfig::default(),
            tls: TlsConfig::default(),
        }
    }
}

impl HeartbeatConfig {
    /// Tick period as a [`Duration`].
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl RtmConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml_str(s: &str) -> RtmResult<Self> {
        toml::from_str(s).map_err(|e| RtmError::Config(format!("Invalid config: {e}")))
    }

    /// Read and parse a configuration file.
    pub fn load(path: impl AsRef<Path>) -> RtmResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            RtmError::Config(format!("Failed to read config '{}': {e}", path.display()))
        })?;
        debug!(path = %path.display(), "Loaded config file");
        Self::from_toml_str(&text)
    }

    /// Handshake request timeout as a [`Duration`].
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Resolve the bot token, preferring [`TOKEN_ENV_VAR`] over the file value.
    pub fn resolve_token(&self) -> RtmResult<String> {
        std::env::var(TOKEN_ENV_VAR)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .or_else(|| self.token.clone())
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| {
                RtmError::Config(format!(
                    "No bot token: set `token` in the config or {TOKEN_ENV_VAR}"
                ))
            })
    }

    /// Check value ranges and referenced files.
    pub fn validate(&self) -> RtmResult<()> {
        if !(self.api_base_url.starts_with("https://") || self.api_base_url.starts_with("http://"))
        {
            return Err(RtmError::Config(format!(
                "api_base_url must be an http(s) URL: {}",
                self.api_base_url
            )));
        }
        if self.heartbeat.interval_secs == 0 {
            return Err(RtmError::Config(
                "heartbeat.interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.heartbeat.max_missed < 1 {
            return Err(RtmError::Config(
                "heartbeat.max_missed must be at least 1".to_string(),
            ));
        }
        if let Some(path) = &self.tls.extra_root_certs {
            if !path.exists() {
                return Err(RtmError::Config(format!(
                    "Extra root certificates not found: {}",
                    path.display()
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_toml() {
        let config = RtmConfig::from_toml_str("").unwrap();
        assert_eq!(config.api_base_url, "https://slack.com");
        assert_eq!(config.origin, "https://api.slack.com/");
        assert_eq!(config.heartbeat.interval(), Duration::from_secs(60));
        assert_eq!(config.heartbeat.max_missed, 2);
        assert!(config.tls.extra_root_certs.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_heartbeat_section() {
        let config = RtmConfig::from_toml_str("[heartbeat]\ninterval_secs = 5\n").unwrap();
        assert_eq!(config.heartbeat.interval_secs, 5);
        assert_eq!(config.heartbeat.max_missed, 2);
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let mut config = RtmConfig::default();
        config.heartbeat.interval_secs = 0;
        assert!(matches!(config.validate(), Err(RtmError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_bad_base_url() {
        let config = RtmConfig {
            api_base_url: "ftp://slack.com".into(),
            ..RtmConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_missing_root_file() {
        let mut config = RtmConfig::default();
        config.tls.extra_root_certs = Some(PathBuf::from("/nonexistent/roots.pem"));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = RtmConfig::from_toml_str("heartbeat = 3").unwrap_err();
        assert!(matches!(err, RtmError::Config(_)));
    }
}
