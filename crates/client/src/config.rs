//! Client configuration from environment variables.

use std::time::Duration;

use pastewatch_shared::push_url;

/// Base URL used when `PASTEWATCH_API_URL` is unset.
pub const DEFAULT_API_URL: &str = "http://localhost:8000";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid API base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },
}

/// Configuration for auto-reconnect behavior.
///
/// The delay grows linearly: attempt `n` waits `base_delay * n`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Maximum number of reconnect attempts after a close
    pub max_attempts: u32,
    /// Delay multiplied by the attempt number
    pub base_delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(3000),
        }
    }
}

impl ReconnectConfig {
    /// Calculate delay for a given attempt number (1-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_url: String,
    pub reconnect: ReconnectConfig,
    pub keepalive_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            reconnect: ReconnectConfig::default(),
            keepalive_interval: Duration::from_secs(30),
        }
    }
}

impl ClientConfig {
    /// Build a config for an explicit base URL with default timings.
    pub fn with_api_url(api_url: impl Into<String>) -> Result<Self, ConfigError> {
        let config = Self {
            api_url: api_url.into(),
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from environment variables.
    ///
    /// Environment variables:
    /// - `PASTEWATCH_API_URL`: API base URL (default: "http://localhost:8000")
    /// - `PASTEWATCH_RECONNECT_DELAY_MS`: linear backoff step (default: 3000)
    /// - `PASTEWATCH_RECONNECT_MAX_ATTEMPTS`: reconnect cap (default: 5)
    /// - `PASTEWATCH_KEEPALIVE_SECS`: keepalive ping interval (default: 30)
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let api_url = std::env::var("PASTEWATCH_API_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(defaults.api_url);

        let base_delay = env_number("PASTEWATCH_RECONNECT_DELAY_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.reconnect.base_delay);
        let max_attempts = env_number("PASTEWATCH_RECONNECT_MAX_ATTEMPTS")
            .map(|n| n.min(u32::MAX as u64) as u32)
            .unwrap_or(defaults.reconnect.max_attempts);
        let keepalive_interval = env_number("PASTEWATCH_KEEPALIVE_SECS")
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults.keepalive_interval);

        let config = Self {
            api_url,
            reconnect: ReconnectConfig {
                max_attempts,
                base_delay,
            },
            keepalive_interval,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let parsed = url::Url::parse(&self.api_url).map_err(|e| ConfigError::InvalidBaseUrl {
            url: self.api_url.clone(),
            reason: e.to_string(),
        })?;
        match parsed.scheme() {
            "http" | "https" => Ok(()),
            other => Err(ConfigError::InvalidBaseUrl {
                url: self.api_url.clone(),
                reason: format!("unsupported scheme '{other}'"),
            }),
        }
    }

    /// Push channel URL derived from the base URL (http→ws, https→wss, plus `/ws`).
    pub fn ws_url(&self) -> Result<String, ConfigError> {
        push_url(&self.api_url).ok_or_else(|| ConfigError::InvalidBaseUrl {
            url: self.api_url.clone(),
            reason: "expected an http or https URL".to_string(),
        })
    }
}

fn env_number(key: &str) -> Option<u64> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse::<u64>() {
        Ok(n) => Some(n),
        Err(e) => {
            tracing::warn!(key, value = %raw, error = %e, "ignoring unparseable setting");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_backoff() {
        let cfg = ReconnectConfig::default();
        assert_eq!(cfg.delay_for_attempt(1), Duration::from_millis(3000));
        assert_eq!(cfg.delay_for_attempt(2), Duration::from_millis(6000));
        assert_eq!(cfg.delay_for_attempt(5), Duration::from_millis(15000));
    }

    #[test]
    fn ws_url_follows_scheme() {
        let cfg = ClientConfig::with_api_url("https://scans.example.com").unwrap();
        assert_eq!(cfg.ws_url().unwrap(), "wss://scans.example.com/ws");
        assert_eq!(ClientConfig::default().ws_url().unwrap(), "ws://localhost:8000/ws");
    }

    #[test]
    fn uppercase_scheme_that_validates_also_maps() {
        let cfg = ClientConfig::with_api_url("HTTP://localhost:8000").unwrap();
        assert_eq!(cfg.ws_url().unwrap(), "ws://localhost:8000/ws");
    }

    #[test]
    fn rejects_non_http_base() {
        assert!(matches!(
            ClientConfig::with_api_url("ftp://example.com"),
            Err(ConfigError::InvalidBaseUrl { .. })
        ));
        assert!(ClientConfig::with_api_url("not a url").is_err());
    }
}
