//! Client configuration loaded from environment variables.
//!
//! Everything except the credential has a default that points at a local
//! development server.

use std::time::Duration;

use chrono::{FixedOffset, Offset, Utc};
use thiserror::Error;

use chatsync_net::{BackoffConfig, ConnectionConfig};
use chatsync_shared::constants::{
    DEFAULT_API_URL, DEFAULT_AVATAR_URL, DEFAULT_BACKOFF_BASE_MS, DEFAULT_BACKOFF_CAP_MS,
    DEFAULT_BACKOFF_JITTER, DEFAULT_GROUPING_GAP_SECS, DEFAULT_REQUEST_TIMEOUT_SECS,
    DEFAULT_WS_URL,
};

use crate::projector::ProjectorConfig;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("CHATSYNC_TOKEN is not set")]
    MissingToken,
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the REST API.
    /// Env: `CHATSYNC_API_URL`
    /// Default: `http://localhost:8080/api/v1`
    pub api_url: String,

    /// Realtime endpoint.
    /// Env: `CHATSYNC_WS_URL`
    /// Default: `ws://localhost:8080/ws`
    pub ws_url: String,

    /// Session credential.
    /// Env: `CHATSYNC_TOKEN`
    pub token: Option<String>,

    /// Avatar shown when a message carries none.
    /// Env: `CHATSYNC_DEFAULT_AVATAR`
    pub default_avatar: String,

    /// Messages closer together than this share one timestamp.
    /// Env: `CHATSYNC_GROUPING_GAP_SECS`
    /// Default: 300
    pub grouping_gap: chrono::Duration,

    /// Env: `CHATSYNC_BACKOFF_BASE_MS` (500), `CHATSYNC_BACKOFF_CAP_MS` (30000)
    pub backoff: BackoffConfig,

    /// Env: `CHATSYNC_REQUEST_TIMEOUT_SECS`
    /// Default: 15
    pub request_timeout: Duration,

    /// Offset used for time labels.
    /// Env: `CHATSYNC_UTC_OFFSET_MINUTES`
    /// Default: 0
    pub utc_offset: FixedOffset,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            ws_url: DEFAULT_WS_URL.to_string(),
            token: None,
            default_avatar: DEFAULT_AVATAR_URL.to_string(),
            grouping_gap: chrono::Duration::seconds(DEFAULT_GROUPING_GAP_SECS),
            backoff: BackoffConfig {
                base: Duration::from_millis(DEFAULT_BACKOFF_BASE_MS),
                cap: Duration::from_millis(DEFAULT_BACKOFF_CAP_MS),
                jitter: DEFAULT_BACKOFF_JITTER,
            },
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            utc_offset: Utc.fix(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("CHATSYNC_API_URL").filter(|v| !v.is_empty()) {
            config.api_url = url;
        }

        if let Some(url) = lookup("CHATSYNC_WS_URL").filter(|v| !v.is_empty()) {
            config.ws_url = url;
        }

        if let Some(token) = lookup("CHATSYNC_TOKEN") {
            if !token.is_empty() {
                config.token = Some(token);
            }
        }

        if let Some(avatar) = lookup("CHATSYNC_DEFAULT_AVATAR").filter(|v| !v.is_empty()) {
            config.default_avatar = avatar;
        }

        if let Some(secs) = parse_var::<i64, _>(&lookup, "CHATSYNC_GROUPING_GAP_SECS") {
            match chrono::Duration::try_seconds(secs).filter(|_| secs >= 0) {
                Some(gap) => config.grouping_gap = gap,
                None => tracing::warn!(
                    value = secs,
                    "CHATSYNC_GROUPING_GAP_SECS out of range, using default"
                ),
            }
        }

        if let Some(ms) = parse_var::<u64, _>(&lookup, "CHATSYNC_BACKOFF_BASE_MS") {
            config.backoff.base = Duration::from_millis(ms);
        }

        if let Some(ms) = parse_var::<u64, _>(&lookup, "CHATSYNC_BACKOFF_CAP_MS") {
            config.backoff.cap = Duration::from_millis(ms);
        }

        if config.backoff.cap < config.backoff.base {
            tracing::warn!(
                base_ms = config.backoff.base.as_millis() as u64,
                cap_ms = config.backoff.cap.as_millis() as u64,
                "Backoff cap below base, raising cap to base"
            );
            config.backoff.cap = config.backoff.base;
        }

        if let Some(secs) = parse_var::<u64, _>(&lookup, "CHATSYNC_REQUEST_TIMEOUT_SECS") {
            if secs > 0 {
                config.request_timeout = Duration::from_secs(secs);
            }
        }

        if let Some(minutes) = parse_var::<i32, _>(&lookup, "CHATSYNC_UTC_OFFSET_MINUTES") {
            match minutes
                .checked_mul(60)
                .and_then(FixedOffset::east_opt)
            {
                Some(offset) => config.utc_offset = offset,
                None => tracing::warn!(
                    value = minutes,
                    "CHATSYNC_UTC_OFFSET_MINUTES out of range, using default"
                ),
            }
        }

        // RUST_LOG is read by tracing-subscriber's EnvFilter directly.

        config
    }

    pub fn require_token(&self) -> Result<&str, ConfigError> {
        self.token.as_deref().ok_or(ConfigError::MissingToken)
    }

    pub fn connection(&self) -> ConnectionConfig {
        ConnectionConfig {
            url: self.ws_url.clone(),
            backoff: self.backoff.clone(),
        }
    }

    pub fn projector(&self) -> ProjectorConfig {
        ProjectorConfig {
            grouping_gap: self.grouping_gap,
            default_avatar: self.default_avatar.clone(),
            utc_offset: self.utc_offset,
        }
    }
}

/// Parse a variable, warning and returning `None` when it is malformed.
fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Invalid value, using default");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> ClientConfig {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ClientConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = config_from(&[]);
        assert_eq!(config.api_url, "http://localhost:8080/api/v1");
        assert_eq!(config.ws_url, "ws://localhost:8080/ws");
        assert_eq!(config.grouping_gap, chrono::Duration::minutes(5));
        assert_eq!(config.backoff.base, Duration::from_millis(500));
        assert_eq!(config.backoff.cap, Duration::from_secs(30));
        assert_eq!(config.request_timeout, Duration::from_secs(15));
        assert_eq!(config.utc_offset.local_minus_utc(), 0);
        assert_eq!(config.require_token(), Err(ConfigError::MissingToken));
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("CHATSYNC_API_URL", "https://chat.example/api/v1"),
            ("CHATSYNC_TOKEN", "abc"),
            ("CHATSYNC_GROUPING_GAP_SECS", "120"),
            ("CHATSYNC_BACKOFF_BASE_MS", "250"),
            ("CHATSYNC_UTC_OFFSET_MINUTES", "480"),
        ]);
        assert_eq!(config.api_url, "https://chat.example/api/v1");
        assert_eq!(config.require_token(), Ok("abc"));
        assert_eq!(config.grouping_gap, chrono::Duration::minutes(2));
        assert_eq!(config.backoff.base, Duration::from_millis(250));
        assert_eq!(config.utc_offset.local_minus_utc(), 8 * 3600);
        assert_eq!(config.connection().url, "ws://localhost:8080/ws");
    }

    #[test]
    fn test_invalid_values_keep_defaults() {
        let config = config_from(&[
            ("CHATSYNC_GROUPING_GAP_SECS", "five minutes"),
            ("CHATSYNC_BACKOFF_CAP_MS", "-1"),
            ("CHATSYNC_REQUEST_TIMEOUT_SECS", "0"),
            ("CHATSYNC_UTC_OFFSET_MINUTES", "100000"),
            ("CHATSYNC_TOKEN", ""),
        ]);
        assert_eq!(config.grouping_gap, chrono::Duration::seconds(300));
        assert_eq!(config.backoff.cap, Duration::from_millis(30_000));
        assert_eq!(config.request_timeout, Duration::from_secs(15));
        assert_eq!(config.utc_offset.local_minus_utc(), 0);
        assert!(config.token.is_none());
    }

    #[test]
    fn test_cap_never_below_base() {
        let config = config_from(&[
            ("CHATSYNC_BACKOFF_BASE_MS", "5000"),
            ("CHATSYNC_BACKOFF_CAP_MS", "1000"),
        ]);
        assert_eq!(config.backoff.cap, Duration::from_millis(5000));
    }
}
