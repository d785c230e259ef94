use std::time::Duration;

use serde::Deserialize;

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Base URL of the messaging backend (REST)
    pub backend_api_url: String,

    /// User identifier forwarded to `/sessions` and `/create-session`
    pub user_id: Option<String>,

    /// Delay between two consecutive bulk sends in milliseconds (default: 2000)
    pub dispatch_delay_ms: u64,

    /// Upper bound for a single outbound send before it counts as failed (default: 30)
    pub send_timeout_secs: u64,

    /// Request timeout for every other backend call (default: 30)
    pub backend_timeout_secs: u64,

    /// Session list polling interval in milliseconds (default: 3000)
    pub session_poll_interval_ms: u64,

    /// Number of messages fetched per chat (default: 50)
    pub message_fetch_limit: u32,

    /// Listen address for the HTTP API (default: 0.0.0.0:3000)
    pub api_bind_addr: String,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            backend_api_url: std::env::var("BACKEND_API_URL")
                .unwrap_or_else(|_| "http://localhost:5000".to_string())
                .trim_end_matches('/')
                .to_string(),
            user_id: std::env::var("WABULK_USER_ID").ok().filter(|v| !v.is_empty()),
            dispatch_delay_ms: parse_var("DISPATCH_DELAY_MS", "2000")?,
            send_timeout_secs: parse_var("SEND_TIMEOUT_SECS", "30")?,
            backend_timeout_secs: parse_var("BACKEND_TIMEOUT_SECS", "30")?,
            session_poll_interval_ms: parse_var("SESSION_POLL_INTERVAL_MS", "3000")?,
            message_fetch_limit: parse_var("MESSAGE_FETCH_LIMIT", "50")?,
            api_bind_addr: std::env::var("API_BIND_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
        })
    }

    pub fn dispatch_delay(&self) -> Duration {
        Duration::from_millis(self.dispatch_delay_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }

    pub fn backend_timeout(&self) -> Duration {
        Duration::from_secs(self.backend_timeout_secs)
    }

    pub fn session_poll_interval(&self) -> Duration {
        Duration::from_millis(self.session_poll_interval_ms)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend_api_url: "http://localhost:5000".to_string(),
            user_id: None,
            dispatch_delay_ms: 2000,
            send_timeout_secs: 30,
            backend_timeout_secs: 30,
            session_poll_interval_ms: 3000,
            message_fetch_limit: 50,
            api_bind_addr: "0.0.0.0:3000".to_string(),
        }
    }
}

/// Read a numeric variable, falling back to `default` when unset.
fn parse_var<T: std::str::FromStr>(name: &str, default: &str) -> anyhow::Result<T> {
    std::env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("{} must be a valid number", name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.dispatch_delay(), Duration::from_millis(2000));
        assert_eq!(config.send_timeout(), Duration::from_secs(30));
        assert_eq!(config.session_poll_interval(), Duration::from_secs(3));
        assert_eq!(config.message_fetch_limit, 50);
    }

    #[test]
    fn test_parse_var_default_used_when_unset() {
        let value: u64 = parse_var("WABULK_TEST_SURELY_UNSET_VAR", "1234").unwrap();
        assert_eq!(value, 1234);
    }

    #[test]
    fn test_parse_var_rejects_garbage_default() {
        let result: anyhow::Result<u64> = parse_var("WABULK_TEST_SURELY_UNSET_VAR", "abc");
        let err = result.unwrap_err().to_string();
        assert!(err.contains("WABULK_TEST_SURELY_UNSET_VAR"));
    }
}
