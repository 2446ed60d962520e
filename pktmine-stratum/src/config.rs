use crate::error::{PoolError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Pool session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Pool URL (hostname:port or stratum+tcp://hostname:port)
    pub url: String,

    /// Payout address sent with mining.authorize and mining.submit
    pub payout_address: String,

    /// Worker name appended to the authorization
    #[serde(default = "default_worker_name")]
    pub worker_name: String,

    /// User agent string sent with mining.subscribe
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Connection timeout
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout: Duration,

    /// Response timeout for request/response exchanges
    #[serde(default = "default_response_timeout")]
    pub response_timeout: Duration,

    /// Initial reconnection backoff
    #[serde(default = "default_reconnect_backoff")]
    pub reconnect_backoff: Duration,

    /// Maximum reconnection backoff
    #[serde(default = "default_max_reconnect_backoff")]
    pub max_reconnect_backoff: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            payout_address: String::new(),
            worker_name: default_worker_name(),
            user_agent: default_user_agent(),
            connection_timeout: default_connection_timeout(),
            response_timeout: default_response_timeout(),
            reconnect_backoff: default_reconnect_backoff(),
            max_reconnect_backoff: default_max_reconnect_backoff(),
        }
    }
}

impl PoolConfig {
    /// Parse URL to extract host and port
    pub fn parse_url(&self) -> Result<(String, u16)> {
        let url = self
            .url
            .strip_prefix("stratum+tcp://")
            .or_else(|| self.url.strip_prefix("stratum://"))
            .unwrap_or(&self.url);

        let parts: Vec<&str> = url.split(':').collect();
        if parts.len() != 2 || parts[0].is_empty() {
            return Err(PoolError::InvalidConfiguration(format!(
                "invalid pool URL format: {}",
                self.url
            )));
        }

        let host = parts[0].to_string();
        let port = parts[1].parse::<u16>().map_err(|_| {
            PoolError::InvalidConfiguration(format!("invalid port in URL: {}", self.url))
        })?;

        Ok((host, port))
    }
}

// Default value functions for serde
fn default_worker_name() -> String {
    "worker1".to_string()
}
fn default_connection_timeout() -> Duration {
    Duration::from_secs(10)
}
fn default_response_timeout() -> Duration {
    Duration::from_secs(10)
}
fn default_reconnect_backoff() -> Duration {
    Duration::from_secs(5)
}
fn default_max_reconnect_backoff() -> Duration {
    Duration::from_secs(60)
}
fn default_user_agent() -> String {
    format!("pktmine/{}", env!("CARGO_PKG_VERSION"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_url_with_scheme() {
        let config = PoolConfig {
            url: "stratum+tcp://pool.example.com:3333".to_string(),
            ..Default::default()
        };
        let (host, port) = config.parse_url().unwrap();
        assert_eq!(host, "pool.example.com");
        assert_eq!(port, 3333);
    }

    #[test]
    fn test_parse_url_bare() {
        let config = PoolConfig {
            url: "127.0.0.1:9000".to_string(),
            ..Default::default()
        };
        let (host, port) = config.parse_url().unwrap();
        assert_eq!(host, "127.0.0.1");
        assert_eq!(port, 9000);
    }

    #[test]
    fn test_parse_url_rejects_garbage() {
        for url in ["", "nohost", "host:notaport", ":3333"] {
            let config = PoolConfig {
                url: url.to_string(),
                ..Default::default()
            };
            assert!(config.parse_url().is_err(), "accepted {:?}", url);
        }
    }
}
