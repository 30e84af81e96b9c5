//! Gateway configuration types.

use std::time::Duration;

use serde::Deserialize;

/// Configuration for the gateway service.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Listen address (e.g., "0.0.0.0:10000").
    #[serde(default = "GatewayConfig::default_listen_addr")]
    pub listen_addr: String,

    /// Allowed CORS origins.
    #[serde(default = "GatewayConfig::default_cors")]
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    #[serde(default = "GatewayConfig::default_max_body")]
    pub max_body_bytes: usize,

    /// Timeout for ordinary (non-proxied) requests in seconds.
    #[serde(default = "GatewayConfig::default_request_timeout")]
    pub request_timeout_seconds: u64,

    /// How long a proxied call may wait for the provider's answer.
    #[serde(default = "GatewayConfig::default_proxy_timeout")]
    pub proxy_timeout_seconds: u64,
}

impl GatewayConfig {
    fn default_listen_addr() -> String {
        "0.0.0.0:10000".to_string()
    }

    fn default_cors() -> Vec<String> {
        vec!["*".to_string()]
    }

    const fn default_max_body() -> usize {
        10 * 1024 * 1024 // 10 MB, proxied notebook payloads included
    }

    const fn default_request_timeout() -> u64 {
        60
    }

    const fn default_proxy_timeout() -> u64 {
        30
    }

    /// Get the request timeout as a `Duration`.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// Get the per-proxied-request timeout as a `Duration`.
    #[must_use]
    pub const fn proxy_timeout(&self) -> Duration {
        Duration::from_secs(self.proxy_timeout_seconds)
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: Self::default_listen_addr(),
            cors_origins: Self::default_cors(),
            max_body_bytes: Self::default_max_body(),
            request_timeout_seconds: Self::default_request_timeout(),
            proxy_timeout_seconds: Self::default_proxy_timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = GatewayConfig::default();
        assert_eq!(config.listen_addr, "0.0.0.0:10000");
        assert_eq!(config.max_body_bytes, 10 * 1024 * 1024);
        assert_eq!(config.proxy_timeout(), Duration::from_secs(30));
        assert_eq!(config.request_timeout(), Duration::from_secs(60));
    }
}
