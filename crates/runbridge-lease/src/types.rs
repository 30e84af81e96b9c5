//! Request, response, and configuration types for lease operations.

use chrono::Duration;
use runbridge_core::{AccessToken, ProviderId};
use runbridge_store::Session;
use serde::Deserialize;

/// Payload a provider submits to register a session.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterSessionRequest {
    /// The provider's self-assigned id.
    pub provider_id: ProviderId,
    /// Base URL of the provider's notebook runtime.
    pub public_url: String,
    /// Runtime credential embedded in the access redirect.
    pub runtime_token: String,
    /// Opaque hardware descriptor.
    #[serde(default)]
    pub hardware: serde_json::Value,
    /// Opaque pricing descriptor.
    #[serde(default)]
    pub pricing: serde_json::Value,
}

/// A freshly registered session together with its access token.
#[derive(Debug, Clone)]
pub struct RegisteredSession {
    /// The stored record.
    pub session: Session,
    /// The opaque credential a renter presents to lease it.
    pub access_token: AccessToken,
}

/// One entry in a renter-facing session listing.
#[derive(Debug, Clone)]
pub struct SessionOffer {
    /// The session record.
    pub session: Session,
    /// The token that leases it.
    pub access_token: AccessToken,
}

/// Result of one reconciliation pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct SweepReport {
    /// Sessions examined.
    pub examined: usize,
    /// Timeout-driven transitions applied.
    pub transitions: usize,
    /// Sessions skipped because of per-session errors or lost races.
    pub skipped: usize,
}

/// Configuration for the lease machinery. All knobs are tunable; the
/// defaults match the recommended timeouts.
#[derive(Debug, Clone, Deserialize)]
pub struct LeaseConfig {
    /// Seconds without a renter heartbeat before a lock is abandoned.
    #[serde(default = "LeaseConfig::default_idle_timeout")]
    pub idle_timeout_seconds: u64,

    /// Seconds an abandoned lease stays reclaimable by its owner.
    #[serde(default = "LeaseConfig::default_grace_window")]
    pub grace_window_seconds: u64,

    /// Seconds without a provider heartbeat before the session is presumed
    /// dead.
    #[serde(default = "LeaseConfig::default_provider_timeout")]
    pub provider_timeout_seconds: u64,

    /// Seconds a session may sit in `Cleaning` before it is terminated
    /// without an ack.
    #[serde(default = "LeaseConfig::default_stale_cleaning")]
    pub stale_cleaning_seconds: u64,

    /// Period of the reconciliation sweep.
    #[serde(default = "LeaseConfig::default_sweep_interval")]
    pub sweep_interval_seconds: u64,

    /// Require registered public URLs to use https.
    #[serde(default = "LeaseConfig::default_require_https")]
    pub require_https_public_url: bool,
}

impl LeaseConfig {
    const fn default_idle_timeout() -> u64 {
        120
    }

    const fn default_grace_window() -> u64 {
        600
    }

    const fn default_provider_timeout() -> u64 {
        120
    }

    const fn default_stale_cleaning() -> u64 {
        60
    }

    const fn default_sweep_interval() -> u64 {
        30
    }

    const fn default_require_https() -> bool {
        true
    }

    /// Idle timeout as a `chrono::Duration`.
    #[must_use]
    pub fn idle_timeout(&self) -> Duration {
        Duration::seconds(i64::try_from(self.idle_timeout_seconds).unwrap_or(i64::MAX))
    }

    /// Grace window as a `chrono::Duration`.
    #[must_use]
    pub fn grace_window(&self) -> Duration {
        Duration::seconds(i64::try_from(self.grace_window_seconds).unwrap_or(i64::MAX))
    }

    /// Provider timeout as a `chrono::Duration`.
    #[must_use]
    pub fn provider_timeout(&self) -> Duration {
        Duration::seconds(i64::try_from(self.provider_timeout_seconds).unwrap_or(i64::MAX))
    }

    /// Stale-cleaning timeout as a `chrono::Duration`.
    #[must_use]
    pub fn stale_cleaning_timeout(&self) -> Duration {
        Duration::seconds(i64::try_from(self.stale_cleaning_seconds).unwrap_or(i64::MAX))
    }

    /// Sweep interval as a `std::time::Duration` for the supervisor timer.
    #[must_use]
    pub const fn sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sweep_interval_seconds)
    }
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            idle_timeout_seconds: Self::default_idle_timeout(),
            grace_window_seconds: Self::default_grace_window(),
            provider_timeout_seconds: Self::default_provider_timeout(),
            stale_cleaning_seconds: Self::default_stale_cleaning(),
            sweep_interval_seconds: Self::default_sweep_interval(),
            require_https_public_url: Self::default_require_https(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = LeaseConfig::default();
        assert_eq!(config.idle_timeout_seconds, 120);
        assert_eq!(config.grace_window_seconds, 600);
        assert_eq!(config.provider_timeout_seconds, 120);
        assert_eq!(config.stale_cleaning_seconds, 60);
        assert_eq!(config.sweep_interval_seconds, 30);
        assert!(config.require_https_public_url);
    }

    #[test]
    fn durations_line_up() {
        let config = LeaseConfig::default();
        assert_eq!(config.idle_timeout(), Duration::seconds(120));
        assert_eq!(config.sweep_interval(), std::time::Duration::from_secs(30));
    }

    #[test]
    fn register_request_defaults_descriptors() {
        let json = serde_json::json!({
            "provider_id": runbridge_core::ProviderId::generate().to_string(),
            "public_url": "https://runtime.example",
            "runtime_token": "tok",
        });
        let request: RegisterSessionRequest = serde_json::from_value(json).unwrap();
        assert!(request.hardware.is_null());
        assert!(request.pricing.is_null());
    }
}
