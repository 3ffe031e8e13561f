//! Rate limiting for the signing surface.
//!
//! Validator clients sign in bursts at slot boundaries, so the signing limiter
//! allows a generous burst on top of a sustained per-second rate. Keys are
//! peer IPs (actix-governor `PeerIpKeyExtractor`).

use actix_governor::{Governor, GovernorConfig, GovernorConfigBuilder, PeerIpKeyExtractor};

use crate::error::{SignerError, SignerResult};

const DEFAULT_SIGNING_PER_SECOND: u32 = 50;
const DEFAULT_SIGNING_BURST: u32 = 100;

/// Rate limit settings for signing endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Sustained signing requests per second per IP.
    pub signing_per_second: u32,
    /// Burst size for signing requests.
    pub signing_burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            signing_per_second: DEFAULT_SIGNING_PER_SECOND,
            signing_burst: DEFAULT_SIGNING_BURST,
        }
    }
}

impl RateLimitConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            signing_per_second: std::env::var("RATE_LIMIT_SIGNING_PER_SECOND")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|v| *v > 0)
                .unwrap_or(DEFAULT_SIGNING_PER_SECOND),
            signing_burst: std::env::var("RATE_LIMIT_SIGNING_BURST")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|v| *v > 0)
                .unwrap_or(DEFAULT_SIGNING_BURST),
        }
    }

    /// Replenish interval for one request.
    fn signing_interval_ms(&self) -> u64 {
        (1000 / u64::from(self.signing_per_second.max(1))).max(1)
    }
}

/// Type alias for the Governor middleware with default settings.
pub type RateLimiter = Governor<PeerIpKeyExtractor, governor::middleware::NoOpMiddleware>;

/// Shareable limiter state. Every `Governor` built from one config draws on
/// the same buckets, so build it once and hand it to each worker.
pub type RateLimiterConfig =
    GovernorConfig<PeerIpKeyExtractor, governor::middleware::NoOpMiddleware>;

/// Build the limiter config for `/accounts/sign-*`.
pub fn signing_config(config: &RateLimitConfig) -> SignerResult<RateLimiterConfig> {
    GovernorConfigBuilder::default()
        .milliseconds_per_request(config.signing_interval_ms())
        .burst_size(config.signing_burst.max(1))
        .finish()
        .ok_or_else(|| SignerError::Internal("Invalid signing rate limit".to_string()))
}

/// Middleware instance over shared limiter state.
pub fn signing_limiter(config: &RateLimiterConfig) -> RateLimiter {
    Governor::new(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RateLimitConfig::default();
        assert_eq!(config.signing_per_second, 50);
        assert_eq!(config.signing_burst, 100);
        assert_eq!(config.signing_interval_ms(), 20);
    }

    #[test]
    fn test_interval_never_zero() {
        let config = RateLimitConfig {
            signing_per_second: 5000,
            signing_burst: 1,
        };
        assert_eq!(config.signing_interval_ms(), 1);
    }

    #[test]
    fn test_limiter_creation() {
        let config = signing_config(&RateLimitConfig::default()).expect("valid config");
        // Workers share one config
        let _first = signing_limiter(&config);
        let _second = signing_limiter(&config);
    }
}
