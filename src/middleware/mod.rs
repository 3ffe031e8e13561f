//! Middleware for the validator signer.
//!
//! Internal token authentication and per-IP rate limiting for the signing
//! scope.

pub mod auth;
pub mod rate_limit;

pub use auth::InternalAuth;
pub use rate_limit::{
    RateLimitConfig, RateLimiter, RateLimiterConfig, signing_config, signing_limiter,
};
