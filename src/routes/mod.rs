//! HTTP routes for the validator signer.
//!
//! - `health`: health check and build info (public)
//! - `signing`: `/accounts/sign-*` endpoints (internal auth, rate limited)

pub mod health;
pub mod signing;

pub use health::{build_info, health};
pub use signing::json_config;
