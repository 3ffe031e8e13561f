// Crate-level lint configuration
// Allow noisy pedantic/cargo lints that aren't worth fixing individually
#![allow(clippy::multiple_crate_versions)] // Transitive deps, can't easily fix
#![allow(clippy::missing_errors_doc)] // Would require extensive doc changes
#![allow(clippy::missing_panics_doc)] // Would require extensive doc changes
#![allow(clippy::must_use_candidate)] // Too many false positives for internal APIs
#![allow(clippy::module_name_repetitions)] // Acceptable for clarity (e.g., SignerError in error mod)
#![allow(clippy::doc_markdown)] // Too strict about backticks in docs
#![allow(clippy::missing_const_for_fn)] // Often debatable, runtime doesn't benefit

//! Validator Signer Service
//!
//! Custody-and-signing service for proof-of-stake validator keys. Signs
//! attestations, block proposals, and aggregation data while guaranteeing that
//! no slashable signature is produced, even under concurrent or retried
//! requests for the same key.
//!
//! ## Pipeline
//!
//! Every request is decoded at the boundary, resolved to an account, and then
//! runs under a durable per-account lock:
//!
//! - **Lock**: TTL lock record written with a conditional put in redb
//! - **Protect**: attestation `(source, target)` and proposal `slot` watermarks
//!   must strictly advance; the new watermark is committed before signing
//! - **Sign**: the SSZ signing root is handed to key custody
//! - **Release**: the lock record is deleted on every path
//!
//! Aggregation data is signed without slashing checks.
//!
//! ## Security Model
//!
//! - **Single owner**: one process owns the database (redb holds an exclusive
//!   file lock); lock and watermark writes are transactional
//! - **Internal auth**: signing routes require the internal service token
//! - **mTLS**: optional mutual TLS for callers
//! - **Audit**: every resolved request lands in a hash-chained, signed log

pub mod audit;
pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod signing;
pub mod storage;
pub mod tls;

/// Log filter used when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "validator_signer=info,actix_web=info";

#[cfg(feature = "otel")]
pub mod telemetry;

#[cfg(not(feature = "otel"))]
pub mod telemetry {
    //! Stub telemetry module when OpenTelemetry is disabled.

    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    /// Initialize tracing with console output only.
    pub fn init_tracing() {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| crate::DEFAULT_LOG_FILTER.into());
        let fmt_layer = tracing_subscriber::fmt::layer();

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .init();
    }

    /// No-op shutdown when OpenTelemetry is disabled.
    pub fn shutdown_tracing() {}
}

// Re-export commonly used types
pub use config::{Network, Settings};
pub use error::{SignerError, SignerResult};
pub use signing::{KeyCustody, LocalKeyCustody, SigningService};
pub use storage::Storage;
