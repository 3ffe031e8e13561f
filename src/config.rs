//! Service configuration derived from environment variables.
//!
//! Configuration is loaded once at startup and validated before the service starts.
//!
//! ## Environment Variables
//!
//! - `SIGNER_PORT`: HTTP port (default: 5101)
//! - `SIGNER_HOST`: Bind address (default: :: for dual-stack IPv4/IPv6)
//! - `SIGNER_NETWORK`: "mainnet", "prater" or "test" (default: mainnet)
//! - `SIGNER_DB_PATH`: Path to ReDB database file (default: ./.data/{network}.redb)
//! - `SIGNER_KEYSTORE_PATH`: JSON keystore holding validator keys (required)
//! - `SIGNER_LOCK_TTL_MS`: Lifetime of an account lock record (default: 30000, max: 3600000)
//! - `SIGNER_LOCK_RETRY_ATTEMPTS`: Lock acquisition attempts before `LockBusy` (default: 5)
//! - `SIGNER_LOCK_RETRY_BACKOFF_MS`: Initial retry backoff, doubled per attempt (default: 50)
//! - `SIGNER_BODY_LIMIT_MB`: JSON body limit (default: 1)
//! - `SIGNER_AUDIT_ENABLED`: Record signing decisions in the audit log (default: true)
//! - `SIGNER_MTLS_CA_PATH` / `SIGNER_MTLS_CERT_PATH` / `SIGNER_MTLS_KEY_PATH`: server mTLS
//! - `INTERNAL_SERVICE_TOKEN`: Shared secret for callers
//! - `INTERNAL_SERVICE_TOKEN_REQUIRED`: Require the token outside production
//! - `APP_ENV` / `RUST_ENV`: "production" makes the token mandatory
//! - `RATE_LIMIT_SIGNING_PER_SECOND` / `RATE_LIMIT_SIGNING_BURST`: see `middleware::rate_limit`
//! - `RUST_LOG`: Log level filter

use std::env;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::signing::LockPolicy;

const DEFAULT_PORT: u16 = 5101;
const DEFAULT_BODY_LIMIT_MB: usize = 1;
const DEFAULT_LOCK_TTL_MS: u64 = 30_000;
const MAX_LOCK_TTL_MS: u64 = 3_600_000;
const DEFAULT_LOCK_RETRY_ATTEMPTS: u32 = 5;
const DEFAULT_LOCK_RETRY_BACKOFF_MS: u64 = 50;

/// Helper to get trimmed env var or empty string.
fn env_trim(name: &str) -> String {
    env::var(name).unwrap_or_default().trim().to_string()
}

/// Helper to get lowercase env var.
fn env_lower(name: &str) -> String {
    env_trim(name).to_lowercase()
}

/// Helper to get an optional, non-empty env var.
fn env_opt(name: &str) -> Option<String> {
    let value = env_trim(name);
    if value.is_empty() { None } else { Some(value) }
}

/// Check if a string value is truthy.
fn is_truthy(value: &str) -> bool {
    matches!(value.trim(), "1" | "true" | "yes")
}

/// Beacon chain network the signer serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Mainnet,
    Prater,
    /// Local and CI networks.
    Test,
}

impl FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mainnet" => Ok(Self::Mainnet),
            "prater" => Ok(Self::Prater),
            "test" => Ok(Self::Test),
            other => Err(format!(
                "Invalid network '{other}'. Must be 'mainnet', 'prater' or 'test'."
            )),
        }
    }
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mainnet => write!(f, "mainnet"),
            Self::Prater => write!(f, "prater"),
            Self::Test => write!(f, "test"),
        }
    }
}

/// Service configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    port: u16,
    host: IpAddr,
    network: Network,
    db_path: PathBuf,
    keystore_path: Option<PathBuf>,
    internal_token: Option<String>,
    internal_token_required: bool,
    body_limit_bytes: usize,
    audit_enabled: bool,

    lock_ttl_ms: u64,
    lock_retry_attempts: u32,
    lock_retry_backoff_ms: u64,

    mtls_ca_path: Option<PathBuf>,
    mtls_cert_path: Option<PathBuf>,
    mtls_key_path: Option<PathBuf>,
}

impl Settings {
    /// Load settings from environment variables.
    ///
    /// Unparseable values fall back to their defaults; an unknown network
    /// is reported by [`Settings::validate`].
    pub fn from_env() -> Self {
        let port = env_trim("SIGNER_PORT")
            .parse::<u16>()
            .unwrap_or(DEFAULT_PORT);

        // Default to IPv6 unspecified (::) for dual-stack support.
        let host = env_trim("SIGNER_HOST")
            .parse::<IpAddr>()
            .unwrap_or(IpAddr::V6(Ipv6Addr::UNSPECIFIED));

        let network = env_opt("SIGNER_NETWORK").map_or(Ok(Network::default()), |n| n.parse());
        let network_error = network.as_ref().err().cloned();
        let network = network.unwrap_or_default();

        let db_path = env_opt("SIGNER_DB_PATH").map_or_else(
            || PathBuf::from(format!("./.data/{network}.redb")),
            PathBuf::from,
        );

        let keystore_path = env_opt("SIGNER_KEYSTORE_PATH").map(PathBuf::from);

        let internal_token = env_opt("INTERNAL_SERVICE_TOKEN");
        let app_env = env_lower("APP_ENV");
        let rust_env = env_lower("RUST_ENV");
        let is_production = app_env == "production" || rust_env == "production";
        let internal_token_required =
            is_production || is_truthy(&env_lower("INTERNAL_SERVICE_TOKEN_REQUIRED"));

        let body_limit_mb = env_trim("SIGNER_BODY_LIMIT_MB")
            .parse::<usize>()
            .unwrap_or(DEFAULT_BODY_LIMIT_MB);

        let audit_enabled = env_opt("SIGNER_AUDIT_ENABLED").is_none_or(|v| is_truthy(&v));

        let lock_ttl_ms = env_trim("SIGNER_LOCK_TTL_MS")
            .parse::<u64>()
            .unwrap_or(DEFAULT_LOCK_TTL_MS);
        let lock_retry_attempts = env_trim("SIGNER_LOCK_RETRY_ATTEMPTS")
            .parse::<u32>()
            .unwrap_or(DEFAULT_LOCK_RETRY_ATTEMPTS);
        let lock_retry_backoff_ms = env_trim("SIGNER_LOCK_RETRY_BACKOFF_MS")
            .parse::<u64>()
            .unwrap_or(DEFAULT_LOCK_RETRY_BACKOFF_MS);

        let settings = Self {
            port,
            host,
            network,
            db_path,
            keystore_path,
            internal_token,
            internal_token_required,
            body_limit_bytes: body_limit_mb.saturating_mul(1024 * 1024),
            audit_enabled,
            lock_ttl_ms,
            lock_retry_attempts,
            lock_retry_backoff_ms,
            mtls_ca_path: env_opt("SIGNER_MTLS_CA_PATH").map(PathBuf::from),
            mtls_cert_path: env_opt("SIGNER_MTLS_CERT_PATH").map(PathBuf::from),
            mtls_key_path: env_opt("SIGNER_MTLS_KEY_PATH").map(PathBuf::from),
        };

        if let Some(message) = network_error {
            tracing::warn!("{message} Falling back to {network}.");
        }

        settings
    }

    /// Create settings for tests.
    pub fn for_tests() -> Self {
        Self {
            port: DEFAULT_PORT,
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            network: Network::Test,
            db_path: PathBuf::from("./.data/test.redb"),
            keystore_path: Some(PathBuf::from("./.data/test-keystore.json")),
            internal_token: None,
            internal_token_required: false,
            body_limit_bytes: DEFAULT_BODY_LIMIT_MB * 1024 * 1024,
            audit_enabled: true,
            lock_ttl_ms: DEFAULT_LOCK_TTL_MS,
            lock_retry_attempts: 3,
            lock_retry_backoff_ms: 5,
            mtls_ca_path: None,
            mtls_cert_path: None,
            mtls_key_path: None,
        }
    }

    /// Validate settings.
    ///
    /// Returns an error message if validation fails.
    pub fn validate(&self) -> Result<(), String> {
        if self.internal_token_required && self.internal_token.is_none() {
            return Err("INTERNAL_SERVICE_TOKEN is required in production. \
                 Set INTERNAL_SERVICE_TOKEN or INTERNAL_SERVICE_TOKEN_REQUIRED=0."
                .to_string());
        }

        if self.keystore_path.is_none() {
            return Err("SIGNER_KEYSTORE_PATH is required. \
                 Provide the JSON keystore holding the validator keys."
                .to_string());
        }

        if self.lock_retry_attempts == 0 {
            return Err("SIGNER_LOCK_RETRY_ATTEMPTS must be at least 1.".to_string());
        }

        if self.lock_ttl_ms == 0 {
            return Err("SIGNER_LOCK_TTL_MS must be greater than zero.".to_string());
        }

        if self.lock_ttl_ms > MAX_LOCK_TTL_MS {
            return Err(format!("SIGNER_LOCK_TTL_MS must be at most {MAX_LOCK_TTL_MS} (one hour)."));
        }

        // mTLS validation: if any mTLS path is set, all must be set
        let mtls_paths = [
            &self.mtls_ca_path,
            &self.mtls_cert_path,
            &self.mtls_key_path,
        ];
        let mtls_count = mtls_paths.iter().filter(|p| p.is_some()).count();
        if mtls_count > 0 && mtls_count < 3 {
            return Err("Incomplete mTLS configuration. Set all of: \
                 SIGNER_MTLS_CA_PATH, SIGNER_MTLS_CERT_PATH, SIGNER_MTLS_KEY_PATH"
                .to_string());
        }

        Ok(())
    }

    // Builders used by tests and embedders

    #[must_use]
    pub fn with_lock_ttl(mut self, ttl: Duration) -> Self {
        self.lock_ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        self
    }

    #[must_use]
    pub fn with_keystore_path(mut self, path: PathBuf) -> Self {
        self.keystore_path = Some(path);
        self
    }

    // Getters

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn db_path(&self) -> &PathBuf {
        &self.db_path
    }

    pub fn keystore_path(&self) -> Option<&PathBuf> {
        self.keystore_path.as_ref()
    }

    pub fn internal_token(&self) -> Option<&str> {
        self.internal_token.as_deref()
    }

    pub fn internal_token_required(&self) -> bool {
        self.internal_token_required
    }

    pub fn body_limit_bytes(&self) -> usize {
        self.body_limit_bytes
    }

    pub fn audit_enabled(&self) -> bool {
        self.audit_enabled
    }

    /// Lock acquisition policy derived from the lock settings.
    pub fn lock_policy(&self) -> LockPolicy {
        LockPolicy {
            ttl: Duration::from_millis(self.lock_ttl_ms),
            max_attempts: self.lock_retry_attempts,
            initial_backoff: Duration::from_millis(self.lock_retry_backoff_ms),
        }
    }

    pub fn mtls_ca_path(&self) -> Option<&PathBuf> {
        self.mtls_ca_path.as_ref()
    }

    pub fn mtls_cert_path(&self) -> Option<&PathBuf> {
        self.mtls_cert_path.as_ref()
    }

    pub fn mtls_key_path(&self) -> Option<&PathBuf> {
        self.mtls_key_path.as_ref()
    }

    /// Check if mTLS is configured.
    pub fn mtls_enabled(&self) -> bool {
        self.mtls_ca_path.is_some() && self.mtls_cert_path.is_some() && self.mtls_key_path.is_some()
    }
}
