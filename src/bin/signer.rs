//! Validator Signer
//!
//! Signs attestations, block proposals, and aggregation data for the
//! validator keys in the configured keystore.
//!
//! ## Security
//!
//! - Slashing protection watermarks and account locks live in redb and are
//!   shared by every worker; a second process cannot open the same database
//! - Signing routes require the internal service token in production
//! - mTLS is enabled when all `SIGNER_MTLS_*` paths are set

use std::sync::Arc;

use actix_web::{App, HttpServer, middleware, web};
use serde_json::json;
use tracing_actix_web::TracingLogger;
use validator_signer::{
    audit::{AuditActor, AuditEventType, AuditLogger, AuditOutcome},
    config::Settings,
    middleware::{InternalAuth, RateLimitConfig, signing_config, signing_limiter},
    routes,
    signing::{LocalKeyCustody, SigningService},
    storage::Storage,
    telemetry, tls,
};

fn exit_with(message: &str, error: &dyn std::fmt::Display) -> ! {
    tracing::error!(error = %error, "{message}");
    telemetry::shutdown_tracing();
    std::process::exit(1);
}

fn record_lifecycle(
    audit: Option<&AuditLogger>,
    event: AuditEventType,
    context: serde_json::Value,
) {
    if let Some(audit) = audit
        && let Err(e) = audit.append(
            event,
            AuditActor::System,
            None,
            AuditOutcome::Success,
            Some(context),
        )
    {
        tracing::error!(error = %e, event = %event, "Failed to append audit entry");
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    telemetry::init_tracing();

    let settings = Settings::from_env();
    if let Err(message) = settings.validate() {
        exit_with("Invalid configuration", &message);
    }

    let storage = match Storage::open(settings.db_path()) {
        Ok(storage) => storage,
        Err(e) => exit_with("Failed to open storage database", &e),
    };

    let Some(keystore_path) = settings.keystore_path() else {
        exit_with("Invalid configuration", &"SIGNER_KEYSTORE_PATH is required");
    };
    tls::check_key_permissions(keystore_path);
    let custody = match LocalKeyCustody::load(keystore_path) {
        Ok(custody) => custody,
        Err(e) => exit_with("Failed to load keystore", &e),
    };
    if custody.is_empty() {
        tracing::warn!(keystore = %keystore_path.display(), "Keystore holds no accounts");
    }
    let account_count = custody.len();

    let audit = if settings.audit_enabled() {
        match AuditLogger::new(storage.clone()) {
            Ok(audit) => {
                tracing::info!(
                    audit_key = %audit.verifying_key_hex(),
                    seq = audit.current_seq(),
                    "Audit log enabled"
                );
                Some(Arc::new(audit))
            }
            Err(e) => exit_with("Failed to open audit log", &e),
        }
    } else {
        tracing::warn!("Audit log DISABLED. Set SIGNER_AUDIT_ENABLED=true for production.");
        None
    };

    let mut signing_service =
        SigningService::new(storage.clone(), Arc::new(custody), settings.lock_policy());
    if let Some(audit) = &audit {
        signing_service = signing_service.with_audit(audit.clone());
    }

    let rate_limits = RateLimitConfig::from_env();
    let limiter_config = match signing_config(&rate_limits) {
        Ok(config) => config,
        Err(e) => exit_with("Failed to build rate limiter", &e),
    };
    let tls_config = match tls::server_config(&settings) {
        Ok(config) => config,
        Err(e) => exit_with("Failed to load mTLS configuration", &e),
    };

    let addr = settings.socket_addr();
    let network = settings.network();
    let lock_policy = settings.lock_policy();

    tracing::info!(
        addr = %addr,
        network = %network,
        db = %settings.db_path().display(),
        accounts = account_count,
        lock_ttl_ms = u64::try_from(lock_policy.ttl.as_millis()).unwrap_or(u64::MAX),
        lock_attempts = lock_policy.max_attempts,
        signing_per_second = rate_limits.signing_per_second,
        internal_auth = settings.internal_token_required(),
        "Starting validator signer"
    );
    record_lifecycle(
        audit.as_deref(),
        AuditEventType::ServiceStart,
        json!({ "network": network, "accounts": account_count }),
    );

    let auth = InternalAuth::new(&settings);
    let json_limit = settings.body_limit_bytes();
    let settings_data = web::Data::new(settings.clone());
    let service_data = web::Data::new(signing_service);
    let storage_data = web::Data::new(storage);

    let server = HttpServer::new(move || {
        App::new()
            .wrap(auth.clone())
            .wrap(
                middleware::DefaultHeaders::new()
                    .add(("X-Service", "validator-signer"))
                    .add(("X-Network", network.to_string())),
            )
            .wrap(TracingLogger::default())
            .app_data(settings_data.clone())
            .app_data(service_data.clone())
            .app_data(storage_data.clone())
            .app_data(routes::json_config(json_limit))
            .configure(routes::health::configure)
            .service(routes::signing::scope().wrap(signing_limiter(&limiter_config)))
    });

    if let Some(tls_config) = tls_config {
        tracing::info!("Starting signer with mTLS enabled");
        server.bind_rustls_0_23(addr, tls_config)?.run().await?;
    } else {
        tracing::warn!(
            "Starting signer WITHOUT mTLS - development mode only! \
             Set SIGNER_MTLS_CA_PATH, SIGNER_MTLS_CERT_PATH, SIGNER_MTLS_KEY_PATH for production."
        );
        server.bind(addr)?.run().await?;
    }

    record_lifecycle(
        audit.as_deref(),
        AuditEventType::ServiceStop,
        json!({ "network": network }),
    );
    telemetry::shutdown_tracing();

    Ok(())
}
