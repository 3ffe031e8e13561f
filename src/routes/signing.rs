//! Signing HTTP endpoints.
//!
//! Thin adapters from JSON bodies to [`SigningService`]. All byte fields stay
//! hex strings here; decoding happens inside the service before any lookup.

use actix_web::{HttpResponse, ResponseError, error::JsonPayloadError, web};

use crate::error::SignerError;
use crate::signing::{
    SignAggregationRequest, SignAttestationRequest, SignProposalRequest, SigningService,
};

fn log_failure(e: &SignerError, message: &str) {
    if e.status_code().is_server_error() {
        tracing::error!(error = %e, code = e.error_code(), "{message}");
    } else {
        tracing::warn!(error = %e, code = e.error_code(), "{message}");
    }
}

/// POST /accounts/sign-attestation
///
/// Sign attestation data after slashing protection checks.
#[tracing::instrument(skip(service, request), fields(slot = request.slot, source_epoch = request.source_epoch, target_epoch = request.target_epoch))]
pub async fn sign_attestation(
    service: web::Data<SigningService>,
    request: web::Json<SignAttestationRequest>,
) -> HttpResponse {
    match service.sign_attestation(&request).await {
        Ok(response) => HttpResponse::Ok().json(response),
        Err(e) => {
            log_failure(&e, "Attestation signing failed");
            e.error_response()
        }
    }
}

/// POST /accounts/sign-proposal
///
/// Sign a block header after slashing protection checks.
#[tracing::instrument(skip(service, request), fields(slot = request.slot, proposer_index = request.proposer_index))]
pub async fn sign_proposal(
    service: web::Data<SigningService>,
    request: web::Json<SignProposalRequest>,
) -> HttpResponse {
    match service.sign_proposal(&request).await {
        Ok(response) => HttpResponse::Ok().json(response),
        Err(e) => {
            log_failure(&e, "Proposal signing failed");
            e.error_response()
        }
    }
}

/// POST /accounts/sign-aggregation
///
/// Sign opaque aggregation data. No slashing protection applies.
#[tracing::instrument(skip(service, request))]
pub async fn sign_aggregation(
    service: web::Data<SigningService>,
    request: web::Json<SignAggregationRequest>,
) -> HttpResponse {
    match service.sign_aggregation(&request).await {
        Ok(response) => HttpResponse::Ok().json(response),
        Err(e) => {
            log_failure(&e, "Aggregation signing failed");
            e.error_response()
        }
    }
}

/// JSON extractor config: body size limit, and malformed bodies reported as
/// `InvalidInput`.
pub fn json_config(limit: usize) -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(limit)
        .error_handler(|err, _req| {
            let message = match &err {
                JsonPayloadError::OverflowKnownLength { .. }
                | JsonPayloadError::Overflow { .. } => "Request body too large".to_string(),
                other => format!("Invalid request body: {other}"),
            };
            SignerError::InvalidInput(message).into()
        })
}

/// The `/accounts` scope, for callers that wrap it in extra middleware.
pub fn scope() -> actix_web::Scope {
    web::scope("/accounts")
        .route("/sign-attestation", web::post().to(sign_attestation))
        .route("/sign-proposal", web::post().to(sign_proposal))
        .route("/sign-aggregation", web::post().to(sign_aggregation))
}

/// Configure signing routes.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(scope());
}
