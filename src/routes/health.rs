//! Health check and build info endpoints.
//!
//! These endpoints are public (no authentication required).

use actix_web::{HttpResponse, web};
use serde::{Deserialize, Serialize};

use crate::config::Settings;
use crate::storage::Storage;

/// Health check response.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct HealthResponse {
    pub status: String,
    pub network: String,
    /// Whether the lock/protection database answers reads.
    pub storage: bool,
}

/// Build information response.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BuildInfoResponse {
    pub service: String,
    pub version: String,
    pub network: String,
    pub git_sha: String,
    pub build_time: String,
}

/// GET /health
///
/// Returns 503 when storage is unreadable, since no request could be
/// protection-checked.
#[tracing::instrument(skip(settings, storage))]
pub async fn health(settings: web::Data<Settings>, storage: web::Data<Storage>) -> HttpResponse {
    let storage_ok = match storage.ping() {
        Ok(()) => true,
        Err(e) => {
            tracing::error!(error = %e, "Storage health check failed");
            false
        }
    };

    let response = HealthResponse {
        status: if storage_ok { "ok" } else { "degraded" }.to_string(),
        network: settings.network().to_string(),
        storage: storage_ok,
    };

    if storage_ok {
        HttpResponse::Ok().json(response)
    } else {
        HttpResponse::ServiceUnavailable().json(response)
    }
}

/// GET /build-info
///
/// Returns build metadata for deployment verification.
#[tracing::instrument(skip(settings))]
pub async fn build_info(settings: web::Data<Settings>) -> HttpResponse {
    let response = BuildInfoResponse {
        service: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        network: settings.network().to_string(),
        git_sha: env!("GIT_SHA").to_string(),
        build_time: env!("BUILD_TIME").to_string(),
    };

    HttpResponse::Ok().json(response)
}

/// Configure health routes on the given scope.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .route("/build-info", web::get().to(build_info));
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{App, test};

    #[actix_rt::test]
    async fn test_health_reports_network() {
        let storage = Storage::open_memory().expect("memory storage");
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(Settings::for_tests()))
                .app_data(web::Data::new(storage))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::get().uri("/health").to_request();
        let resp = test::call_service(&app, req).await;

        assert!(resp.status().is_success());

        let body: HealthResponse = test::read_body_json(resp).await;
        assert_eq!(body.status, "ok");
        assert_eq!(body.network, "test");
        assert!(body.storage);
    }

    #[actix_rt::test]
    async fn test_build_info() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(Settings::for_tests()))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::get().uri("/build-info").to_request();
        let resp = test::call_service(&app, req).await;

        assert!(resp.status().is_success());

        let body: BuildInfoResponse = test::read_body_json(resp).await;
        assert_eq!(body.service, "validator-signer");
        assert_eq!(body.network, "test");
        assert!(!body.git_sha.is_empty());
    }
}
