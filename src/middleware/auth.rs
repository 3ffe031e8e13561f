//! Internal authentication for the signing endpoints.
//!
//! When `INTERNAL_SERVICE_TOKEN` is required (production) every non-public
//! request must carry it. Outside production a configured token is still
//! checked if the caller sends one. `/health` and `/build-info` stay public.

use actix_web::body::{EitherBody, MessageBody};
use actix_web::dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready};
use actix_web::{Error, ResponseError};
use futures_util::future::{LocalBoxFuture, Ready, ready};

use crate::config::Settings;
use crate::error::SignerError;

/// Middleware enforcing internal service token authentication.
#[derive(Clone)]
pub struct InternalAuth {
    required: bool,
    token: Option<String>,
}

impl InternalAuth {
    /// Build from service settings.
    pub fn new(settings: &Settings) -> Self {
        Self {
            required: settings.internal_token_required(),
            token: settings.internal_token().map(ToString::to_string),
        }
    }

    pub fn from_config(required: bool, token: Option<String>) -> Self {
        Self { required, token }
    }

    fn is_public_path(path: &str) -> bool {
        matches!(path, "/health" | "/build-info")
    }

    /// `Authorization: Bearer <token>` first, then `X-Internal-Token`.
    fn extract_token(req: &ServiceRequest) -> Option<String> {
        let headers = req.headers();

        let bearer = headers
            .get("authorization")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "));
        let header = || {
            headers
                .get("x-internal-token")
                .and_then(|value| value.to_str().ok())
        };

        bearer.or_else(header).map(|token| token.trim().to_string())
    }

    fn authorize(required: bool, expected: Option<&str>, provided: Option<&str>) -> bool {
        match (expected, provided) {
            (Some(expected), Some(provided)) => constant_time_eq(expected, provided),
            (Some(_), None) | (None, _) => !required,
        }
    }
}

/// Compare tokens without short-circuiting on the first differing byte.
fn constant_time_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

impl<S, B> Transform<S, ServiceRequest> for InternalAuth
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = InternalAuthMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(InternalAuthMiddleware {
            service,
            required: self.required,
            token: self.token.clone(),
        }))
    }
}

pub struct InternalAuthMiddleware<S> {
    service: S,
    required: bool,
    token: Option<String>,
}

impl<S, B> Service<ServiceRequest> for InternalAuthMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        if !InternalAuth::is_public_path(req.path()) {
            let provided = InternalAuth::extract_token(&req);

            if !InternalAuth::authorize(self.required, self.token.as_deref(), provided.as_deref()) {
                tracing::warn!(
                    path = %req.path(),
                    token_present = provided.is_some(),
                    "Rejected unauthenticated request"
                );
                let (req, _pl) = req.into_parts();
                let response = SignerError::Unauthorized.error_response();
                return Box::pin(async move {
                    Ok(ServiceResponse::new(req, response.map_into_right_body()))
                });
            }
        }

        let fut = self.service.call(req);
        Box::pin(async move { fut.await.map(ServiceResponse::map_into_left_body) })
    }
}
