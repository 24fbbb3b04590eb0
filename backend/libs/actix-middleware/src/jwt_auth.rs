//! Authentication gate
//!
//! Per request:
//! - no `Authorization: Bearer` header: pass through unauthenticated; route
//!   access rules decide later whether that is acceptable
//! - bearer credential present: verify it, resolve the subject to a principal,
//!   then either attach the principal and continue or reject with 401
//!
//! Every rejection carries the same body regardless of which check failed.

use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::AUTHORIZATION,
    Error, HttpMessage,
};
use crypto_core::TokenCodec;
use futures::future::{ready, LocalBoxFuture, Ready};
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use crate::error::GateError;
use crate::metrics::AUTH_REJECTIONS_TOTAL;
use crate::principal::{AuthenticatedPrincipal, Principal, PrincipalStore};

const BEARER_PREFIX: &str = "Bearer ";

/// Default bound on a principal lookup
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_millis(500);

/// Everything the gate needs, shared across workers
#[derive(Clone)]
pub struct AuthGate {
    codec: Arc<TokenCodec>,
    principals: Arc<dyn PrincipalStore>,
    lookup_timeout: Duration,
}

impl AuthGate {
    pub fn new(codec: Arc<TokenCodec>, principals: Arc<dyn PrincipalStore>) -> Self {
        Self {
            codec,
            principals,
            lookup_timeout: DEFAULT_LOOKUP_TIMEOUT,
        }
    }

    pub fn with_lookup_timeout(mut self, lookup_timeout: Duration) -> Self {
        self.lookup_timeout = lookup_timeout;
        self
    }

    /// Verify `token` and resolve its subject to an enabled principal
    pub async fn authenticate(&self, token: &str) -> Result<Principal, GateError> {
        let claims = self.codec.verify(token)?;

        let found = timeout(self.lookup_timeout, self.principals.find_by_subject(&claims.sub))
            .await
            .map_err(|_| {
                GateError::PrincipalStoreUnavailable(format!(
                    "lookup timed out after {}ms",
                    self.lookup_timeout.as_millis()
                ))
            })?
            .map_err(|e| GateError::PrincipalStoreUnavailable(e.to_string()))?;

        match found {
            Some(principal) if principal.enabled => Ok(principal),
            _ => Err(GateError::UnknownPrincipal),
        }
    }
}

/// Extract the credential from `Authorization: Bearer <token>`.
///
/// Returns `None` when the header is absent, not valid UTF-8, or uses
/// another scheme.
pub fn bearer_token(req: &ServiceRequest) -> Option<String> {
    req.headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|value| value.strip_prefix(BEARER_PREFIX))
        .map(|token| token.trim().to_string())
}

/// JWT Authentication Middleware
pub struct JwtAuthMiddleware {
    gate: AuthGate,
}

impl JwtAuthMiddleware {
    pub fn new(gate: AuthGate) -> Self {
        Self { gate }
    }
}

impl<S, B> Transform<S, ServiceRequest> for JwtAuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = JwtAuthMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(JwtAuthMiddlewareService {
            service: Rc::new(service),
            gate: self.gate.clone(),
        }))
    }
}

pub struct JwtAuthMiddlewareService<S> {
    service: Rc<S>,
    gate: AuthGate,
}

impl<S, B> Service<ServiceRequest> for JwtAuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let gate = self.gate.clone();

        Box::pin(async move {
            let Some(token) = bearer_token(&req) else {
                let res = service.call(req).await?;
                return Ok(res.map_into_left_body());
            };

            match gate.authenticate(&token).await {
                Ok(principal) => {
                    tracing::debug!(subject = %principal.subject, "Request authenticated");
                    req.extensions_mut().insert(AuthenticatedPrincipal(principal));
                    let res = service.call(req).await?;
                    Ok(res.map_into_left_body())
                }
                Err(e) => {
                    AUTH_REJECTIONS_TOTAL.with_label_values(&[e.reason()]).inc();
                    tracing::warn!(
                        path = %req.path(),
                        reason = e.reason(),
                        "Authentication rejected"
                    );
                    let response = e.to_response(req.path());
                    Ok(req.into_response(response).map_into_right_body())
                }
            }
        })
    }
}
