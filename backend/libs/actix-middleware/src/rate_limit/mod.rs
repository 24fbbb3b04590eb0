//! Redis-backed, category-aware rate limiting
//!
//! Every request is classified into a category by path, counted against the
//! caller's identity in a fixed window, and either annotated with
//! `X-Rate-Limit-*` headers or rejected with 429 before reaching the rest of
//! the chain.

pub mod limiter;
pub mod policy;
pub mod store;

pub use limiter::{Decision, FailureMode, RateLimitConfig, RateLimiter};
pub use policy::{builtin_rules, CategoryPolicy, PolicyError, PolicyTable, DEFAULT_CATEGORY};
pub use store::{CounterStore, InMemoryCounterStore, RedisCounterStore, StoreError};

use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::{HeaderMap, HeaderName, HeaderValue},
    Error,
};
use futures::future::{ready, LocalBoxFuture, Ready};
use std::rc::Rc;
use std::sync::Arc;

use crate::client_ip::client_identity;
use crate::error::{GateError, X_RATE_LIMIT_LIMIT, X_RATE_LIMIT_REMAINING, X_RATE_LIMIT_RESET};
use crate::metrics::{RATE_LIMIT_EXCEEDED_TOTAL, RATE_LIMIT_STORE_ERRORS_TOTAL};

pub struct RateLimitMiddleware {
    limiter: Arc<RateLimiter>,
}

impl RateLimitMiddleware {
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self { limiter }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RateLimitMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = RateLimitMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RateLimitMiddlewareService {
            service: Rc::new(service),
            limiter: self.limiter.clone(),
        }))
    }
}

pub struct RateLimitMiddlewareService<S> {
    service: Rc<S>,
    limiter: Arc<RateLimiter>,
}

impl<S, B> Service<ServiceRequest> for RateLimitMiddlewareService<S>
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
        let limiter = self.limiter.clone();

        Box::pin(async move {
            let identity = client_identity(&req);
            let path = req.path().to_string();
            let policy = limiter.classify(&path).clone();

            match limiter.admit(&identity, &policy).await {
                Ok(Decision::Allowed {
                    limit,
                    remaining,
                    reset_seconds,
                }) => {
                    let mut res = service.call(req).await?;
                    apply_rate_limit_headers(res.headers_mut(), limit, remaining, reset_seconds);
                    Ok(res.map_into_left_body())
                }
                Ok(Decision::Rejected {
                    limit,
                    retry_after_seconds,
                }) => {
                    RATE_LIMIT_EXCEEDED_TOTAL
                        .with_label_values(&[&policy.name])
                        .inc();
                    tracing::warn!(
                        client = %identity,
                        path = %path,
                        category = %policy.name,
                        limit,
                        retry_after_seconds,
                        "Rate limit exceeded"
                    );

                    let response = GateError::RateLimitExceeded {
                        limit,
                        retry_after_seconds,
                    }
                    .to_response(&path);
                    Ok(req.into_response(response).map_into_right_body())
                }
                Err(e) => match limiter.failure_mode() {
                    FailureMode::FailOpen => {
                        RATE_LIMIT_STORE_ERRORS_TOTAL
                            .with_label_values(&["fail_open"])
                            .inc();
                        tracing::warn!(
                            client = %identity,
                            category = %policy.name,
                            error = %e,
                            "Rate limit store unavailable (allowing request)"
                        );
                        let res = service.call(req).await?;
                        Ok(res.map_into_left_body())
                    }
                    FailureMode::FailClosed => {
                        RATE_LIMIT_STORE_ERRORS_TOTAL
                            .with_label_values(&["fail_closed"])
                            .inc();
                        tracing::error!(
                            client = %identity,
                            category = %policy.name,
                            error = %e,
                            "Rate limit store unavailable (rejecting request)"
                        );
                        let response =
                            GateError::CounterStoreUnavailable(e.to_string()).to_response(&path);
                        Ok(req.into_response(response).map_into_right_body())
                    }
                },
            }
        })
    }
}

/// Attach the informational headers to an admitted response
pub fn apply_rate_limit_headers(headers: &mut HeaderMap, limit: u32, remaining: u64, reset_seconds: u64) {
    headers.insert(HeaderName::from_static(X_RATE_LIMIT_LIMIT), HeaderValue::from(limit));
    headers.insert(HeaderName::from_static(X_RATE_LIMIT_REMAINING), HeaderValue::from(remaining));
    headers.insert(HeaderName::from_static(X_RATE_LIMIT_RESET), HeaderValue::from(reset_seconds));
}
