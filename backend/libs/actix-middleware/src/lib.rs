//! # Actix Middleware Library
//!
//! Request-gating middleware for the content gateway
//!
//! ## Modules
//! - `rate_limit`: category-aware fixed-window rate limiting
//! - `jwt_auth`: bearer credential authentication gate
//! - `authorization`: route access policy
//! - `client_ip`: client identity resolution
//! - `principal`: principals and the principal store contract
//! - `metrics`: Prometheus metrics middleware
//! - `logging`: request logging middleware

pub mod authorization;
pub mod client_ip;
pub mod error;
pub mod jwt_auth;
pub mod logging;
pub mod metrics;
pub mod principal;
pub mod rate_limit;

pub use authorization::{AccessPolicy, AccessPolicyMiddleware, AccessRule, Requirement};
pub use client_ip::{client_identity, resolve_identity};
pub use error::GateError;
pub use jwt_auth::{AuthGate, JwtAuthMiddleware};
pub use logging::Logging;
pub use metrics::MetricsMiddleware;
pub use principal::{
    AuthenticatedPrincipal, InMemoryPrincipalStore, Principal, PrincipalStore, PrincipalStoreError,
};
pub use rate_limit::{
    CategoryPolicy, CounterStore, Decision, FailureMode, InMemoryCounterStore, PolicyTable,
    RateLimitConfig, RateLimitMiddleware, RateLimiter, RedisCounterStore,
};
