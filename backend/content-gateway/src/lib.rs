//! Content gateway: rate limiting, authentication and route access in front
//! of the content API.

pub mod config;
pub mod health;
pub mod principal_store;
pub mod routes;

use actix_middleware::{AccessPolicy, AuthGate, CounterStore, PrincipalStore, RateLimiter};
use anyhow::{Context, Result};
use crypto_core::TokenCodec;
use std::sync::Arc;

use crate::config::Config;

/// Shared, immutable gate components handed to every worker
#[derive(Clone)]
pub struct Gateway {
    pub limiter: Arc<RateLimiter>,
    pub auth: AuthGate,
    pub access: Arc<AccessPolicy>,
    pub codec: Arc<TokenCodec>,
}

impl Gateway {
    pub fn new(
        config: &Config,
        counters: Arc<dyn CounterStore>,
        principals: Arc<dyn PrincipalStore>,
    ) -> Result<Self> {
        let codec = Arc::new(
            TokenCodec::new(&config.auth.jwt_secret, config.token_ttl())
                .context("Failed to initialize token codec")?,
        );

        let policies = config
            .policy_table()
            .context("Invalid rate limit categories")?;
        let limiter = Arc::new(RateLimiter::new(counters, policies, config.rate_limit_config()));

        let auth = AuthGate::new(codec.clone(), principals).with_lookup_timeout(config.principal_timeout());

        Ok(Self {
            limiter,
            auth,
            access: Arc::new(AccessPolicy::builtin()),
            codec,
        })
    }
}
