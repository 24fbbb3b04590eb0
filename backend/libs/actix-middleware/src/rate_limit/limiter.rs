//! Fixed-window admission decisions
//!
//! One counter per (client identity, category). The first increment of a
//! window sets the key's expiry; later increments never touch it, so the
//! window closes on schedule under sustained load. A counter found without
//! any expiry gets one on the spot. Up to twice the limit can pass across a
//! window boundary.

use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::policy::{CategoryPolicy, PolicyTable};
use super::store::{CounterStore, StoreError};

/// What to do when the counter store cannot be reached
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureMode {
    /// Let the request through and log
    #[default]
    FailOpen,
    /// Reject with 503
    FailClosed,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Upper bound for one admission round trip, in milliseconds
    pub store_timeout_ms: u64,
    pub failure_mode: FailureMode,
    pub key_prefix: String,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            store_timeout_ms: 100, // Fast timeout to prevent blocking
            failure_mode: FailureMode::FailOpen,
            key_prefix: "rate-limit".to_string(),
        }
    }
}

/// Outcome of one admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed {
        limit: u32,
        remaining: u64,
        reset_seconds: u64,
    },
    Rejected {
        limit: u32,
        retry_after_seconds: u64,
    },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed { .. })
    }
}

/// Rate limiter service, injected into the middleware
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    policies: PolicyTable,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CounterStore>, policies: PolicyTable, config: RateLimitConfig) -> Self {
        Self {
            store,
            policies,
            config,
        }
    }

    pub fn classify(&self, path: &str) -> &CategoryPolicy {
        self.policies.classify(path)
    }

    pub fn policies(&self) -> &PolicyTable {
        &self.policies
    }

    pub fn failure_mode(&self) -> FailureMode {
        self.config.failure_mode
    }

    pub fn counter_key(&self, identity: &str, category: &str) -> String {
        format!("{}:{}:{}", self.config.key_prefix, identity, category)
    }

    /// Count one request from `identity` against `policy`.
    ///
    /// The whole exchange is bounded by `store_timeout_ms`; a slow or failing
    /// store surfaces as `StoreError` and the caller applies the failure mode.
    pub async fn admit(&self, identity: &str, policy: &CategoryPolicy) -> Result<Decision, StoreError> {
        let budget = self.config.store_timeout_ms;
        timeout(Duration::from_millis(budget), self.admit_inner(identity, policy))
            .await
            .map_err(|_| StoreError::Timeout(budget))?
    }

    async fn admit_inner(&self, identity: &str, policy: &CategoryPolicy) -> Result<Decision, StoreError> {
        let key = self.counter_key(identity, &policy.name);
        let window_seconds = policy.window.as_secs();

        let count = self.store.incr(&key).await?;

        // Only the creating increment opens the window
        if count == 1 {
            self.store.expire(&key, policy.window).await?;
        }

        let ttl = match self.store.ttl(&key).await {
            Ok(Some(seconds)) if seconds > 0 => seconds,
            Ok(Some(_)) => window_seconds,
            Ok(None) => {
                // Counter left without expiry by an interrupted first EXPIRE
                self.store.expire(&key, policy.window).await?;
                window_seconds
            }
            Err(e) => {
                warn!(key = %key, error = %e, "TTL lookup failed, assuming full window");
                window_seconds
            }
        };

        let limit = policy.limit;
        if count > u64::from(limit) {
            debug!(key = %key, count, limit, "Admission rejected");
            return Ok(Decision::Rejected {
                limit,
                retry_after_seconds: ttl,
            });
        }

        Ok(Decision::Allowed {
            limit,
            remaining: u64::from(limit).saturating_sub(count),
            reset_seconds: ttl,
        })
    }
}
