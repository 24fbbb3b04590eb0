//! Counter stores backing the fixed-window rate limiter
//!
//! The limiter needs three primitives: atomic increment, expiry assignment and
//! a remaining-lifetime read. Redis provides them natively (`INCR`, `EXPIRE`,
//! `TTL`); [`InMemoryCounterStore`] mirrors the same semantics in-process.

use async_trait::async_trait;
use dashmap::DashMap;
use redis::{aio::ConnectionManager, AsyncCommands};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("redis command failed: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("counter store did not answer within {0}ms")]
    Timeout(u64),
}

#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Increment `key` by one, creating it at 1 if absent. Returns the new count.
    async fn incr(&self, key: &str) -> Result<u64, StoreError>;

    /// Expire `key` after `window`
    async fn expire(&self, key: &str, window: Duration) -> Result<(), StoreError>;

    /// Whole seconds until `key` expires; `None` if absent or without expiry
    async fn ttl(&self, key: &str) -> Result<Option<u64>, StoreError>;
}

/// Redis-backed counters shared by every gateway instance
#[derive(Clone)]
pub struct RedisCounterStore {
    redis: ConnectionManager,
}

impl RedisCounterStore {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn incr(&self, key: &str) -> Result<u64, StoreError> {
        // ConnectionManager clones share the underlying multiplexed connection
        let mut conn = self.redis.clone();
        let count: u64 = conn.incr(key, 1u64).await?;
        Ok(count)
    }

    async fn expire(&self, key: &str, window: Duration) -> Result<(), StoreError> {
        let mut conn = self.redis.clone();
        let _: () = conn.expire(key, expire_seconds(window)).await?;
        Ok(())
    }

    async fn ttl(&self, key: &str) -> Result<Option<u64>, StoreError> {
        let mut conn = self.redis.clone();
        // -2: key missing, -1: key has no expiry
        let ttl: i64 = conn.ttl(key).await?;
        Ok(u64::try_from(ttl).ok())
    }
}

/// EXPIRE argument for `window`, saturating at `i64::MAX` seconds
fn expire_seconds(window: Duration) -> i64 {
    i64::try_from(window.as_secs()).unwrap_or(i64::MAX)
}

#[derive(Debug, Clone, Copy)]
struct Counter {
    count: u64,
    expires_at: Option<Instant>,
}

impl Counter {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-process counters with Redis-compatible expiry semantics.
///
/// Uses `tokio::time::Instant` so tests can drive windows with a paused clock.
/// Expired entries are dropped lazily when touched, or in bulk by
/// [`InMemoryCounterStore::purge_expired`].
#[derive(Default)]
pub struct InMemoryCounterStore {
    counters: DashMap<String, Counter>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.counters.len();
        self.counters.retain(|_, counter| !counter.is_expired(now));
        before - self.counters.len()
    }

    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn incr(&self, key: &str) -> Result<u64, StoreError> {
        let now = Instant::now();
        // The entry guard holds the shard lock, making read-modify-write atomic
        let mut counter = self.counters.entry(key.to_string()).or_insert(Counter {
            count: 0,
            expires_at: None,
        });
        if counter.is_expired(now) {
            *counter = Counter {
                count: 0,
                expires_at: None,
            };
        }
        counter.count += 1;
        Ok(counter.count)
    }

    async fn expire(&self, key: &str, window: Duration) -> Result<(), StoreError> {
        let now = Instant::now();
        if let Some(mut counter) = self.counters.get_mut(key) {
            if !counter.is_expired(now) {
                counter.expires_at = Some(now + window);
            }
        }
        Ok(())
    }

    async fn ttl(&self, key: &str) -> Result<Option<u64>, StoreError> {
        let now = Instant::now();
        let remaining = self.counters.get(key).and_then(|counter| {
            if counter.is_expired(now) {
                return None;
            }
            counter.expires_at.map(|at| {
                let left = at.saturating_duration_since(now);
                // Round up like a countdown: 59.2s left reads as 60
                left.as_secs() + u64::from(left.subsec_nanos() > 0)
            })
        });
        Ok(remaining)
    }
}
