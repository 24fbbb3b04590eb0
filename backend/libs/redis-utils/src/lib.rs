use anyhow::{Context, Result};
use redis::aio::ConnectionManager;
use redis::{Client, ConnectionInfo, IntoConnectionInfo, RedisError};
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::info;

/// Redis connection handle shared by the rate limiter and health checks.
///
/// `ConnectionManager` multiplexes one connection and reconnects on failure;
/// cloning it is cheap and every clone shares the same connection.
#[derive(Clone)]
pub struct RedisPool {
    manager: ConnectionManager,
    addr_label: String,
}

impl RedisPool {
    /// Connect to `redis_url`, giving up after `connect_timeout`.
    pub async fn connect(redis_url: &str, connect_timeout: Duration) -> Result<Self> {
        let info: ConnectionInfo = redis_url
            .into_connection_info()
            .context("failed to parse REDIS_URL connection string")?;
        let addr_label = info.addr.to_string();

        let client = Client::open(info).context("failed to construct Redis client")?;
        let manager = timeout(connect_timeout, ConnectionManager::new(client))
            .await
            .with_context(|| format!("timed out connecting to Redis at {}", addr_label))?
            .context("failed to initialize Redis connection manager")?;

        info!(addr = %addr_label, "Redis connection established");

        Ok(Self {
            manager,
            addr_label,
        })
    }

    pub fn manager(&self) -> ConnectionManager {
        self.manager.clone()
    }

    pub fn addr(&self) -> &str {
        &self.addr_label
    }

    /// Round-trip a PING and report its latency.
    pub async fn ping(&self) -> Result<Duration, RedisError> {
        let mut conn = self.manager.clone();
        let start = Instant::now();
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        if pong == "PONG" {
            Ok(start.elapsed())
        } else {
            Err(RedisError::from((
                redis::ErrorKind::ResponseError,
                "unexpected PING response",
            )))
        }
    }
}
