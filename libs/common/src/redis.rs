//! Pooled Redis client
//!
//! Only the operations the document store and the shared rate limiter need:
//! hash reads, atomic write-and-publish pipelines, windowed counters and a
//! dedicated pub/sub connection for change feeds.

use anyhow::{Context, Result};
use bb8::{Pool, PooledConnection};
use bb8_redis::RedisConnectionManager;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Pool sizing and timeouts
#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_idle: Option<u32>,
    pub connect_timeout: Duration,
    pub idle_timeout: Option<Duration>,
}

impl RedisConfig {
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: 16,
            min_idle: Some(2),
            connect_timeout: Duration::from_secs(5),
            idle_timeout: Some(Duration::from_secs(600)),
        }
    }
}

#[derive(Clone)]
pub struct RedisClient {
    pool: Arc<Pool<RedisConnectionManager>>,
    url: String,
}

impl std::fmt::Debug for RedisClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.pool.state();
        f.debug_struct("RedisClient")
            .field("url", &self.url)
            .field("connections", &state.connections)
            .field("idle", &state.idle_connections)
            .finish()
    }
}

type Conn<'a> = PooledConnection<'a, RedisConnectionManager>;

impl RedisClient {
    /// Connect with default pool settings and check the server answers
    pub async fn new(url: &str) -> Result<Self> {
        Self::with_config(RedisConfig::from_url(url)).await
    }

    pub async fn with_config(config: RedisConfig) -> Result<Self> {
        let manager = RedisConnectionManager::new(config.url.as_str())
            .with_context(|| format!("Invalid Redis URL: {}", config.url))?;
        let pool = Pool::builder()
            .max_size(config.max_connections)
            .min_idle(config.min_idle)
            .connection_timeout(config.connect_timeout)
            .idle_timeout(config.idle_timeout)
            .build(manager)
            .await
            .context("Failed to build Redis connection pool")?;

        let client = Self {
            pool: Arc::new(pool),
            url: config.url,
        };
        {
            let mut conn = client.conn().await?;
            let _: String = redis::cmd("PING")
                .query_async(&mut *conn)
                .await
                .context("Redis did not answer PING")?;
        }
        Ok(client)
    }

    async fn conn(&self) -> Result<Conn<'_>> {
        self.pool
            .get()
            .await
            .context("No Redis connection available")
    }

    /// Dedicated pub/sub connection; pooled connections cannot subscribe
    pub async fn pubsub(&self) -> Result<redis::aio::PubSub> {
        redis::Client::open(self.url.as_str())
            .with_context(|| format!("Invalid Redis URL: {}", self.url))?
            .get_async_pubsub()
            .await
            .context("Failed to open Redis pub/sub connection")
    }

    pub async fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        let mut conn = self.conn().await?;
        conn.hget(key, field)
            .await
            .with_context(|| format!("HGET {} {}", key, field))
    }

    pub async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>> {
        let mut conn = self.conn().await?;
        conn.hgetall(key)
            .await
            .with_context(|| format!("HGETALL {}", key))
    }

    /// Increment a counter, giving it a TTL when the increment created it
    pub async fn incr_with_expiry(&self, key: &str, ttl_secs: u64) -> Result<i64> {
        let mut conn = self.conn().await?;
        let (count,): (i64,) = redis::pipe()
            .atomic()
            .incr(key, 1)
            .cmd("EXPIRE")
            .arg(key)
            .arg(ttl_secs)
            .arg("NX")
            .ignore()
            .query_async(&mut *conn)
            .await
            .with_context(|| format!("INCR {}", key))?;
        Ok(count)
    }

    /// Apply `(key, field, value)` writes, then publish `(channel, payload)`
    /// messages, all inside one MULTI/EXEC
    pub async fn pipeline_hset_publish(
        &self,
        writes: &[(String, String, String)],
        messages: &[(String, String)],
    ) -> Result<()> {
        if writes.is_empty() && messages.is_empty() {
            return Ok(());
        }

        let mut pipe = redis::pipe();
        pipe.atomic();
        for (key, field, value) in writes {
            pipe.hset(key, field, value).ignore();
        }
        for (channel, payload) in messages {
            pipe.publish(channel, payload).ignore();
        }

        let mut conn = self.conn().await?;
        let () = pipe
            .query_async(&mut *conn)
            .await
            .context("HSET/PUBLISH pipeline failed")?;
        Ok(())
    }
}
