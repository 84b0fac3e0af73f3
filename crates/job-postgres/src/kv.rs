//! Redis-backed `SharedKv` (rate limiting) and `CancellationSignal`.
//!
//! Ported from `rate_limiter.py`'s Redis pipeline
//! (`ZREMRANGEBYSCORE`/`ZCARD`/`ZADD`/`EXPIRE`) using sorted sets keyed by
//! principal, rather than `redis-rs`'s connection-manager retry alone —
//! errors still propagate so `SlidingWindowLimiter` can degrade to its
//! local fallback per spec.md §4.3.

use chrono::{DateTime, Utc};
use job_core::ratelimit::SharedKv;
use job_core::ports::CancellationSignal;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use uuid::Uuid;

pub struct RedisKv {
    conn: ConnectionManager,
}

impl RedisKv {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait::async_trait]
impl SharedKv for RedisKv {
    async fn record_and_count(&self, key: &str, period_seconds: i64, now: DateTime<Utc>) -> anyhow::Result<(u32, DateTime<Utc>)> {
        let mut conn = self.conn.clone();
        let now_ms = now.timestamp_millis();
        let cutoff_ms = now_ms - period_seconds * 1000;

        let (_, count, oldest): (i64, i64, Option<Vec<(String, i64)>>) = redis::pipe()
            .atomic()
            .zrembyscore(key, "-inf", cutoff_ms)
            .zcard(key)
            .zrange_withscores(key, 0, 0)
            .query_async(&mut conn)
            .await?;

        let _: () = conn.zadd(key, now_ms, now_ms).await?;
        let _: () = conn.expire(key, period_seconds as i64).await?;

        let oldest_ms = oldest
            .and_then(|items| items.first().map(|(_, score)| *score))
            .unwrap_or(now_ms);
        let oldest_dt = DateTime::from_timestamp_millis(oldest_ms).unwrap_or(now);

        Ok(((count + 1) as u32, oldest_dt))
    }
}

/// Cancellation side channel: `cancel:<job_id>=1` with a short TTL (spec.md
/// §6 "Cancellation signal").
pub struct RedisCancellationSignal {
    conn: ConnectionManager,
}

impl RedisCancellationSignal {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    fn key(job_id: Uuid) -> String {
        format!("cancel:{job_id}")
    }
}

#[async_trait::async_trait]
impl CancellationSignal for RedisCancellationSignal {
    async fn set(&self, job_id: Uuid, ttl_seconds: u64) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.set_ex(Self::key(job_id), 1, ttl_seconds).await?;
        Ok(())
    }

    async fn is_set(&self, job_id: Uuid) -> anyhow::Result<bool> {
        let mut conn = self.conn.clone();
        let exists: bool = conn.exists(Self::key(job_id)).await?;
        Ok(exists)
    }
}
