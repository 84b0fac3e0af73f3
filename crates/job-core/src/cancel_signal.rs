//! In-process fallback for the cancellation side channel (spec.md §9:
//! "in-process fallbacks are hash maps keyed by principal and job id
//! respectively, guarded for concurrent access").
//!
//! Mirrors `ratelimit::LocalKv`'s shape: a `dashmap` keyed by identity,
//! storing an expiry instant instead of a timestamp deque, since a
//! cancellation signal is a single boolean-with-TTL rather than a window.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::ports::CancellationSignal;

#[derive(Default)]
pub struct LocalCancellationSignal {
    expirations: DashMap<Uuid, DateTime<Utc>>,
}

impl LocalCancellationSignal {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl CancellationSignal for LocalCancellationSignal {
    async fn set(&self, job_id: Uuid, ttl_seconds: u64) -> anyhow::Result<()> {
        let expires_at = Utc::now() + chrono::Duration::seconds(ttl_seconds as i64);
        self.expirations.insert(job_id, expires_at);
        Ok(())
    }

    async fn is_set(&self, job_id: Uuid) -> anyhow::Result<bool> {
        match self.expirations.get(&job_id) {
            Some(expires_at) => Ok(*expires_at > Utc::now()),
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unset_signal_reads_false() {
        let signal = LocalCancellationSignal::new();
        assert!(!signal.is_set(Uuid::new_v4()).await.unwrap());
    }

    #[tokio::test]
    async fn set_signal_reads_true_until_expiry() {
        let signal = LocalCancellationSignal::new();
        let job_id = Uuid::new_v4();
        signal.set(job_id, 300).await.unwrap();
        assert!(signal.is_set(job_id).await.unwrap());
    }

    #[tokio::test]
    async fn expired_signal_reads_false() {
        let signal = LocalCancellationSignal::new();
        let job_id = Uuid::new_v4();
        signal.expirations.insert(job_id, Utc::now() - chrono::Duration::seconds(1));
        assert!(!signal.is_set(job_id).await.unwrap());
    }
}
