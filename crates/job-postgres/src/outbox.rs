//! `Broker` implemented as a durable outbox table.
//!
//! The core is explicitly "a producer and consumer-coordinator against an
//! external broker" (spec.md §1), never the broker itself. This adapter
//! commits a `broker_outbox` row and returns its id as the task id; a
//! process outside this core's scope drains `pending` rows onto the real
//! broker. Grounded on `sem_os_server::main`'s `OutboxDispatcher` — same
//! "insert now, drain later" shape, applied here to outbound task
//! publishing instead of outbound domain events.

use job_queue::broker::{Broker, BrokerError, PublishRequest};
use sqlx::PgPool;
use uuid::Uuid;

pub struct OutboxBroker {
    pool: PgPool,
}

impl OutboxBroker {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl Broker for OutboxBroker {
    async fn publish(&self, request: PublishRequest<'_>) -> Result<String, BrokerError> {
        let id = Uuid::now_v7();
        sqlx::query(
            "INSERT INTO broker_outbox (id, exchange, queue, routing_key, body, compressed, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(id)
        .bind(request.exchange)
        .bind(request.queue)
        .bind(request.routing_key)
        .bind(&request.body)
        .bind(request.compressed)
        .bind(chrono::Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| BrokerError::Operational(e.to_string()))?;
        Ok(id.to_string())
    }
}
