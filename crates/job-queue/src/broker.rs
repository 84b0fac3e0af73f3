//! The `Broker` port: a durable, routed, at-least-once topic broker. The
//! core is "a producer and consumer-coordinator against an external broker"
//! (spec.md §1), never the broker itself — this trait is the seam.

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("broker operation failed: {0}")]
    Operational(String),
}

/// One publish attempt's wire payload, already JSON-encoded and optionally
/// gzip-compressed by the `QueuePublisher` (spec.md §4.6).
pub struct PublishRequest<'a> {
    pub exchange: &'a str,
    pub queue: &'a str,
    pub routing_key: &'a str,
    pub body: Vec<u8>,
    pub compressed: bool,
}

#[async_trait::async_trait]
pub trait Broker: Send + Sync {
    /// Publishes one envelope, returning the broker-assigned task id used as
    /// `Job::broker_task_id`.
    async fn publish(&self, request: PublishRequest<'_>) -> Result<String, BrokerError>;
}

/// Fixed topic exchange name (spec.md §6: "the `exchange` is a fixed topic
/// exchange").
pub const TOPIC_EXCHANGE: &str = "jobs.topic";
