//! Task envelope, broker port, queue publisher, and queue position service.

pub mod broker;
pub mod coordinator;
pub mod envelope;
pub mod position;
pub mod publisher;

pub use broker::{Broker, BrokerError, PublishRequest, TOPIC_EXCHANGE};
pub use coordinator::{CancelOutcome, CancellationCoordinator, CANCEL_SIGNAL_TTL_SECONDS};
pub use envelope::TaskEnvelope;
pub use position::QueuePositionService;
pub use publisher::{PublishOutcome, QueuePublisher, COMPRESSION_THRESHOLD_BYTES};
