//! Payment webhook deduplication and exactly-once processing.

pub mod model;
pub mod processor;
pub mod signature;

pub use model::{
    InvoicePaidStatus, ParsedWebhookPayload, Payment, PaymentAuditLog, PaymentStatus, WebhookEvent,
    WebhookStatus,
};
pub use processor::{
    PaymentTransactionPort, ProcessOutcome, WebhookEventStore, WebhookProcessor,
    DEFAULT_LOCK_TIMEOUT_SECONDS, MAX_BACKOFF_SECONDS, MAX_RETRIES,
};
pub use signature::{HmacSha256Verifier, SignatureVerifier};
