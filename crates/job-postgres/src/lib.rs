//! `sqlx::Postgres` implementations of every port trait declared upstream,
//! plus embedded migrations. Mirrors the `sem_os_postgres` crate's role in
//! the teacher workspace: the only crate here that links against `sqlx`.

pub mod job_store;
pub mod kv;
pub mod license_store;
pub mod notify_store;
pub mod outbox;
pub mod webhook_store;

pub use job_store::{PgArtefactStore, PgJobStore};
pub use kv::{RedisCancellationSignal, RedisKv};
pub use license_store::PgLicenseReader;
pub use notify_store::{PgAttemptStore, PgDeliveryStore, PgTemplateResolver};
pub use outbox::OutboxBroker;
pub use webhook_store::{PgPaymentTransaction, PgWebhookEventStore};

use sqlx::PgPool;

/// Runs the embedded migration set (grounded on
/// `bpmn-lite-core::store_postgres::PostgresProcessStore::migrate`'s
/// `sqlx::migrate!` usage).
pub async fn migrate(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Bundles every adapter behind its port trait so `job-server::main` can
/// build one `PgStores` and hand out `Arc<dyn Trait>` references, following
/// `sem_os_server::main`'s `PgStores` wiring.
pub struct PgStores {
    pub jobs: std::sync::Arc<PgJobStore>,
    pub artefacts: std::sync::Arc<PgArtefactStore>,
    pub licenses: std::sync::Arc<PgLicenseReader>,
    pub templates: std::sync::Arc<PgTemplateResolver>,
    pub deliveries: std::sync::Arc<PgDeliveryStore>,
    pub attempts: std::sync::Arc<PgAttemptStore>,
    pub webhook_events: std::sync::Arc<PgWebhookEventStore>,
    pub payment_transactions: std::sync::Arc<PgPaymentTransaction>,
    pub broker: std::sync::Arc<OutboxBroker>,
}

impl PgStores {
    pub fn new(pool: PgPool) -> Self {
        Self {
            jobs: std::sync::Arc::new(PgJobStore::new(pool.clone())),
            artefacts: std::sync::Arc::new(PgArtefactStore::new(pool.clone())),
            licenses: std::sync::Arc::new(PgLicenseReader::new(pool.clone())),
            templates: std::sync::Arc::new(PgTemplateResolver::new(pool.clone())),
            deliveries: std::sync::Arc::new(PgDeliveryStore::new(pool.clone())),
            attempts: std::sync::Arc::new(PgAttemptStore::new(pool.clone())),
            webhook_events: std::sync::Arc::new(PgWebhookEventStore::new(pool.clone())),
            payment_transactions: std::sync::Arc::new(PgPaymentTransaction::new(pool.clone())),
            broker: std::sync::Arc::new(OutboxBroker::new(pool)),
        }
    }
}
