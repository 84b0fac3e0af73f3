//! job-server — standalone process entrypoint for the job-orchestration
//! core.
//!
//! Reads config from env vars (see `config::Config::from_env`); the
//! important ones are:
//!   DATABASE_URL               — Postgres connection string (required)
//!   REDIS_URL                  — shared KV for rate limiting/cancellation
//!                                 signaling (optional, local fallback)
//!   BIND_ADDR                  — listen address (default: 0.0.0.0:8080)
//!   WEBHOOK_SECRETS            — "provider:secret,provider:secret"
//!   NOTIFICATION_GATEWAY_URL   — sender gateway (optional, logs otherwise)
//!   USER_DIRECTORY_URL         — contact resolution for the scanner

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use job_core::cancel_signal::LocalCancellationSignal;
use job_core::idempotency::IdempotencyStore;
use job_core::ports::{CancellationSignal, JobStore};
use job_core::ratelimit::SlidingWindowLimiter;
use job_notify::NotificationScanner;
use job_postgres::{PgStores, RedisCancellationSignal, RedisKv};
use job_queue::coordinator::CancellationCoordinator;
use job_queue::position::QueuePositionService;
use job_queue::publisher::QueuePublisher;
use job_server::adapters::{HttpNotificationProvider, HttpUserDirectory, LoggingNotificationProvider};
use job_server::background::dispatcher::{DispatcherLoop, DispatchingDeliveryStore};
use job_server::background::recovery::RecoveryLoop;
use job_server::background::scanner::ScannerLoop;
use job_server::config::Config;
use job_server::intake::JobIntakeService;
use job_server::router::{build_router, RouterState};
use job_webhooks::{HmacSha256Verifier, SignatureVerifier, WebhookProcessor};
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,job_server=debug".into()),
        )
        .init();

    let config = Config::from_env();

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .expect("failed to connect to database");
    job_postgres::migrate(&pool).await.expect("failed to run migrations");
    tracing::info!("connected to database and migrated");

    let stores = PgStores::new(pool.clone());

    let jobs: Arc<dyn JobStore> = stores.jobs.clone();
    let idempotency: Arc<dyn IdempotencyStore> = stores.jobs.clone();
    let artefacts: Arc<dyn job_core::ports::ArtefactStore> = stores.artefacts.clone();

    // Redis is optional: absent, rate limiting and cancellation signaling
    // degrade to in-process fallbacks without rejecting requests (spec.md
    // §5 "loss of KV degrades to local-only behavior").
    let redis_conn = match &config.redis_url {
        Some(url) => match redis::Client::open(url.as_str()) {
            Ok(client) => match client.get_connection_manager().await {
                Ok(conn) => Some(conn),
                Err(err) => {
                    tracing::warn!(error = %err, "failed to connect to redis, running local-only");
                    None
                }
            },
            Err(err) => {
                tracing::warn!(error = %err, "invalid REDIS_URL, running local-only");
                None
            }
        },
        None => None,
    };

    let limiter = Arc::new(match &redis_conn {
        Some(conn) => SlidingWindowLimiter::new(Some(Arc::new(RedisKv::new(conn.clone())))),
        None => SlidingWindowLimiter::local_only(),
    });

    let cancel_signal: Arc<dyn CancellationSignal> = match &redis_conn {
        Some(conn) => Arc::new(RedisCancellationSignal::new(conn.clone())),
        None => Arc::new(LocalCancellationSignal::new()),
    };

    let publisher = Arc::new(QueuePublisher::new(stores.broker.clone()));
    let intake = Arc::new(JobIntakeService::new(
        jobs.clone(),
        idempotency,
        limiter,
        publisher.clone(),
    ));
    let positions = Arc::new(QueuePositionService::new(jobs.clone()));
    let coordinator = Arc::new(CancellationCoordinator::new(jobs.clone(), cancel_signal));

    let verifiers: HashMap<String, Arc<dyn SignatureVerifier>> = config
        .webhook_secrets
        .iter()
        .map(|(provider, secret)| {
            let verifier: Arc<dyn SignatureVerifier> = Arc::new(HmacSha256Verifier::new(secret.clone()));
            (provider.clone(), verifier)
        })
        .collect();
    let worker_id = format!("job-server-{}", uuid::Uuid::now_v7());
    let webhook_processor = Arc::new(WebhookProcessor::new(
        verifiers,
        stores.webhook_events.clone(),
        stores.payment_transactions.clone(),
        worker_id,
    ));

    let contacts = Arc::new(HttpUserDirectory::new(config.user_directory_url.clone()));
    let (dispatch_tx, dispatch_rx) = tokio::sync::mpsc::unbounded_channel();
    let dispatching_deliveries = Arc::new(DispatchingDeliveryStore::new(stores.deliveries.clone(), dispatch_tx));
    let scanner = NotificationScanner::new(
        stores.licenses.clone(),
        contacts,
        stores.templates.clone(),
        dispatching_deliveries,
        config.renewal_link_base.clone(),
        config.support_email.clone(),
        config.company_name.clone(),
    );

    let primary_provider = build_notification_provider(&config.notification_primary_provider, &config);
    let fallback_provider = build_notification_provider(&config.notification_fallback_provider, &config);
    let dispatcher = Arc::new(job_notify::NotificationDispatcher::new(
        primary_provider,
        fallback_provider,
        stores.attempts.clone(),
    ));

    let scanner_interval = Duration::from_secs(config.scanner_interval_seconds);
    let recovery_interval = Duration::from_secs(config.recovery_interval_seconds);
    let bind_addr = config.bind_addr.clone();

    tokio::spawn(async move {
        ScannerLoop::new(scanner, scanner_interval).run().await;
    });
    tokio::spawn(async move {
        DispatcherLoop::new(dispatcher, dispatch_rx).run().await;
    });
    {
        let recovery = RecoveryLoop::new(
            jobs.clone(),
            publisher.clone(),
            webhook_processor.clone(),
            recovery_interval,
        );
        tokio::spawn(async move {
            recovery.run().await;
        });
    }

    let app = build_router(RouterState {
        intake,
        jobs,
        artefacts,
        positions,
        coordinator,
        webhook_processor,
    });

    let listener = TcpListener::bind(&bind_addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind to {bind_addr}: {e}"));
    tracing::info!("job-server listening on {bind_addr}");

    axum::serve(listener, app).await.expect("server error");
}

/// Builds the configured provider, falling back to
/// `LoggingNotificationProvider` when no gateway URL is configured (spec.md
/// §6: "Secrets and endpoints are configuration").
fn build_notification_provider(
    name: &str,
    config: &Config,
) -> Arc<dyn job_notify::NotificationProvider> {
    let name: &'static str = match name {
        "ses" => "ses",
        "twilio" => "twilio",
        other => {
            tracing::warn!(provider = other, "unrecognized notification provider name, treating as custom gateway target");
            Box::leak(other.to_string().into_boxed_str())
        }
    };
    match &config.notification_gateway_url {
        Some(url) => Arc::new(HttpNotificationProvider::new(name, url.clone())),
        None => Arc::new(LoggingNotificationProvider::new(name)),
    }
}
