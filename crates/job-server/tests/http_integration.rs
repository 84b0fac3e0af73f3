//! HTTP-level integration tests for the job-orchestration core.
//!
//! Exercises the deployed router end to end against in-memory fakes for
//! every port trait — no database is involved (see SPEC_FULL.md §10.5).
//! Run with: cargo test -p job-server --test http_integration

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use axum::body::Body;
use http_body_util::BodyExt;
use hyper::{Request, StatusCode};
use job_core::ports::{ArtefactStore, CancellationSignal, JobStore};
use job_core::ratelimit::SlidingWindowLimiter;
use job_core::{Artefact, Job};
use job_queue::broker::{Broker, BrokerError, PublishRequest};
use job_queue::coordinator::CancellationCoordinator;
use job_queue::position::QueuePositionService;
use job_queue::publisher::QueuePublisher;
use job_server::intake::{JobIntakeService, SubmitJobRequest};
use job_server::router::{build_router, RouterState};
use job_webhooks::{
    HmacSha256Verifier, PaymentTransactionPort, SignatureVerifier, WebhookEvent, WebhookEventStore,
    WebhookProcessor,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

// ── In-memory fakes ────────────────────────────────────────────

#[derive(Default)]
struct FakeJobStore {
    jobs: Mutex<HashMap<Uuid, Job>>,
}

#[async_trait::async_trait]
impl JobStore for FakeJobStore {
    async fn insert(&self, job: &Job) -> anyhow::Result<()> {
        self.jobs.lock().unwrap().insert(job.id, job.clone());
        Ok(())
    }
    async fn get(&self, job_id: Uuid) -> anyhow::Result<Option<Job>> {
        Ok(self.jobs.lock().unwrap().get(&job_id).cloned())
    }
    async fn update(&self, job: &Job) -> anyhow::Result<()> {
        self.jobs.lock().unwrap().insert(job.id, job.clone());
        Ok(())
    }
    async fn count_running_in_queue(&self, _queue: &str) -> anyhow::Result<u64> {
        Ok(0)
    }
    async fn count_ahead_in_queue(
        &self,
        _queue: &str,
        _priority: i32,
        _created_at: chrono::DateTime<chrono::Utc>,
    ) -> anyhow::Result<u64> {
        Ok(0)
    }
    async fn list_stuck_pending(
        &self,
        _older_than: chrono::DateTime<chrono::Utc>,
    ) -> anyhow::Result<Vec<Job>> {
        Ok(vec![])
    }
}

#[async_trait::async_trait]
impl job_core::idempotency::IdempotencyStore for FakeJobStore {
    async fn lookup(
        &self,
        _user_id: &str,
        _kind: &str,
        _idempotency_key: &str,
    ) -> anyhow::Result<Option<(Uuid, String)>> {
        Ok(None)
    }
}

#[derive(Default)]
struct FakeArtefactStore {
    artefacts: Mutex<Vec<Artefact>>,
}

#[async_trait::async_trait]
impl ArtefactStore for FakeArtefactStore {
    async fn insert(&self, artefact: &Artefact) -> anyhow::Result<()> {
        self.artefacts.lock().unwrap().push(artefact.clone());
        Ok(())
    }
    async fn list_for_job(&self, job_id: Uuid) -> anyhow::Result<Vec<Artefact>> {
        Ok(self
            .artefacts
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.job_id == job_id)
            .cloned()
            .collect())
    }
}

struct NoopBroker;

#[async_trait::async_trait]
impl Broker for NoopBroker {
    async fn publish(&self, _request: PublishRequest<'_>) -> Result<String, BrokerError> {
        Ok(format!("task-{}", Uuid::now_v7()))
    }
}

#[derive(Default)]
struct FakeCancellationSignal {
    set_for: Mutex<Vec<Uuid>>,
}

#[async_trait::async_trait]
impl CancellationSignal for FakeCancellationSignal {
    async fn set(&self, job_id: Uuid, _ttl_seconds: u64) -> anyhow::Result<()> {
        self.set_for.lock().unwrap().push(job_id);
        Ok(())
    }
    async fn is_set(&self, job_id: Uuid) -> anyhow::Result<bool> {
        Ok(self.set_for.lock().unwrap().contains(&job_id))
    }
}

#[derive(Default)]
struct FakeWebhookEventStore {
    events: Mutex<HashMap<(String, String), WebhookEvent>>,
}

#[async_trait::async_trait]
impl WebhookEventStore for FakeWebhookEventStore {
    async fn insert_or_fetch(&self, event: &WebhookEvent) -> anyhow::Result<(WebhookEvent, bool)> {
        let key = (event.provider.clone(), event.event_id.clone());
        let mut events = self.events.lock().unwrap();
        if let Some(existing) = events.get(&key) {
            return Ok((existing.clone(), false));
        }
        events.insert(key, event.clone());
        Ok((event.clone(), true))
    }
    async fn try_lock(
        &self,
        id: Uuid,
        locked_by: &str,
        now: chrono::DateTime<chrono::Utc>,
        _lock_timeout_seconds: i64,
    ) -> anyhow::Result<bool> {
        let mut events = self.events.lock().unwrap();
        if let Some(event) = events.values_mut().find(|e| e.id == id) {
            event.locked_at = Some(now);
            event.locked_by = Some(locked_by.to_string());
            return Ok(true);
        }
        Ok(false)
    }
    async fn list_due_for_retry(
        &self,
        _now: chrono::DateTime<chrono::Utc>,
    ) -> anyhow::Result<Vec<WebhookEvent>> {
        Ok(vec![])
    }
    async fn mark_delivered(&self, id: Uuid, _now: chrono::DateTime<chrono::Utc>) -> anyhow::Result<()> {
        let mut events = self.events.lock().unwrap();
        if let Some(event) = events.values_mut().find(|e| e.id == id) {
            event.status = job_webhooks::WebhookStatus::Delivered;
        }
        Ok(())
    }
    async fn schedule_retry(
        &self,
        _id: Uuid,
        _retry_count: u32,
        _next_attempt_at: chrono::DateTime<chrono::Utc>,
        _last_error: &str,
        _now: chrono::DateTime<chrono::Utc>,
    ) -> anyhow::Result<()> {
        Ok(())
    }
    async fn mark_failed(&self, _id: Uuid, _last_error: &str, _now: chrono::DateTime<chrono::Utc>) -> anyhow::Result<()> {
        Ok(())
    }
}

struct AlwaysSucceedsTransaction;

#[async_trait::async_trait]
impl PaymentTransactionPort for AlwaysSucceedsTransaction {
    async fn apply(
        &self,
        _provider: &str,
        _provider_payment_id: &str,
        _new_status: job_webhooks::PaymentStatus,
        _metadata: &Value,
    ) -> Result<(), job_core::WebhookError> {
        Ok(())
    }
}

// ── Test app builder ───────────────────────────────────────────

const WEBHOOK_SECRET: &[u8] = b"test-webhook-secret";

fn build_test_app() -> axum::Router {
    let jobs: Arc<dyn JobStore> = Arc::new(FakeJobStore::default());
    let idempotency_store = Arc::new(FakeJobStore::default());
    let idempotency: Arc<dyn job_core::idempotency::IdempotencyStore> = idempotency_store;
    let artefacts: Arc<dyn ArtefactStore> = Arc::new(FakeArtefactStore::default());
    let limiter = Arc::new(SlidingWindowLimiter::local_only());
    let publisher = Arc::new(QueuePublisher::new(Arc::new(NoopBroker)));
    let intake = Arc::new(JobIntakeService::new(jobs.clone(), idempotency, limiter, publisher));
    let positions = Arc::new(QueuePositionService::new(jobs.clone()));
    let signal: Arc<dyn CancellationSignal> = Arc::new(FakeCancellationSignal::default());
    let coordinator = Arc::new(CancellationCoordinator::new(jobs.clone(), signal));

    let mut verifiers: HashMap<String, Arc<dyn SignatureVerifier>> = HashMap::new();
    verifiers.insert(
        "stripe".to_string(),
        Arc::new(HmacSha256Verifier::new(WEBHOOK_SECRET.to_vec())),
    );
    let webhook_processor = Arc::new(WebhookProcessor::new(
        verifiers,
        Arc::new(FakeWebhookEventStore::default()),
        Arc::new(AlwaysSucceedsTransaction),
        "test-worker".to_string(),
    ));

    build_router(RouterState {
        intake,
        jobs,
        artefacts,
        positions,
        coordinator,
        webhook_processor,
    })
}

async fn send(app: &axum::Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = if bytes.is_empty() {
        json!(null)
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn submit_request(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/jobs")
        .header("content-type", "application/json")
        .header("x-user-id", "user-1")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn health_check_reports_ok() {
    let app = build_test_app();
    let (status, _) = send(&app, Request::builder().uri("/health").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn submit_requires_principal_header() {
    let app = build_test_app();
    let req = Request::builder()
        .method("POST")
        .uri("/jobs")
        .header("content-type", "application/json")
        .body(Body::from(json!({"kind": "model", "params": {"box": {"w": 1, "h": 1, "d": 1}}}).to_string()))
        .unwrap();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn full_job_lifecycle_through_progress_and_completion() {
    let app = build_test_app();

    let submit = submit_request(json!({
        "kind": "model",
        "params": {"box": {"w": 10, "h": 20, "d": 30}},
    }));
    let (status, body) = send(&app, submit).await;
    assert_eq!(status, StatusCode::OK);
    let job_id = body["job_id"].as_str().unwrap().to_string();
    assert_eq!(body["state"], "QUEUED");

    let status_req = Request::builder()
        .uri(format!("/jobs/{job_id}"))
        .header("x-user-id", "user-1")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, status_req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "QUEUED");

    let start_req = Request::builder()
        .method("POST")
        .uri(format!("/jobs/{job_id}/start"))
        .header("x-user-id", "user-1")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, start_req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "RUNNING");

    let progress_req = Request::builder()
        .method("POST")
        .uri(format!("/jobs/{job_id}/progress"))
        .header("content-type", "application/json")
        .header("x-user-id", "user-1")
        .body(Body::from(json!({"percent": 40, "step": "slicing"}).to_string()))
        .unwrap();
    let (status, _) = send(&app, progress_req).await;
    assert_eq!(status, StatusCode::OK);

    let complete_req = Request::builder()
        .method("POST")
        .uri(format!("/jobs/{job_id}/complete"))
        .header("content-type", "application/json")
        .header("x-user-id", "user-1")
        .body(Body::from(
            json!({
                "outcome": "success",
                "artefacts": [{"type": "gcode", "blob_key": "k1", "size": 128, "sha256": "a".repeat(64)}],
            })
            .to_string(),
        ))
        .unwrap();
    let (status, body) = send(&app, complete_req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "COMPLETED");
    assert_eq!(body["progress_percent"], 100);
}

#[tokio::test]
async fn cancel_then_progress_transitions_to_cancelled() {
    let app = build_test_app();

    let submit = submit_request(json!({
        "kind": "model",
        "params": {"box": {"w": 1, "h": 1, "d": 1}},
    }));
    let (_, body) = send(&app, submit).await;
    let job_id = body["job_id"].as_str().unwrap().to_string();

    let start_req = Request::builder()
        .method("POST")
        .uri(format!("/jobs/{job_id}/start"))
        .header("x-user-id", "user-1")
        .body(Body::empty())
        .unwrap();
    send(&app, start_req).await;

    let cancel_req = Request::builder()
        .method("POST")
        .uri(format!("/jobs/{job_id}/cancel"))
        .header("x-user-id", "user-1")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, cancel_req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "REQUESTED");

    // The next worker checkpoint observes the request instead of applying
    // the reported percentage (spec.md §4.8/§5).
    let progress_req = Request::builder()
        .method("POST")
        .uri(format!("/jobs/{job_id}/progress"))
        .header("content-type", "application/json")
        .header("x-user-id", "user-1")
        .body(Body::from(json!({"percent": 75}).to_string()))
        .unwrap();
    let (status, body) = send(&app, progress_req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "CANCELLED");
}

#[tokio::test]
async fn rejects_payload_failing_kind_specific_validation() {
    let app = build_test_app();
    let submit = submit_request(json!({
        "kind": "model",
        "params": {"box": {"w": 0, "h": 1, "d": 1}},
    }));
    let (status, body) = send(&app, submit).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "ERR-JOB-422");
}

#[tokio::test]
async fn webhook_with_bad_signature_is_rejected() {
    let app = build_test_app();
    let payload = json!({
        "id": "evt_1",
        "type": "payment_intent.succeeded",
        "data": {"object": {"id": "pay_1", "status": "succeeded"}},
    });
    let req = Request::builder()
        .method("POST")
        .uri("/webhooks/stripe")
        .header("content-type", "application/json")
        .header("x-webhook-signature", "not-the-right-signature")
        .body(Body::from(payload.to_string()))
        .unwrap();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn webhook_with_valid_signature_is_delivered() {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    let app = build_test_app();
    let payload = json!({
        "id": "evt_1",
        "type": "payment_intent.succeeded",
        "data": {"object": {"id": "pay_1", "status": "succeeded"}},
    });
    let raw_body = payload.to_string();

    let mut mac = Hmac::<Sha256>::new_from_slice(WEBHOOK_SECRET).unwrap();
    mac.update(raw_body.as_bytes());
    let signature = hex::encode(mac.finalize().into_bytes());

    let req = Request::builder()
        .method("POST")
        .uri("/webhooks/stripe")
        .header("content-type", "application/json")
        .header("x-webhook-signature", signature)
        .body(Body::from(raw_body))
        .unwrap();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "DELIVERED");
}
