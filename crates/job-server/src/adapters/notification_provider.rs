//! `NotificationProvider` adapters (spec.md §6 "Notification-provider
//! contract").
//!
//! Two implementations: `HttpNotificationProvider` posts to a configured
//! sender gateway (the real SES/Twilio-style integration lives behind that
//! gateway, outside this core's scope); `LoggingNotificationProvider` is the
//! stand-in used when no gateway URL is configured, grounded on
//! `examples/original_source/.../payment_providers/mock_provider.py`'s
//! "mock provider, same interface, no network" shape.

use job_notify::{Channel, NotificationProvider, ProviderResult};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Posts to `{base_url}/send` with the provider name as a query parameter,
/// expecting a JSON body describing the outcome. Transport-level failures
/// (timeout, connection refused, 5xx) are classified as `TRANSIENT_FAIL` —
/// the gateway itself is expected to distinguish permanent failures (bounce,
/// rejected number) in its response body.
pub struct HttpNotificationProvider {
    name: &'static str,
    base_url: String,
    client: reqwest::Client,
}

impl HttpNotificationProvider {
    pub fn new(name: &'static str, base_url: impl Into<String>) -> Self {
        Self {
            name,
            base_url: base_url.into(),
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .expect("reqwest client with a fixed timeout is always constructible"),
        }
    }
}

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    channel: &'a str,
    recipient: &'a str,
    subject: Option<&'a str>,
    body: &'a str,
    attempt_number: u32,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
enum SendResponse {
    Success { message_id: String },
    PermanentFail { code: String, message: String },
}

#[async_trait::async_trait]
impl NotificationProvider for HttpNotificationProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn send(
        &self,
        channel: Channel,
        recipient: &str,
        subject: Option<&str>,
        body: &str,
        attempt_number: u32,
    ) -> ProviderResult {
        let channel_str = match channel {
            Channel::Email => "EMAIL",
            Channel::Sms => "SMS",
        };
        let request = SendRequest {
            channel: channel_str,
            recipient,
            subject,
            body,
            attempt_number,
        };

        let response = self
            .client
            .post(format!("{}/send?provider={}", self.base_url.trim_end_matches('/'), self.name))
            .json(&request)
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            Err(err) => {
                return ProviderResult::TransientFail {
                    code: "gateway_unreachable".into(),
                    message: err.to_string(),
                }
            }
        };

        if response.status().is_server_error() {
            return ProviderResult::TransientFail {
                code: "gateway_5xx".into(),
                message: format!("gateway returned {}", response.status()),
            };
        }
        if !response.status().is_success() {
            return ProviderResult::PermanentFail {
                code: "gateway_rejected".into(),
                message: format!("gateway returned {}", response.status()),
            };
        }

        match response.json::<SendResponse>().await {
            Ok(SendResponse::Success { message_id }) => ProviderResult::Success { message_id },
            Ok(SendResponse::PermanentFail { code, message }) => ProviderResult::PermanentFail { code, message },
            Err(err) => ProviderResult::TransientFail {
                code: "gateway_response_malformed".into(),
                message: err.to_string(),
            },
        }
    }
}

/// Stand-in used until a real gateway URL is configured for `name`. Always
/// succeeds with a freshly generated message id; never used in production
/// once `HttpNotificationProvider` is wired (see `main.rs`).
pub struct LoggingNotificationProvider {
    name: &'static str,
}

impl LoggingNotificationProvider {
    pub fn new(name: &'static str) -> Self {
        Self { name }
    }
}

#[async_trait::async_trait]
impl NotificationProvider for LoggingNotificationProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn send(
        &self,
        channel: Channel,
        recipient: &str,
        _subject: Option<&str>,
        _body: &str,
        attempt_number: u32,
    ) -> ProviderResult {
        let message_id = format!("log_{}", Uuid::now_v7());
        tracing::info!(
            provider = self.name,
            ?channel,
            recipient,
            attempt_number,
            message_id,
            "notification send (no gateway configured, logging only)"
        );
        ProviderResult::Success { message_id }
    }
}
