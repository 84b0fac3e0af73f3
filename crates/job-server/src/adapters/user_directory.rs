//! `UserContactResolver` against the user-directory service (spec.md §1:
//! user identity/contact data is an external collaborator; the core only
//! reads {name, email, phone, language} to render notifications).
//!
//! Grounded on `sem_os_client::http::HttpClient`: a thin `reqwest::Client`
//! wrapper, one base URL, JSON in and out, errors classified from the HTTP
//! status rather than parsed response bodies.

use job_notify::{UserContact, UserContactResolver};
use serde::Deserialize;

pub struct HttpUserDirectory {
    base_url: String,
    client: reqwest::Client,
}

impl HttpUserDirectory {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, user_id: &str) -> String {
        format!("{}/users/{}/contact", self.base_url.trim_end_matches('/'), user_id)
    }
}

#[derive(Debug, Deserialize)]
struct ContactResponse {
    name: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    phone: Option<String>,
    #[serde(default = "default_language")]
    language: String,
}

fn default_language() -> String {
    "tr-TR".to_string()
}

#[async_trait::async_trait]
impl UserContactResolver for HttpUserDirectory {
    async fn resolve(&self, user_id: &str) -> anyhow::Result<UserContact> {
        let resp = self.client.get(self.url(user_id)).send().await?;
        let resp = resp.error_for_status()?;
        let body: ContactResponse = resp.json().await?;
        Ok(UserContact {
            name: body.name,
            email: body.email,
            phone: body.phone,
            language: body.language,
        })
    }
}
