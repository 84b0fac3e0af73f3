//! License Notification Scanner (spec.md §4.9).
//!
//! Grounded on `examples/original_source/apps/api/app/tasks/
//! license_notifications.py`'s `scan_licenses` / `_get_licenses_expiring_in_days`
//! / `_enqueue_license_notification`: a daily UTC scan per `D ∈ {7,3,1}`,
//! half-open day window, dedup insert with "do nothing on conflict."

use std::collections::HashMap;

use chrono::{DateTime, Duration, TimeZone, Utc};
use job_core::ports::LicenseReader;
use job_core::License;
use uuid::Uuid;

use crate::model::{Channel, DaysOut, DeliveryStatus, NotificationDelivery};
use crate::template::{self, TemplateResolver};

/// Resolves the contact details and locale the scanner needs per license
/// owner. Implemented against the user-directory collaborator (out of
/// scope per spec.md §1 — this is the seam).
#[async_trait::async_trait]
pub trait UserContactResolver: Send + Sync {
    async fn resolve(&self, user_id: &str) -> anyhow::Result<UserContact>;
}

#[derive(Debug, Clone)]
pub struct UserContact {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub language: String,
}

/// Persists a rendered delivery with "insert, do nothing on conflict"
/// semantics on `(license_id, days_out, channel)` (spec.md §4.9 step 2c).
#[async_trait::async_trait]
pub trait DeliveryStore: Send + Sync {
    /// Returns `true` if a new row was inserted, `false` if the unique
    /// constraint already had a row (a skipped duplicate).
    async fn try_insert(&self, delivery: &NotificationDelivery) -> anyhow::Result<bool>;
}

/// Per-`D` outcome counts for one scan run (spec.md §4.9 step 3).
#[derive(Debug, Clone, Copy, Default)]
pub struct DayMetrics {
    pub licenses_matched: u64,
    pub notifications_queued: u64,
    pub duplicates_skipped: u64,
    pub errors: u64,
}

#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    pub by_day: HashMap<i32, DayMetrics>,
}

pub struct NotificationScanner {
    licenses: std::sync::Arc<dyn LicenseReader>,
    contacts: std::sync::Arc<dyn UserContactResolver>,
    templates: std::sync::Arc<dyn TemplateResolver>,
    deliveries: std::sync::Arc<dyn DeliveryStore>,
    renewal_link_base: String,
    support_email: String,
    company_name: String,
}

const REMINDER_KIND_PREFIX: &str = "LICENSE_REMINDER_D";
const DEFAULT_MAX_RETRIES: u32 = 5;

impl NotificationScanner {
    pub fn new(
        licenses: std::sync::Arc<dyn LicenseReader>,
        contacts: std::sync::Arc<dyn UserContactResolver>,
        templates: std::sync::Arc<dyn TemplateResolver>,
        deliveries: std::sync::Arc<dyn DeliveryStore>,
        renewal_link_base: String,
        support_email: String,
        company_name: String,
    ) -> Self {
        Self {
            licenses,
            contacts,
            templates,
            deliveries,
            renewal_link_base,
            support_email,
            company_name,
        }
    }

    /// Runs one full scan across `D ∈ {7, 3, 1}`, evaluated against `today`
    /// (the UTC midnight of the day the scan is for).
    pub async fn run(&self, today: DateTime<Utc>) -> ScanReport {
        let mut report = ScanReport::default();
        for days_out in DaysOut::ALL {
            let metrics = self.scan_one_day(today, days_out).await;
            report.by_day.insert(days_out.as_i32(), metrics);
        }
        report
    }

    async fn scan_one_day(&self, today: DateTime<Utc>, days_out: DaysOut) -> DayMetrics {
        let mut metrics = DayMetrics::default();
        let day_start = midnight_utc(today) + Duration::days(days_out.as_i32() as i64);
        let day_end = day_start + Duration::days(1);

        let licenses = match self.licenses.expiring_within(day_start, day_end).await {
            Ok(licenses) => licenses,
            Err(err) => {
                tracing::error!(error = %err, days_out = days_out.as_i32(), "failed to query expiring licenses");
                metrics.errors += 1;
                return metrics;
            }
        };

        let mut sorted = licenses;
        sorted.sort_by_key(|l| l.ends_at);
        metrics.licenses_matched = sorted.len() as u64;

        for license in &sorted {
            self.process_license(license, days_out, &mut metrics).await;
        }

        metrics
    }

    async fn process_license(&self, license: &License, days_out: DaysOut, metrics: &mut DayMetrics) {
        let contact = match self.contacts.resolve(&license.user_id).await {
            Ok(contact) => contact,
            Err(err) => {
                tracing::error!(error = %err, user_id = %license.user_id, "failed to resolve user contact");
                metrics.errors += 1;
                return;
            }
        };

        let mut channels = Vec::new();
        if contact.email.is_some() {
            channels.push((Channel::Email, contact.email.clone().unwrap()));
        }
        if contact.phone.is_some() {
            channels.push((Channel::Sms, contact.phone.clone().unwrap()));
        }

        for (channel, recipient) in channels {
            match self
                .build_and_insert(license, days_out, channel, recipient, &contact)
                .await
            {
                Ok(true) => metrics.notifications_queued += 1,
                Ok(false) => metrics.duplicates_skipped += 1,
                Err(err) => {
                    tracing::warn!(error = %err, license_id = %license.id, ?channel, "failed to render/insert notification");
                    metrics.errors += 1;
                }
            }
        }
    }

    async fn build_and_insert(
        &self,
        license: &License,
        days_out: DaysOut,
        channel: Channel,
        recipient: String,
        contact: &UserContact,
    ) -> anyhow::Result<bool> {
        let kind = format!("{REMINDER_KIND_PREFIX}{}", days_out.as_i32());
        let channel_str = match channel {
            Channel::Email => "EMAIL",
            Channel::Sms => "SMS",
        };
        let template = template::resolve_with_fallback(self.templates.as_ref(), &kind, channel_str, &contact.language).await?;

        let mut variables = HashMap::new();
        variables.insert("user_name".into(), contact.name.clone());
        variables.insert("user_email".into(), contact.email.clone().unwrap_or_default());
        variables.insert("license_kind".into(), "license".into());
        variables.insert("days_remaining".into(), days_out.as_i32().to_string());
        variables.insert("ends_at_formatted".into(), license.ends_at.to_rfc3339());
        variables.insert("renewal_link".into(), format!("{}/{}", self.renewal_link_base, license.id));
        variables.insert("support_email".into(), self.support_email.clone());
        variables.insert("company_name".into(), self.company_name.clone());

        let (subject, body) = template::render(&template, &variables, matches!(channel, Channel::Sms))?;

        let now = Utc::now();
        let delivery = NotificationDelivery {
            id: Uuid::now_v7(),
            user_id: license.user_id.clone(),
            license_id: Some(license.id),
            template_id: template.id.clone(),
            channel,
            recipient,
            days_out: Some(days_out.as_i32()),
            subject,
            body,
            variables: serde_json::to_value(&variables)?,
            status: DeliveryStatus::Queued,
            primary_provider: default_provider_for(channel),
            actual_provider: None,
            provider_message_id: None,
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            scheduled_at: now,
            created_at: now,
            updated_at: now,
        };

        self.deliveries.try_insert(&delivery).await
    }
}

fn default_provider_for(channel: Channel) -> String {
    match channel {
        Channel::Email => "ses".into(),
        Channel::Sms => "twilio".into(),
    }
}

fn midnight_utc(dt: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(dt.year(), dt.month(), dt.day(), 0, 0, 0).unwrap()
}

use chrono::Datelike;

#[cfg(test)]
mod tests {
    use super::*;
    use job_core::LicenseStatus;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    struct FixedLicenseReader {
        licenses: Vec<License>,
    }

    #[async_trait::async_trait]
    impl LicenseReader for FixedLicenseReader {
        async fn expiring_within(
            &self,
            window_start: DateTime<Utc>,
            window_end: DateTime<Utc>,
        ) -> anyhow::Result<Vec<License>> {
            Ok(self
                .licenses
                .iter()
                .filter(|l| l.ends_at >= window_start && l.ends_at < window_end)
                .cloned()
                .collect())
        }
    }

    struct FixedContacts;

    #[async_trait::async_trait]
    impl UserContactResolver for FixedContacts {
        async fn resolve(&self, user_id: &str) -> anyhow::Result<UserContact> {
            Ok(UserContact {
                name: format!("User {user_id}"),
                email: Some(format!("{user_id}@example.com")),
                phone: Some("+15555550100".into()),
                language: "tr-TR".into(),
            })
        }
    }

    struct FixedTemplates;

    #[async_trait::async_trait]
    impl TemplateResolver for FixedTemplates {
        async fn find(&self, _kind: &str, channel: &str, language: &str) -> anyhow::Result<Option<template::Template>> {
            if language != "en-US" {
                return Ok(None);
            }
            Ok(Some(template::Template {
                id: format!("tmpl-{channel}"),
                subject: Some("Your license expires soon".into()),
                body: "Hi {user_name}, your license ends on {ends_at_formatted}.".into(),
            }))
        }
    }

    #[derive(Default)]
    struct CountingDeliveryStore {
        seen: Mutex<std::collections::HashSet<(Uuid, i32, &'static str)>>,
        first_call_duplicate: AtomicBool,
    }

    #[async_trait::async_trait]
    impl DeliveryStore for CountingDeliveryStore {
        async fn try_insert(&self, delivery: &NotificationDelivery) -> anyhow::Result<bool> {
            let channel_str = match delivery.channel {
                Channel::Email => "EMAIL",
                Channel::Sms => "SMS",
            };
            let key = (delivery.license_id.unwrap(), delivery.days_out.unwrap(), channel_str);
            let mut seen = self.seen.lock().unwrap();
            if seen.contains(&key) {
                self.first_call_duplicate.store(true, Ordering::SeqCst);
                return Ok(false);
            }
            seen.insert(key);
            Ok(true)
        }
    }

    #[tokio::test]
    async fn license_expiring_in_seven_days_produces_email_and_sms() {
        let today = Utc::now();
        let license = License {
            id: Uuid::now_v7(),
            user_id: "u-1".into(),
            status: LicenseStatus::Active,
            ends_at: midnight_utc(today) + Duration::days(7) + Duration::hours(5),
        };
        let scanner = NotificationScanner::new(
            std::sync::Arc::new(FixedLicenseReader { licenses: vec![license] }),
            std::sync::Arc::new(FixedContacts),
            std::sync::Arc::new(FixedTemplates),
            std::sync::Arc::new(CountingDeliveryStore::default()),
            "https://example.com/renew".into(),
            "support@example.com".into(),
            "Acme".into(),
        );

        let report = scanner.run(today).await;
        let day7 = report.by_day[&7];
        assert_eq!(day7.licenses_matched, 1);
        assert_eq!(day7.notifications_queued, 2);
        assert_eq!(day7.duplicates_skipped, 0);
    }

    #[tokio::test]
    async fn second_run_same_day_yields_only_duplicates() {
        let today = Utc::now();
        let license = License {
            id: Uuid::now_v7(),
            user_id: "u-2".into(),
            status: LicenseStatus::Active,
            ends_at: midnight_utc(today) + Duration::days(3) + Duration::hours(1),
        };
        let store = std::sync::Arc::new(CountingDeliveryStore::default());
        let scanner = NotificationScanner::new(
            std::sync::Arc::new(FixedLicenseReader { licenses: vec![license] }),
            std::sync::Arc::new(FixedContacts),
            std::sync::Arc::new(FixedTemplates),
            store,
            "https://example.com/renew".into(),
            "support@example.com".into(),
            "Acme".into(),
        );

        let first = scanner.run(today).await;
        assert_eq!(first.by_day[&3].notifications_queued, 2);

        let second = scanner.run(today).await;
        assert_eq!(second.by_day[&3].notifications_queued, 0);
        assert_eq!(second.by_day[&3].duplicates_skipped, 2);
    }
}
