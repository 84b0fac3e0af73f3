//! Background loop driving the License Notification Scanner once per UTC
//! day (spec.md §4.9).

use std::time::Duration;

use chrono::{TimeZone, Utc};
use job_notify::NotificationScanner;

pub struct ScannerLoop {
    scanner: NotificationScanner,
    interval: Duration,
}

impl ScannerLoop {
    pub fn new(scanner: NotificationScanner, interval: Duration) -> Self {
        Self { scanner, interval }
    }

    /// Runs the scan once per `interval`, reporting per-`D` metrics. Never
    /// returns under normal operation — spawn via `tokio::spawn`.
    pub async fn run(&self) {
        tracing::info!(interval = ?self.interval, "license notification scanner started");
        loop {
            let today = midnight_utc(Utc::now());
            let report = self.scanner.run(today).await;
            for (days_out, metrics) in &report.by_day {
                tracing::info!(
                    days_out,
                    matched = metrics.licenses_matched,
                    queued = metrics.notifications_queued,
                    duplicates = metrics.duplicates_skipped,
                    errors = metrics.errors,
                    "license scan day complete"
                );
            }
            tokio::time::sleep(self.interval).await;
        }
    }
}

fn midnight_utc(dt: chrono::DateTime<Utc>) -> chrono::DateTime<Utc> {
    use chrono::Datelike;
    Utc.with_ymd_and_hms(dt.year(), dt.month(), dt.day(), 0, 0, 0).unwrap()
}
