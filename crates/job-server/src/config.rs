//! Process configuration, read once at startup (spec.md §10.4).
//!
//! Grounded on `sem_os_server::main`'s env-var reading convention:
//! `std::env::var(...).expect(...)` for required values, `.unwrap_or_else`
//! for defaults. `dotenvy::dotenv()` is called before this runs so a local
//! `.env` file populates the process environment in development.

use std::collections::HashMap;

/// Turkish VAT (KDV) rate table referenced by spec.md §9 Open Question (a):
/// "the exact set of valid Turkish tax rates is configuration; validation
/// must load from config, not hardcode." `job-core`'s validator has no
/// tax-rate field today — ERP payloads only carry `document_type` — so this
/// table is carried here, ready for the ERP validator to consult once it
/// grows one, rather than forcing a speculative change onto the already
///-tested validator (see DESIGN.md).
pub type TaxRateTable = HashMap<String, f64>;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    /// Absent means rate limiting and cancellation signaling run
    /// local-only (spec.md §5 "loss of KV degrades to local-only behavior
    /// without failing requests").
    pub redis_url: Option<String>,
    pub bind_addr: String,

    /// `provider name -> HMAC secret`, used to build the webhook
    /// `SignatureVerifier` map (spec.md §6 "Webhook ingress").
    pub webhook_secrets: HashMap<String, Vec<u8>>,

    pub notification_primary_provider: String,
    pub notification_fallback_provider: String,
    /// Base URL of the notification-sending gateway. Absent means
    /// providers fall back to `LoggingNotificationProvider` (spec.md §6
    /// "Secrets and endpoints are configuration").
    pub notification_gateway_url: Option<String>,
    /// Base URL of the user-directory service the scanner resolves
    /// license owners' contact details against (spec.md §1: user identity
    /// is an external collaborator).
    pub user_directory_url: String,
    pub renewal_link_base: String,
    pub support_email: String,
    pub company_name: String,

    pub tax_rates: TaxRateTable,

    /// Seconds between Notification Scanner runs (spec.md §4.9: "once per
    /// UTC day" — configurable so tests and local dev can run it faster).
    pub scanner_interval_seconds: u64,
    /// Seconds between stuck-PENDING / webhook-retry recovery sweeps.
    pub recovery_interval_seconds: u64,
}

impl Config {
    pub fn from_env() -> Self {
        let database_url =
            std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let redis_url = std::env::var("REDIS_URL").ok().filter(|s| !s.is_empty());
        let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        let webhook_secrets = parse_kv_list(&std::env::var("WEBHOOK_SECRETS").unwrap_or_default())
            .into_iter()
            .map(|(k, v)| (k, v.into_bytes()))
            .collect();

        let notification_primary_provider =
            std::env::var("NOTIFICATION_PRIMARY_PROVIDER").unwrap_or_else(|_| "ses".to_string());
        let notification_fallback_provider =
            std::env::var("NOTIFICATION_FALLBACK_PROVIDER").unwrap_or_else(|_| "twilio".to_string());
        let notification_gateway_url = std::env::var("NOTIFICATION_GATEWAY_URL").ok().filter(|s| !s.is_empty());
        let user_directory_url = std::env::var("USER_DIRECTORY_URL")
            .unwrap_or_else(|_| "http://localhost:8090".to_string());
        let renewal_link_base = std::env::var("RENEWAL_LINK_BASE")
            .unwrap_or_else(|_| "https://app.example.com/licenses/renew".to_string());
        let support_email =
            std::env::var("SUPPORT_EMAIL").unwrap_or_else(|_| "support@example.com".to_string());
        let company_name = std::env::var("COMPANY_NAME").unwrap_or_else(|_| "Acme CNC".to_string());

        let tax_rates = parse_kv_list(&std::env::var("TAX_RATES").unwrap_or_else(|_| {
            "standard:0.20,reduced:0.10,super_reduced:0.01,exempt:0.0".to_string()
        }))
        .into_iter()
        .filter_map(|(k, v)| v.parse::<f64>().ok().map(|rate| (k, rate)))
        .collect();

        let scanner_interval_seconds = std::env::var("SCANNER_INTERVAL_SECONDS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(86_400);
        let recovery_interval_seconds = std::env::var("RECOVERY_INTERVAL_SECONDS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(60);

        Self {
            database_url,
            redis_url,
            bind_addr,
            webhook_secrets,
            notification_primary_provider,
            notification_fallback_provider,
            notification_gateway_url,
            user_directory_url,
            renewal_link_base,
            support_email,
            company_name,
            tax_rates,
            scanner_interval_seconds,
            recovery_interval_seconds,
        }
    }
}

/// Parses `"a:1,b:2"` style env values into ordered key/value pairs.
fn parse_kv_list(raw: &str) -> Vec<(String, String)> {
    raw.split(',')
        .filter_map(|pair| {
            let pair = pair.trim();
            if pair.is_empty() {
                return None;
            }
            let (k, v) = pair.split_once(':')?;
            Some((k.trim().to_string(), v.trim().to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_comma_separated_key_value_pairs() {
        let parsed = parse_kv_list("stripe:abc123,iyzico:def456");
        assert_eq!(
            parsed,
            vec![
                ("stripe".to_string(), "abc123".to_string()),
                ("iyzico".to_string(), "def456".to_string()),
            ]
        );
    }

    #[test]
    fn empty_input_yields_no_pairs() {
        assert!(parse_kv_list("").is_empty());
    }
}
