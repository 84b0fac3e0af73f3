//! job-server — HTTP surface and process entrypoint for the job
//! orchestration core.
//!
//! Routes:
//!   GET  /health                      — liveness (no auth)
//!   POST /jobs                        — submit a job (auth required)
//!   GET  /jobs/:id                    — status + queue position (auth required)
//!   POST /jobs/:id/cancel             — request cancellation (auth required)
//!   POST /jobs/:id/start              — worker pickup checkpoint (auth required)
//!   POST /jobs/:id/progress           — worker progress checkpoint (auth required)
//!   POST /jobs/:id/complete           — worker completion report (auth required)
//!   POST /webhooks/:provider          — payment-provider webhook ingress (no auth, signed)

pub mod adapters;
pub mod background;
pub mod config;
pub mod error;
pub mod handlers;
pub mod intake;
pub mod locale;
pub mod principal;
pub mod router;
