//! Adapters for collaborators spec.md §1 places out of scope: the user
//! directory (contact resolution for notifications) and the notification
//! providers themselves (SES/Twilio-style senders). Grounded on
//! `sem_os_client::http::HttpClient` for the request shape and on
//! `examples/original_source/.../payment_providers/mock_provider.py` for
//! the "stand-in adapter behind the real seam" shape used before a real
//! provider account is wired in.

pub mod notification_provider;
pub mod user_directory;

pub use notification_provider::{HttpNotificationProvider, LoggingNotificationProvider};
pub use user_directory::HttpUserDirectory;
