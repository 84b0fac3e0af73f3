//! License expiry notification scanner and dispatcher.

pub mod dispatcher;
pub mod model;
pub mod scanner;
pub mod template;

pub use dispatcher::{AttemptStore, DispatchDecision, NotificationDispatcher, NotificationProvider};
pub use model::{Channel, DaysOut, DeliveryStatus, NotificationAttempt, NotificationDelivery, ProviderResult};
pub use scanner::{DayMetrics, DeliveryStore, NotificationScanner, ScanReport, UserContact, UserContactResolver};
pub use template::{Template, TemplateResolver};
