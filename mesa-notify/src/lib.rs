//! Durable notification fan-out and the audit trail.
//!
//! Every domain event is journaled to the store before listeners run, so a
//! crashed or failing subscriber never loses the event. Redelivery is pull
//! based via [`NotificationBus::retry_pending`].

pub mod audit;
pub mod bus;

pub use audit::AuditRecorder;
pub use bus::{NotificationBus, Subscription};
