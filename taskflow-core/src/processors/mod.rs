//! Long-running processors.
//!
//! - `MessageRelay`: drains the outbox on a timer and dispatches each row on
//!   the master event bus
//! - `NotificationWorker`: receives `NotificationJob`s enqueued by event
//!   handlers and delivers them once

pub mod message_relay;
pub mod notification_worker;

pub use message_relay::{MessageRelay, RelayReport, RowError, RowFailure};
pub use notification_worker::{JobOutcome, NotificationWorker};
