//! Event handlers and the jobs they enqueue.
//!
//! - `userSignedUp`: `PushWelcomeEmailJob`, `PushProcessAvatarJob`
//! - `userDeletedAccount`: `SendFarewellEmail`, `RemoveProtectedData`
//! - `taskCreated`: `ScheduleDueDateReminder`
//! - `taskDeleted`: `CancelTaskReminders`
//!
//! Events are delivered at least once, so handlers may see the same event
//! twice; the `NotificationWorker` drops repeated jobs.

pub mod jobs;
pub mod registry;
pub mod tasks;
pub mod users;

pub use jobs::{
    DEFAULT_CHANNEL_BUFFER, JobKind, NotificationJob, NotificationJobReceiver,
    NotificationJobSender, notification_job_channel,
};
pub use registry::{HandlerTable, default_handlers};
pub use tasks::{CancelTaskReminders, ScheduleDueDateReminder};
pub use users::{PushProcessAvatarJob, PushWelcomeEmailJob, RemoveProtectedData, SendFarewellEmail};
