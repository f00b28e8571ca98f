//! Background jobs enqueued by event handlers.
//!
//! Handlers never do slow work on the dispatching thread. They turn an event
//! into a [`NotificationJob`] and push it onto a bounded channel drained by
//! the `NotificationWorker`.

use crate::events::HandlerError;
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

/// Default buffer size for the notification job channel.
pub const DEFAULT_CHANNEL_BUFFER: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    WelcomeEmail,
    ProcessAvatar,
    FarewellEmail,
    RemoveProtectedData,
    DueDateReminder,
    CancelTaskReminders,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationJob {
    WelcomeEmail {
        user_id: Uuid,
        first_name: String,
        last_name: String,
        email: String,
    },
    ProcessAvatar {
        user_id: Uuid,
        first_name: String,
    },
    FarewellEmail {
        user_id: Uuid,
        email: String,
    },
    RemoveProtectedData {
        user_id: Uuid,
    },
    DueDateReminder {
        task_id: Uuid,
        owner_id: Uuid,
        name: String,
        due_date: OffsetDateTime,
    },
    CancelTaskReminders {
        task_id: Uuid,
    },
}

impl NotificationJob {
    pub fn kind(&self) -> JobKind {
        match self {
            NotificationJob::WelcomeEmail { .. } => JobKind::WelcomeEmail,
            NotificationJob::ProcessAvatar { .. } => JobKind::ProcessAvatar,
            NotificationJob::FarewellEmail { .. } => JobKind::FarewellEmail,
            NotificationJob::RemoveProtectedData { .. } => JobKind::RemoveProtectedData,
            NotificationJob::DueDateReminder { .. } => JobKind::DueDateReminder,
            NotificationJob::CancelTaskReminders { .. } => JobKind::CancelTaskReminders,
        }
    }

    /// The user or task the job is about.
    pub fn subject_id(&self) -> Uuid {
        match self {
            NotificationJob::WelcomeEmail { user_id, .. }
            | NotificationJob::ProcessAvatar { user_id, .. }
            | NotificationJob::FarewellEmail { user_id, .. }
            | NotificationJob::RemoveProtectedData { user_id } => *user_id,
            NotificationJob::DueDateReminder { task_id, .. }
            | NotificationJob::CancelTaskReminders { task_id } => *task_id,
        }
    }

    /// Identity of the job for de-duplication of redelivered events.
    pub fn dedup_key(&self) -> (JobKind, Uuid) {
        (self.kind(), self.subject_id())
    }
}

pub type NotificationJobSender = mpsc::Sender<NotificationJob>;
pub type NotificationJobReceiver = mpsc::Receiver<NotificationJob>;

pub fn notification_job_channel() -> (NotificationJobSender, NotificationJobReceiver) {
    mpsc::channel(DEFAULT_CHANNEL_BUFFER)
}

/// Enqueue without waiting. A full or closed queue fails the listener.
pub(crate) fn enqueue(jobs: &NotificationJobSender, job: NotificationJob) -> Result<(), HandlerError> {
    jobs.try_send(job).map_err(|e| match e {
        TrySendError::Full(job) => {
            HandlerError::failed(format!("notification queue is full, dropped {:?}", job.kind()))
        }
        TrySendError::Closed(job) => {
            HandlerError::failed(format!("notification queue is closed, dropped {:?}", job.kind()))
        }
    })
}
