use super::jobs::{NotificationJob, NotificationJobSender, enqueue};
use crate::events::{EventHandler, HandlerResult, UserDeletedAccountEvent, UserSignedUpEvent};
use tracing::debug;

/// Queues the welcome email for a new user.
pub struct PushWelcomeEmailJob {
    jobs: NotificationJobSender,
}

impl PushWelcomeEmailJob {
    pub fn new(jobs: NotificationJobSender) -> Self {
        Self { jobs }
    }
}

impl EventHandler<UserSignedUpEvent> for PushWelcomeEmailJob {
    fn handle_event(&self, event: &UserSignedUpEvent) -> HandlerResult {
        debug!(user_id = %event.id, "Queueing welcome email");
        enqueue(
            &self.jobs,
            NotificationJob::WelcomeEmail {
                user_id: event.id,
                first_name: event.first_name.clone(),
                last_name: event.last_name.clone(),
                email: event.email.clone(),
            },
        )
    }
}

/// Queues avatar processing for a new user.
pub struct PushProcessAvatarJob {
    jobs: NotificationJobSender,
}

impl PushProcessAvatarJob {
    pub fn new(jobs: NotificationJobSender) -> Self {
        Self { jobs }
    }
}

impl EventHandler<UserSignedUpEvent> for PushProcessAvatarJob {
    fn handle_event(&self, event: &UserSignedUpEvent) -> HandlerResult {
        enqueue(
            &self.jobs,
            NotificationJob::ProcessAvatar {
                user_id: event.id,
                first_name: event.first_name.clone(),
            },
        )
    }
}

pub struct SendFarewellEmail {
    jobs: NotificationJobSender,
}

impl SendFarewellEmail {
    pub fn new(jobs: NotificationJobSender) -> Self {
        Self { jobs }
    }
}

impl EventHandler<UserDeletedAccountEvent> for SendFarewellEmail {
    fn handle_event(&self, event: &UserDeletedAccountEvent) -> HandlerResult {
        enqueue(
            &self.jobs,
            NotificationJob::FarewellEmail {
                user_id: event.id,
                email: event.email.clone(),
            },
        )
    }
}

/// Queues erasure of personal data still held outside the users table.
pub struct RemoveProtectedData {
    jobs: NotificationJobSender,
}

impl RemoveProtectedData {
    pub fn new(jobs: NotificationJobSender) -> Self {
        Self { jobs }
    }
}

impl EventHandler<UserDeletedAccountEvent> for RemoveProtectedData {
    fn handle_event(&self, event: &UserDeletedAccountEvent) -> HandlerResult {
        enqueue(
            &self.jobs,
            NotificationJob::RemoveProtectedData { user_id: event.id },
        )
    }
}
