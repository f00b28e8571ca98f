use super::jobs::{NotificationJob, NotificationJobSender, enqueue};
use crate::events::{EventHandler, HandlerResult, TaskCreatedEvent, TaskDeletedEvent};

/// Queues a reminder for tasks created with a due date; others are ignored.
pub struct ScheduleDueDateReminder {
    jobs: NotificationJobSender,
}

impl ScheduleDueDateReminder {
    pub fn new(jobs: NotificationJobSender) -> Self {
        Self { jobs }
    }
}

impl EventHandler<TaskCreatedEvent> for ScheduleDueDateReminder {
    fn handle_event(&self, event: &TaskCreatedEvent) -> HandlerResult {
        let Some(due_date) = event.due_date else {
            return Ok(());
        };
        enqueue(
            &self.jobs,
            NotificationJob::DueDateReminder {
                task_id: event.id,
                owner_id: event.owner_id,
                name: event.name.clone(),
                due_date,
            },
        )
    }
}

pub struct CancelTaskReminders {
    jobs: NotificationJobSender,
}

impl CancelTaskReminders {
    pub fn new(jobs: NotificationJobSender) -> Self {
        Self { jobs }
    }
}

impl EventHandler<TaskDeletedEvent> for CancelTaskReminders {
    fn handle_event(&self, event: &TaskDeletedEvent) -> HandlerResult {
        enqueue(
            &self.jobs,
            NotificationJob::CancelTaskReminders { task_id: event.id },
        )
    }
}
