//! NotificationWorker processor.
//!
//! Drains the `NotificationJob` queue filled by event handlers. Since events
//! are delivered at least once, the same job can arrive twice; the worker
//! remembers the most recent job keys and drops repeats.
//!
//! Email delivery and image processing live outside this crate; the worker
//! records what it would hand to them.

use crate::config::NotificationSettings;
use crate::handlers::{JobKind, NotificationJob, NotificationJobReceiver};
use kanau::processor::Processor;
use std::collections::{HashSet, VecDeque};
use std::convert::Infallible;
use std::sync::{Mutex, PoisonError};
use tokio::sync::watch;
use tracing::{debug, info};
use uuid::Uuid;

type JobKey = (JobKind, Uuid);

/// Bounded set of recently seen job keys, evicting the oldest first.
struct RecentJobs {
    capacity: usize,
    order: VecDeque<JobKey>,
    seen: HashSet<JobKey>,
}

impl RecentJobs {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity),
            seen: HashSet::with_capacity(capacity),
        }
    }

    /// Returns `false` if `key` was already present.
    fn insert(&mut self, key: JobKey) -> bool {
        if !self.seen.insert(key) {
            return false;
        }
        self.order.push_back(key);
        if self.order.len() > self.capacity
            && let Some(oldest) = self.order.pop_front()
        {
            self.seen.remove(&oldest);
        }
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Delivered,
    Duplicate,
}

pub struct NotificationWorker {
    recent: Mutex<RecentJobs>,
}

impl NotificationWorker {
    pub fn new(settings: NotificationSettings) -> Self {
        Self {
            recent: Mutex::new(RecentJobs::new(settings.dedup_capacity)),
        }
    }

    /// Run until shutdown is signaled or every job sender is dropped.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>, mut jobs_rx: NotificationJobReceiver) {
        info!("NotificationWorker started");
        loop {
            tokio::select! {
                biased;

                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("NotificationWorker received shutdown signal");
                        break;
                    }
                }

                job = jobs_rx.recv() => match job {
                    Some(job) => {
                        let _ = self.process(job).await;
                    }
                    None => {
                        info!("NotificationJob channel closed");
                        break;
                    }
                },
            }
        }
        info!("NotificationWorker shutdown complete");
    }

    fn deliver(job: &NotificationJob) {
        match job {
            NotificationJob::WelcomeEmail { user_id, email, .. } => {
                info!(%user_id, %email, "Sent welcome email");
            }
            NotificationJob::ProcessAvatar { user_id, .. } => {
                info!(%user_id, "Queued avatar processing");
            }
            NotificationJob::FarewellEmail { user_id, email } => {
                info!(%user_id, %email, "Sent farewell email");
            }
            NotificationJob::RemoveProtectedData { user_id } => {
                info!(%user_id, "Removed protected user data");
            }
            NotificationJob::DueDateReminder {
                task_id, due_date, ..
            } => {
                info!(%task_id, %due_date, "Scheduled due date reminder");
            }
            NotificationJob::CancelTaskReminders { task_id } => {
                info!(%task_id, "Cancelled task reminders");
            }
        }
    }
}

impl Processor<NotificationJob> for NotificationWorker {
    type Output = JobOutcome;
    type Error = Infallible;

    async fn process(&self, job: NotificationJob) -> Result<JobOutcome, Infallible> {
        let fresh = self
            .recent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(job.dedup_key());
        if !fresh {
            debug!(kind = ?job.kind(), subject = %job.subject_id(), "Dropping duplicate job");
            return Ok(JobOutcome::Duplicate);
        }
        Self::deliver(&job);
        Ok(JobOutcome::Delivered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::notification_job_channel;
    use std::time::Duration;

    fn farewell(user_id: Uuid) -> NotificationJob {
        NotificationJob::FarewellEmail {
            user_id,
            email: "ada@example.com".to_string(),
        }
    }

    #[tokio::test]
    async fn repeated_jobs_are_dropped() {
        let worker = NotificationWorker::new(NotificationSettings::default());
        let user_id = Uuid::now_v7();

        assert_eq!(worker.process(farewell(user_id)).await.unwrap(), JobOutcome::Delivered);
        assert_eq!(worker.process(farewell(user_id)).await.unwrap(), JobOutcome::Duplicate);

        // Same subject, different job kind.
        let erase = NotificationJob::RemoveProtectedData { user_id };
        assert_eq!(worker.process(erase).await.unwrap(), JobOutcome::Delivered);
    }

    #[tokio::test]
    async fn oldest_keys_are_forgotten_past_capacity() {
        let worker = NotificationWorker::new(NotificationSettings::new(2).unwrap());
        let first = Uuid::now_v7();

        worker.process(farewell(first)).await.unwrap();
        worker.process(farewell(Uuid::now_v7())).await.unwrap();
        worker.process(farewell(Uuid::now_v7())).await.unwrap();

        assert_eq!(worker.process(farewell(first)).await.unwrap(), JobOutcome::Delivered);
    }

    #[tokio::test]
    async fn run_exits_when_senders_are_dropped() {
        let (tx, rx) = notification_job_channel();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        tx.send(farewell(Uuid::now_v7())).await.unwrap();
        drop(tx);

        let worker = NotificationWorker::new(NotificationSettings::default());
        tokio::time::timeout(Duration::from_secs(5), worker.run(shutdown_rx, rx))
            .await
            .unwrap();
    }
}
