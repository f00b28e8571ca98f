//! Explicit handler registration.
//!
//! Each entry pairs a handler with the (bus, channel) it listens on. The
//! composition root builds one table and applies it to the master bus once at
//! startup.

use super::jobs::NotificationJobSender;
use super::tasks::{CancelTaskReminders, ScheduleDueDateReminder};
use super::users::{PushProcessAvatarJob, PushWelcomeEmailJob, RemoveProtectedData, SendFarewellEmail};
use crate::error::CoreError;
use crate::events::{
    BusName, Channel, EventHandler, Listener, MasterEventBus, TaskCreated, TaskDeleted,
    UserDeletedAccount, UserSignedUp,
};
use tracing::info;

struct Registration {
    bus: BusName,
    channel: &'static str,
    listener: Listener,
}

#[derive(Default)]
pub struct HandlerTable {
    entries: Vec<Registration>,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<C, H>(mut self, handler: H) -> Self
    where
        C: Channel,
        H: EventHandler<C::Payload>,
    {
        self.entries.push(Registration {
            bus: C::BUS,
            channel: C::NAME,
            listener: Listener::typed::<C, H>(handler),
        });
        self
    }

    /// Subscribe every entry, in table order. Returns the subscribed listeners.
    pub fn subscribe_all(self, master: &MasterEventBus) -> Result<Vec<Listener>, CoreError> {
        let listeners = self
            .entries
            .into_iter()
            .map(|entry| master.subscribe_raw(entry.bus, entry.channel, entry.listener))
            .collect::<Result<Vec<_>, _>>()?;
        info!(count = listeners.len(), "Event handlers registered");
        Ok(listeners)
    }
}

/// Every handler the application ships with.
pub fn default_handlers(jobs: NotificationJobSender) -> HandlerTable {
    HandlerTable::new()
        .register::<UserSignedUp, _>(PushWelcomeEmailJob::new(jobs.clone()))
        .register::<UserSignedUp, _>(PushProcessAvatarJob::new(jobs.clone()))
        .register::<UserDeletedAccount, _>(SendFarewellEmail::new(jobs.clone()))
        .register::<UserDeletedAccount, _>(RemoveProtectedData::new(jobs.clone()))
        .register::<TaskCreated, _>(ScheduleDueDateReminder::new(jobs.clone()))
        .register::<TaskDeleted, _>(CancelTaskReminders::new(jobs))
}
