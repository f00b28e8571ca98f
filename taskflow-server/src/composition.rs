//! Composition root: builds the master bus, registers handlers and starts the
//! background processors.

use crate::config::LoadedConfig;
use sqlx::PgPool;
use std::sync::Arc;
use taskflow_core::CoreError;
use taskflow_core::config::{ConfigStore, RelaySettings};
use taskflow_core::events::MasterEventBus;
use taskflow_core::handlers::{default_handlers, notification_job_channel};
use taskflow_core::processors::{MessageRelay, NotificationWorker};
use taskflow_core::store::postgres::{PgOutboxRepository, PgUnitOfWorkFactory};
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub struct Processors {
    pub relay: Option<JoinHandle<()>>,
    pub notification_worker: JoinHandle<()>,
}

impl Processors {
    /// Wait for every processor to finish after shutdown was signaled.
    pub async fn join(self) {
        if let Some(relay) = self.relay
            && let Err(e) = relay.await
        {
            tracing::error!("MessageRelay task failed: {}", e);
        }
        if let Err(e) = self.notification_worker.await {
            tracing::error!("NotificationWorker task failed: {}", e);
        }
    }
}

pub fn start_processors(
    pool: PgPool,
    config: &LoadedConfig,
    relay_settings: ConfigStore<RelaySettings>,
    shutdown_rx: watch::Receiver<bool>,
) -> Result<Processors, CoreError> {
    let master = Arc::new(MasterEventBus::new());
    let (jobs_tx, jobs_rx) = notification_job_channel();
    default_handlers(jobs_tx).subscribe_all(&master)?;

    let worker = NotificationWorker::new(config.notifications);
    let notification_worker = tokio::spawn(worker.run(shutdown_rx.clone(), jobs_rx));

    let relay = if config.relay_enabled {
        let relay = MessageRelay::new(
            PgUnitOfWorkFactory::new(pool.clone()),
            PgOutboxRepository::new(pool),
            master,
            config.domains.clone(),
            relay_settings.clone(),
        );
        Some(tokio::spawn(relay.run(shutdown_rx, relay_settings.subscribe())))
    } else {
        tracing::warn!("Message relay disabled; outbox messages will not be dispatched");
        None
    };

    Ok(Processors {
        relay,
        notification_worker,
    })
}
