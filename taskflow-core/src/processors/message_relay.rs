//! MessageRelay processor.
//!
//! The MessageRelay is responsible for:
//! - Selecting a batch of pending outbox rows inside its own unit of work
//! - Resolving each row's operational domain to an event bus
//! - Dispatching the parsed payload on the row's channel
//! - Marking dispatched rows processed and committing the batch
//!
//! A row whose domain cannot be resolved or whose payload is not JSON is
//! skipped and stays pending; the rest of the batch goes ahead. The relay
//! parks such rows and passes over them on later selects, so they never hold
//! back newer rows. Parked rows are tried again after a restart. If marking a
//! row or committing fails, the whole batch is retried on the next cycle, so
//! listeners may see an event more than once.

use crate::config::{ConfigStore, ConfigWatcher, RelaySettings};
use crate::entities::outbox::{OutboxId, OutboxMessage};
use crate::error::CoreError;
use crate::events::{DispatchReport, DomainBusMap, MasterEventBus};
use crate::store::{OutboxRepository, UnitOfWork, UnitOfWorkCapable, UnitOfWorkFactory};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, watch};
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Why a single row was left pending.
#[derive(Debug, Error)]
pub enum RowError {
    /// Unmapped domain, or a bus the master bus does not know.
    #[error(transparent)]
    Route(#[from] CoreError),

    #[error("payload is not valid JSON: {0}")]
    Payload(#[from] serde_json::Error),
}

#[derive(Debug)]
pub struct RowFailure {
    pub outbox_id: OutboxId,
    pub operational_domain: String,
    pub operational_channel: String,
    pub error: RowError,
}

/// Outcome of one relay cycle.
#[derive(Debug, Default)]
pub struct RelayReport {
    pub selected: usize,
    pub processed: usize,
    pub failures: Vec<RowFailure>,
    /// Listener failures across every dispatched row. These rows are still
    /// marked processed.
    pub listener_failures: usize,
}

pub struct MessageRelay<F, R> {
    factory: F,
    outbox: R,
    master: Arc<MasterEventBus>,
    domains: DomainBusMap,
    settings: ConfigStore<RelaySettings>,
    /// Rows that failed routing or parsing in this process.
    parked: Mutex<HashSet<OutboxId>>,
}

impl<F, R> MessageRelay<F, R>
where
    F: UnitOfWorkFactory,
    R: OutboxRepository + UnitOfWorkCapable<F::UnitOfWork>,
{
    pub fn new(
        factory: F,
        outbox: R,
        master: Arc<MasterEventBus>,
        domains: DomainBusMap,
        settings: ConfigStore<RelaySettings>,
    ) -> Self {
        Self {
            factory,
            outbox,
            master,
            domains,
            settings,
            parked: Mutex::new(HashSet::new()),
        }
    }

    /// Run the relay until shutdown is signaled.
    ///
    /// Cycles run inline on the ticker, so two cycles never overlap. A config
    /// change re-arms the ticker with the new interval; the batch size is read
    /// at the start of every cycle.
    pub async fn run(
        self,
        mut shutdown_rx: watch::Receiver<bool>,
        mut config_watcher: ConfigWatcher,
    ) {
        let mut ticker = self.ticker().await;
        info!(
            interval_ms = ticker.period().as_millis() as u64,
            "MessageRelay started"
        );

        loop {
            tokio::select! {
                biased;

                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("MessageRelay received shutdown signal");
                        break;
                    }
                }

                Ok(()) = config_watcher.changed() => {
                    ticker = self.ticker().await;
                    info!(
                        interval_ms = ticker.period().as_millis() as u64,
                        "MessageRelay reloaded settings"
                    );
                }

                _ = ticker.tick() => {
                    if let Err(e) = self.run_cycle().await {
                        error!(error = %e, "Relay cycle failed; batch will be retried");
                    }
                }
            }
        }

        info!("MessageRelay shutdown complete");
    }

    /// Drain one batch of pending rows.
    pub async fn run_cycle(&self) -> Result<RelayReport, CoreError> {
        let batch_size = self.settings.read().await.batch_size;
        let skip: Vec<OutboxId> = self.parked.lock().await.iter().copied().collect();

        let report = self
            .factory
            .create_under_scope(|uow| {
                let outbox = self.outbox.for_unit_of_work(&uow);
                let skip = skip.as_slice();
                async move {
                    let pending = outbox.fetch_pending(batch_size, skip).await?;
                    let mut report = RelayReport {
                        selected: pending.len(),
                        ..RelayReport::default()
                    };

                    for message in pending {
                        match self.dispatch(&message) {
                            Ok(dispatched) => {
                                report.listener_failures += dispatched.failures.len();
                                outbox.mark_processed(message.id).await?;
                                report.processed += 1;
                            }
                            Err(error) => {
                                warn!(
                                    outbox_id = %message.id,
                                    domain = %message.operational_domain,
                                    channel = %message.operational_channel,
                                    error = %error,
                                    "Outbox message left pending"
                                );
                                report.failures.push(RowFailure {
                                    outbox_id: message.id,
                                    operational_domain: message.operational_domain,
                                    operational_channel: message.operational_channel,
                                    error,
                                });
                            }
                        }
                    }

                    uow.commit().await?;
                    Ok::<_, CoreError>(report)
                }
            })
            .await?;

        let parked = {
            let mut parked = self.parked.lock().await;
            parked.extend(report.failures.iter().map(|f| f.outbox_id));
            parked.len()
        };

        if report.selected > 0 {
            info!(
                selected = report.selected,
                processed = report.processed,
                failed = report.failures.len(),
                listener_failures = report.listener_failures,
                parked,
                "Relay cycle complete"
            );
        } else {
            debug!("Relay cycle found no pending messages");
        }
        Ok(report)
    }

    fn dispatch(&self, message: &OutboxMessage) -> Result<DispatchReport, RowError> {
        let bus = self.domains.resolve(&message.operational_domain)?;
        let payload: Value = serde_json::from_str(&message.payload)?;
        let report = self
            .master
            .dispatch_raw(bus, &message.operational_channel, &payload)?;
        debug!(
            outbox_id = %message.id,
            %bus,
            channel = %message.operational_channel,
            delivered = report.delivered,
            "Outbox message dispatched"
        );
        Ok(report)
    }

    async fn ticker(&self) -> Interval {
        let period = self.settings.read().await.interval;
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{BusName, HandlerError, Listener};
    use crate::store::memory::{MemoryOutboxRepository, MemoryStore};
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;

    type Relay = MessageRelay<MemoryStore, MemoryOutboxRepository>;

    struct Harness {
        store: MemoryStore,
        master: Arc<MasterEventBus>,
        settings: ConfigStore<RelaySettings>,
        seen: Arc<Mutex<Vec<(String, Value)>>>,
    }

    impl Harness {
        fn new() -> Self {
            let master = Arc::new(MasterEventBus::new());
            let seen = Arc::new(Mutex::new(Vec::new()));
            for (bus, channel) in [
                (BusName::UserEventBus, "userSignedUp"),
                (BusName::TaskEventBus, "taskCreated"),
            ] {
                let sink = Arc::clone(&seen);
                master
                    .subscribe_raw(
                        bus,
                        channel,
                        Listener::raw("recorder", move |payload| {
                            sink.lock().unwrap().push((channel.to_string(), payload.clone()));
                            Ok(())
                        }),
                    )
                    .unwrap();
            }
            Self {
                store: MemoryStore::new(),
                master,
                settings: ConfigStore::new(RelaySettings::default()),
                seen,
            }
        }

        fn relay(&self) -> Relay {
            MessageRelay::new(
                self.store.clone(),
                self.store.outbox_repository(),
                Arc::clone(&self.master),
                DomainBusMap::default(),
                self.settings.clone(),
            )
        }

        async fn seed(&self, rows: &[(&str, &str, &str)]) -> Vec<OutboxId> {
            let uow = self.store.create().await.unwrap();
            let outbox = self.store.outbox_repository().for_unit_of_work(&uow);
            let mut ids = Vec::new();
            for (domain, channel, payload) in rows {
                let id = outbox.next_identity();
                outbox
                    .add_outbox_message(OutboxMessage::new(id, *domain, *channel, *payload))
                    .await
                    .unwrap();
                ids.push(id);
            }
            uow.commit().await.unwrap();
            ids
        }

        fn seen(&self) -> Vec<(String, Value)> {
            self.seen.lock().unwrap().clone()
        }

        fn pending(&self) -> Vec<OutboxId> {
            self.store
                .outbox_messages()
                .into_iter()
                .filter(|m| m.is_pending())
                .map(|m| m.id)
                .collect()
        }
    }

    #[tokio::test]
    async fn dispatches_once_and_marks_processed() {
        let h = Harness::new();
        h.seed(&[("users", "userSignedUp", r#"{"id":"u1","email":"a@b.com"}"#)])
            .await;
        let relay = h.relay();

        let report = relay.run_cycle().await.unwrap();
        assert_eq!(report.selected, 1);
        assert_eq!(report.processed, 1);
        assert!(report.failures.is_empty());
        assert_eq!(
            h.seen(),
            vec![(
                "userSignedUp".to_string(),
                json!({"id": "u1", "email": "a@b.com"})
            )]
        );
        assert!(h.pending().is_empty());

        // Processed rows are never selected again.
        let second = relay.run_cycle().await.unwrap();
        assert_eq!(second.selected, 0);
        assert_eq!(h.seen().len(), 1);
    }

    #[tokio::test]
    async fn dispatches_in_insertion_order() {
        let h = Harness::new();
        h.seed(&[
            ("tasks", "taskCreated", r#"{"n":1}"#),
            ("users", "userSignedUp", r#"{"n":2}"#),
        ])
        .await;

        h.relay().run_cycle().await.unwrap();

        let seen = h.seen();
        assert_eq!(seen[0].0, "taskCreated");
        assert_eq!(seen[0].1["n"], 1);
        assert_eq!(seen[1].0, "userSignedUp");
        assert_eq!(seen[1].1["n"], 2);
    }

    #[tokio::test]
    async fn unmapped_domain_stays_pending_without_blocking_the_batch() {
        let h = Harness::new();
        let ids = h
            .seed(&[
                ("billing", "invoicePaid", "{}"),
                ("users", "userSignedUp", "{}"),
            ])
            .await;

        let report = h.relay().run_cycle().await.unwrap();

        assert_eq!(report.processed, 1);
        assert_eq!(report.failures.len(), 1);
        let failure = &report.failures[0];
        assert_eq!(failure.outbox_id, ids[0]);
        assert!(matches!(
            &failure.error,
            RowError::Route(CoreError::BusNotFound(domain)) if domain == "billing"
        ));
        assert_eq!(h.pending(), vec![ids[0]]);
    }

    #[tokio::test]
    async fn failed_rows_do_not_starve_later_rows() {
        let h = Harness::new();
        h.settings
            .update(RelaySettings::new(Duration::from_secs(5), 2).unwrap())
            .await;
        let ids = h
            .seed(&[
                ("billing", "invoicePaid", r#"{"n":1}"#),
                ("billing", "invoicePaid", r#"{"n":2}"#),
                ("users", "userSignedUp", r#"{"n":3}"#),
            ])
            .await;
        let relay = h.relay();

        let first = relay.run_cycle().await.unwrap();
        assert_eq!(first.selected, 2);
        assert_eq!(first.processed, 0);
        assert_eq!(first.failures.len(), 2);

        let second = relay.run_cycle().await.unwrap();
        assert_eq!(second.selected, 1);
        assert_eq!(second.processed, 1);
        assert_eq!(h.seen().len(), 1);
        assert_eq!(h.seen()[0].1["n"], 3);
        assert_eq!(h.pending(), ids[..2]);

        assert_eq!(relay.run_cycle().await.unwrap().selected, 0);
    }

    #[tokio::test]
    async fn malformed_payload_stays_pending() {
        let h = Harness::new();
        let ids = h.seed(&[("users", "userSignedUp", "{not json")]).await;

        let report = h.relay().run_cycle().await.unwrap();

        assert!(matches!(report.failures[0].error, RowError::Payload(_)));
        assert!(h.seen().is_empty());
        assert_eq!(h.pending(), ids);
    }

    #[tokio::test]
    async fn failed_commit_redelivers_the_whole_batch() {
        let h = Harness::new();
        h.seed(&[
            ("users", "userSignedUp", "{}"),
            ("tasks", "taskCreated", "{}"),
        ])
        .await;
        let relay = h.relay();

        h.store.fail_next_commit();
        assert!(relay.run_cycle().await.is_err());
        assert_eq!(h.seen().len(), 2);
        assert_eq!(h.pending().len(), 2);

        let report = relay.run_cycle().await.unwrap();
        assert_eq!(report.processed, 2);
        assert_eq!(h.seen().len(), 4);
        assert!(h.pending().is_empty());
    }

    #[tokio::test]
    async fn listener_failure_still_marks_the_row() {
        let h = Harness::new();
        h.master
            .subscribe_raw(
                BusName::UserEventBus,
                "userSignedUp",
                Listener::raw("flaky", |_| Err(HandlerError::failed("downstream unavailable"))),
            )
            .unwrap();
        h.seed(&[("users", "userSignedUp", "{}")]).await;

        let report = h.relay().run_cycle().await.unwrap();

        assert_eq!(report.processed, 1);
        assert_eq!(report.listener_failures, 1);
        assert!(h.pending().is_empty());
    }

    #[tokio::test]
    async fn batch_size_limits_each_cycle() {
        let h = Harness::new();
        h.settings
            .update(RelaySettings::new(Duration::from_secs(5), 2).unwrap())
            .await;
        h.seed(&[
            ("users", "userSignedUp", "{}"),
            ("users", "userSignedUp", "{}"),
            ("users", "userSignedUp", "{}"),
        ])
        .await;
        let relay = h.relay();

        assert_eq!(relay.run_cycle().await.unwrap().processed, 2);
        assert_eq!(relay.run_cycle().await.unwrap().processed, 1);
    }

    #[tokio::test]
    async fn unavailable_store_fails_the_cycle() {
        let h = Harness::new();
        h.store.close();
        assert!(matches!(
            h.relay().run_cycle().await,
            Err(CoreError::ScopeCreation(_))
        ));
    }

    #[tokio::test]
    async fn run_drains_on_ticks_and_stops_on_shutdown() {
        let h = Harness::new();
        h.settings
            .update(RelaySettings::new(Duration::from_millis(10), 100).unwrap())
            .await;
        h.seed(&[("users", "userSignedUp", r#"{"id":"late"}"#)]).await;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(h.relay().run(shutdown_rx, h.settings.subscribe()));

        tokio::time::timeout(Duration::from_secs(5), async {
            while !h.pending().is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(h.seen().len(), 1);
    }
}
