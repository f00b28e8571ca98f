//! In-process synchronous publish/subscribe.
//!
//! An [`EventBus`] maps a channel name to an ordered list of [`Listener`]s.
//! `dispatch` runs every listener to completion, in subscription order, on the
//! caller's thread. A listener that fails (or panics) is recorded in the
//! returned [`DispatchReport`] and does not stop the listeners after it.

use super::channels::{BusName, Channel};
use serde::Deserialize;
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;
use tracing::warn;

/// Why a single listener invocation failed.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The payload did not match the channel's payload type.
    #[error("payload does not match the channel: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("{0}")]
    Failed(String),

    #[error("listener panicked: {0}")]
    Panicked(String),
}

impl HandlerError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

pub type HandlerResult = Result<(), HandlerError>;

/// Object-style listener exposing a single "handle event" operation.
///
/// Plain closures `Fn(&E) -> HandlerResult` implement this trait too.
pub trait EventHandler<E>: Send + Sync + 'static {
    fn handle_event(&self, event: &E) -> HandlerResult;
}

impl<E, F> EventHandler<E> for F
where
    F: Fn(&E) -> HandlerResult + Send + Sync + 'static,
{
    fn handle_event(&self, event: &E) -> HandlerResult {
        self(event)
    }
}

type ListenerFn = dyn Fn(&Value) -> HandlerResult + Send + Sync;

/// A subscribed callback.
///
/// Cloning a listener yields the same listener: equality is identity of the
/// underlying callback, which is what [`EventBus::unsubscribe`] matches on.
#[derive(Clone)]
pub struct Listener {
    name: &'static str,
    callback: Arc<ListenerFn>,
}

impl Listener {
    /// Wrap a typed handler for channel `C`.
    ///
    /// The JSON payload is decoded into `C::Payload` before the handler runs;
    /// a decode failure is reported as [`HandlerError::Payload`].
    pub fn typed<C, H>(handler: H) -> Self
    where
        C: Channel,
        H: EventHandler<C::Payload>,
    {
        Self {
            name: std::any::type_name::<H>(),
            callback: Arc::new(move |value: &Value| {
                let payload = C::Payload::deserialize(value)?;
                handler.handle_event(&payload)
            }),
        }
    }

    /// Wrap an untyped callback receiving the raw JSON payload.
    pub fn raw<F>(name: &'static str, callback: F) -> Self
    where
        F: Fn(&Value) -> HandlerResult + Send + Sync + 'static,
    {
        Self {
            name,
            callback: Arc::new(callback),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    fn invoke(&self, payload: &Value) -> HandlerResult {
        match catch_unwind(AssertUnwindSafe(|| (self.callback)(payload))) {
            Ok(result) => result,
            Err(panic) => Err(HandlerError::Panicked(panic_message(panic.as_ref()))),
        }
    }
}

impl PartialEq for Listener {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.callback, &other.callback)
    }
}

impl Eq for Listener {}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener").field("name", &self.name).finish()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[derive(Debug)]
pub struct ListenerFailure {
    pub listener: &'static str,
    pub error: HandlerError,
}

/// Outcome of one `dispatch` call.
#[derive(Debug, Default)]
pub struct DispatchReport {
    /// Listeners that returned `Ok`.
    pub delivered: usize,
    pub failures: Vec<ListenerFailure>,
}

impl DispatchReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Total number of listeners invoked.
    pub fn invoked(&self) -> usize {
        self.delivered + self.failures.len()
    }
}

/// Channel → ordered listeners registry for one bus.
pub struct EventBus {
    name: BusName,
    listeners: RwLock<HashMap<String, Vec<Listener>>>,
}

impl EventBus {
    pub fn new(name: BusName) -> Self {
        Self {
            name,
            listeners: RwLock::new(HashMap::new()),
        }
    }

    pub fn name(&self) -> BusName {
        self.name
    }

    /// Append `listener` to `channel` and return it.
    ///
    /// Subscribing the same listener twice registers it twice.
    pub fn subscribe(&self, channel: &str, listener: Listener) -> Listener {
        let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        listeners
            .entry(channel.to_string())
            .or_default()
            .push(listener.clone());
        listener
    }

    /// Remove every registration of `listener` on `channel`. No-op if absent.
    pub fn unsubscribe(&self, channel: &str, listener: &Listener) {
        let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(registered) = listeners.get_mut(channel) {
            registered.retain(|existing| existing != listener);
            if registered.is_empty() {
                listeners.remove(channel);
            }
        }
    }

    /// Invoke every listener currently on `channel`, in subscription order.
    ///
    /// The listener list is snapshotted first, so listeners may subscribe or
    /// unsubscribe from inside a callback without deadlocking; such changes
    /// take effect from the next dispatch.
    pub fn dispatch(&self, channel: &str, payload: &Value) -> DispatchReport {
        let snapshot = {
            let listeners = self.listeners.read().unwrap_or_else(PoisonError::into_inner);
            match listeners.get(channel) {
                Some(registered) => registered.clone(),
                None => return DispatchReport::default(),
            }
        };

        let mut report = DispatchReport::default();
        for listener in snapshot {
            match listener.invoke(payload) {
                Ok(()) => report.delivered += 1,
                Err(error) => {
                    warn!(
                        bus = %self.name,
                        channel,
                        listener = listener.name(),
                        error = %error,
                        "Event listener failed"
                    );
                    report.failures.push(ListenerFailure {
                        listener: listener.name(),
                        error,
                    });
                }
            }
        }
        report
    }

    pub fn listener_count(&self, channel: &str) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(channel)
            .map_or(0, Vec::len)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus").field("name", &self.name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::channels::TaskDeleted;
    use crate::events::types::TaskDeletedEvent;
    use serde_json::json;
    use std::sync::Mutex;
    use uuid::Uuid;

    fn recorder(log: &Arc<Mutex<Vec<&'static str>>>, tag: &'static str) -> Listener {
        let log = Arc::clone(log);
        Listener::raw(tag, move |_| {
            log.lock().unwrap().push(tag);
            Ok(())
        })
    }

    #[test]
    fn dispatch_runs_listeners_in_subscription_order() {
        let bus = EventBus::new(BusName::UserEventBus);
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe("userSignedUp", recorder(&log, "first"));
        bus.subscribe("userSignedUp", recorder(&log, "second"));
        bus.subscribe("userDeletedAccount", recorder(&log, "other"));

        let report = bus.dispatch("userSignedUp", &json!({}));

        assert_eq!(report.delivered, 2);
        assert!(report.is_clean());
        assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn dispatch_without_listeners_is_a_noop() {
        let bus = EventBus::new(BusName::TaskEventBus);
        let report = bus.dispatch("taskCreated", &json!({"id": 1}));
        assert_eq!(report.invoked(), 0);
    }

    #[test]
    fn duplicate_subscriptions_are_kept_and_unsubscribe_removes_all() {
        let bus = EventBus::new(BusName::UserEventBus);
        let log = Arc::new(Mutex::new(Vec::new()));
        let listener = recorder(&log, "dup");
        let kept = recorder(&log, "kept");

        let returned = bus.subscribe("userSignedUp", listener.clone());
        assert_eq!(returned, listener);
        bus.subscribe("userSignedUp", listener.clone());
        bus.subscribe("userSignedUp", kept);

        bus.dispatch("userSignedUp", &json!({}));
        assert_eq!(*log.lock().unwrap(), vec!["dup", "dup", "kept"]);

        bus.unsubscribe("userSignedUp", &listener);
        log.lock().unwrap().clear();
        bus.dispatch("userSignedUp", &json!({}));
        assert_eq!(*log.lock().unwrap(), vec!["kept"]);
        assert_eq!(bus.listener_count("userSignedUp"), 1);
    }

    #[test]
    fn unsubscribe_matches_identity_not_behaviour() {
        let bus = EventBus::new(BusName::UserEventBus);
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe("userSignedUp", recorder(&log, "same"));

        // Structurally identical, but a different callback.
        bus.unsubscribe("userSignedUp", &recorder(&log, "same"));
        bus.unsubscribe("missing", &recorder(&log, "same"));

        assert_eq!(bus.listener_count("userSignedUp"), 1);
    }

    #[test]
    fn failing_and_panicking_listeners_do_not_stop_the_rest() {
        let bus = EventBus::new(BusName::UserEventBus);
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe(
            "userSignedUp",
            Listener::raw("fails", |_| Err(HandlerError::failed("smtp unavailable"))),
        );
        bus.subscribe(
            "userSignedUp",
            Listener::raw("panics", |_| panic!("listener bug")),
        );
        bus.subscribe("userSignedUp", recorder(&log, "last"));

        let report = bus.dispatch("userSignedUp", &json!({}));

        assert_eq!(report.delivered, 1);
        assert_eq!(report.failures.len(), 2);
        assert_eq!(report.failures[0].listener, "fails");
        assert!(matches!(report.failures[0].error, HandlerError::Failed(_)));
        assert!(
            matches!(&report.failures[1].error, HandlerError::Panicked(msg) if msg == "listener bug")
        );
        assert_eq!(*log.lock().unwrap(), vec!["last"]);
    }

    #[test]
    fn typed_listener_decodes_payload() {
        let bus = EventBus::new(BusName::TaskEventBus);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        bus.subscribe(
            "taskDeleted",
            Listener::typed::<TaskDeleted, _>(move |event: &TaskDeletedEvent| {
                sink.lock().unwrap().push(event.id);
                Ok(())
            }),
        );

        let id = Uuid::now_v7();
        let ok = bus.dispatch("taskDeleted", &json!({"id": id, "ownerId": Uuid::nil()}));
        let bad = bus.dispatch("taskDeleted", &json!({"unexpected": true}));

        assert!(ok.is_clean());
        assert!(matches!(bad.failures[0].error, HandlerError::Payload(_)));
        assert_eq!(*seen.lock().unwrap(), vec![id]);
    }

    #[test]
    fn listener_may_unsubscribe_itself_during_dispatch() {
        let bus = Arc::new(EventBus::new(BusName::UserEventBus));
        let slot: Arc<Mutex<Option<Listener>>> = Arc::new(Mutex::new(None));

        let bus_ref = Arc::clone(&bus);
        let slot_ref = Arc::clone(&slot);
        let once = Listener::raw("once", move |_| {
            if let Some(me) = slot_ref.lock().unwrap().take() {
                bus_ref.unsubscribe("userSignedUp", &me);
            }
            Ok(())
        });
        *slot.lock().unwrap() = Some(bus.subscribe("userSignedUp", once));

        assert_eq!(bus.dispatch("userSignedUp", &json!({})).delivered, 1);
        assert_eq!(bus.dispatch("userSignedUp", &json!({})).delivered, 0);
    }
}
