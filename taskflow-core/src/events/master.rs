//! Registry of named event buses.
//!
//! The [`MasterEventBus`] is built once by the composition root and passed by
//! reference to everything that subscribes or dispatches. Buses cannot be
//! added after construction.

use super::bus::{DispatchReport, EventBus, EventHandler, Listener};
use super::channels::{BusName, Channel, OperationalDomain};
use crate::error::CoreError;
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug)]
pub struct MasterEventBus {
    buses: HashMap<BusName, EventBus>,
}

impl MasterEventBus {
    /// A master bus with every known [`BusName`] registered.
    pub fn new() -> Self {
        Self::with_buses(BusName::ALL)
    }

    /// A master bus with only the given buses registered.
    pub fn with_buses(names: impl IntoIterator<Item = BusName>) -> Self {
        let buses = names
            .into_iter()
            .map(|name| (name, EventBus::new(name)))
            .collect();
        Self { buses }
    }

    pub fn get_bus(&self, name: BusName) -> Result<&EventBus, CoreError> {
        self.buses
            .get(&name)
            .ok_or_else(|| CoreError::BusNotFound(name.to_string()))
    }

    /// Subscribe a typed handler to channel `C` on the bus `C` belongs to.
    pub fn subscribe<C, H>(&self, handler: H) -> Result<Listener, CoreError>
    where
        C: Channel,
        H: EventHandler<C::Payload>,
    {
        self.subscribe_raw(C::BUS, C::NAME, Listener::typed::<C, H>(handler))
    }

    pub fn unsubscribe<C: Channel>(&self, listener: &Listener) -> Result<(), CoreError> {
        self.unsubscribe_raw(C::BUS, C::NAME, listener)
    }

    /// Serialize `payload` and dispatch it on channel `C`.
    pub fn dispatch<C: Channel>(&self, payload: &C::Payload) -> Result<DispatchReport, CoreError> {
        let value = serde_json::to_value(payload)
            .map_err(|e| CoreError::unexpected("EventBus", format!("serialize {}: {e}", C::NAME)))?;
        self.dispatch_raw(C::BUS, C::NAME, &value)
    }

    pub fn subscribe_raw(
        &self,
        bus: BusName,
        channel: &str,
        listener: Listener,
    ) -> Result<Listener, CoreError> {
        let listener = self.get_bus(bus)?.subscribe(channel, listener);
        debug!(%bus, channel, listener = listener.name(), "Listener subscribed");
        Ok(listener)
    }

    pub fn unsubscribe_raw(
        &self,
        bus: BusName,
        channel: &str,
        listener: &Listener,
    ) -> Result<(), CoreError> {
        self.get_bus(bus)?.unsubscribe(channel, listener);
        Ok(())
    }

    pub fn dispatch_raw(
        &self,
        bus: BusName,
        channel: &str,
        payload: &Value,
    ) -> Result<DispatchReport, CoreError> {
        Ok(self.get_bus(bus)?.dispatch(channel, payload))
    }
}

impl Default for MasterEventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Operational domain → bus name lookup used by the relay.
///
/// Keys are the raw strings stored in outbox rows, so unknown domains written
/// by older code (or by hand) resolve to [`CoreError::BusNotFound`] instead of
/// failing to parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainBusMap(HashMap<String, BusName>);

impl DomainBusMap {
    pub fn resolve(&self, domain: &str) -> Result<BusName, CoreError> {
        self.0
            .get(domain)
            .copied()
            .ok_or_else(|| CoreError::BusNotFound(domain.to_string()))
    }
}

impl Default for DomainBusMap {
    fn default() -> Self {
        [
            (OperationalDomain::Users, BusName::UserEventBus),
            (OperationalDomain::Tasks, BusName::TaskEventBus),
        ]
        .into_iter()
        .map(|(domain, bus)| (domain.as_str().to_string(), bus))
        .collect()
    }
}

impl FromIterator<(String, BusName)> for DomainBusMap {
    fn from_iter<I: IntoIterator<Item = (String, BusName)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::bus::HandlerResult;
    use crate::events::channels::UserSignedUp;
    use crate::events::types::UserSignedUpEvent;
    use serde_json::json;
    use std::sync::{Arc, Mutex};
    use uuid::Uuid;

    fn signed_up(first_name: &str) -> UserSignedUpEvent {
        UserSignedUpEvent {
            id: Uuid::now_v7(),
            first_name: first_name.to_string(),
            last_name: String::new(),
            email: format!("{first_name}@example.com"),
        }
    }

    #[test]
    fn typed_subscribe_routes_to_the_channel_bus() {
        let master = MasterEventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        master
            .subscribe::<UserSignedUp, _>(move |e: &UserSignedUpEvent| -> HandlerResult {
                sink.lock().unwrap().push(e.first_name.clone());
                Ok(())
            })
            .unwrap();

        assert_eq!(
            master
                .get_bus(BusName::UserEventBus)
                .unwrap()
                .listener_count("userSignedUp"),
            1
        );
        assert_eq!(
            master
                .get_bus(BusName::TaskEventBus)
                .unwrap()
                .listener_count("userSignedUp"),
            0
        );

        let report = master.dispatch::<UserSignedUp>(&signed_up("ada")).unwrap();
        assert_eq!(report.delivered, 1);
        assert_eq!(*seen.lock().unwrap(), vec!["ada".to_string()]);
    }

    #[test]
    fn typed_unsubscribe_stops_delivery() {
        let master = MasterEventBus::new();
        let listener = master
            .subscribe::<UserSignedUp, _>(|_: &UserSignedUpEvent| -> HandlerResult { Ok(()) })
            .unwrap();
        master.unsubscribe::<UserSignedUp>(&listener).unwrap();

        let report = master.dispatch::<UserSignedUp>(&signed_up("grace")).unwrap();
        assert_eq!(report.invoked(), 0);
    }

    #[test]
    fn unregistered_bus_is_reported() {
        let master = MasterEventBus::with_buses([BusName::UserEventBus]);
        let err = master
            .dispatch_raw(BusName::TaskEventBus, "taskCreated", &json!({}))
            .unwrap_err();
        assert!(matches!(err, CoreError::BusNotFound(name) if name == "taskEventBus"));
    }

    #[test]
    fn domain_map_resolves_known_domains_only() {
        let map = DomainBusMap::default();
        assert_eq!(map.resolve("users").unwrap(), BusName::UserEventBus);
        assert_eq!(map.resolve("tasks").unwrap(), BusName::TaskEventBus);
        assert!(matches!(
            map.resolve("billing"),
            Err(CoreError::BusNotFound(domain)) if domain == "billing"
        ));
    }
}
