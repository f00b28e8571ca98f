//! Event system: typed channels, per-bus listener registries and the master
//! bus that routes between them.
//!
//! # Event Flow
//!
//! 1. A service writes its rows and an `OutboxMessage` in one unit of work
//! 2. `MessageRelay` selects pending rows and resolves domain -> `BusName`
//! 3. `MasterEventBus` dispatches the payload on the row's channel
//! 4. Handlers enqueue `NotificationJob`s -> `NotificationWorker`
//!
//! Delivery is at-least-once. Payloads carry identifiers so listeners can
//! de-duplicate.

pub mod bus;
pub mod channels;
pub mod master;
pub mod types;

pub use bus::{
    DispatchReport, EventBus, EventHandler, HandlerError, HandlerResult, Listener,
    ListenerFailure,
};
pub use channels::{
    BusName, Channel, OperationalDomain, TaskCreated, TaskDeleted, UserDeletedAccount,
    UserSignedUp,
};
pub use master::{DomainBusMap, MasterEventBus};
pub use types::{TaskCreatedEvent, TaskDeletedEvent, UserDeletedAccountEvent, UserSignedUpEvent};
