//! Bus names, operational domains and the channel → payload mapping.
//!
//! Every channel is a zero-sized marker implementing [`Channel`], which ties
//! its wire name to the bus it lives on and to its payload type. Typed
//! subscribe and dispatch go through these markers, so publishing the wrong
//! payload on a channel does not compile.

use super::types::{TaskCreatedEvent, TaskDeletedEvent, UserDeletedAccountEvent, UserSignedUpEvent};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Closed set of event buses known to the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BusName {
    UserEventBus,
    TaskEventBus,
}

impl BusName {
    pub const ALL: [BusName; 2] = [BusName::UserEventBus, BusName::TaskEventBus];

    pub fn as_str(&self) -> &'static str {
        match self {
            BusName::UserEventBus => "userEventBus",
            BusName::TaskEventBus => "taskEventBus",
        }
    }
}

impl fmt::Display for BusName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown event bus `{0}`")]
pub struct UnknownBusName(pub String);

impl FromStr for BusName {
    type Err = UnknownBusName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BusName::ALL
            .into_iter()
            .find(|bus| bus.as_str() == s)
            .ok_or_else(|| UnknownBusName(s.to_string()))
    }
}

/// The business areas that raise events into the outbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationalDomain {
    Users,
    Tasks,
}

impl OperationalDomain {
    pub const ALL: [OperationalDomain; 2] = [OperationalDomain::Users, OperationalDomain::Tasks];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationalDomain::Users => "users",
            OperationalDomain::Tasks => "tasks",
        }
    }
}

impl fmt::Display for OperationalDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed event channel.
pub trait Channel: Send + Sync + 'static {
    type Payload: Serialize + DeserializeOwned + Send + Sync + 'static;

    /// Domain written into the outbox row.
    const DOMAIN: OperationalDomain;
    /// Bus the channel's listeners subscribe on.
    const BUS: BusName;
    /// Channel key on the bus and in the outbox row.
    const NAME: &'static str;
}

macro_rules! channel {
    ($(#[$meta:meta])* $marker:ident, $payload:ty, $domain:expr, $bus:expr, $name:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy)]
        pub struct $marker;

        impl Channel for $marker {
            type Payload = $payload;
            const DOMAIN: OperationalDomain = $domain;
            const BUS: BusName = $bus;
            const NAME: &'static str = $name;
        }
    };
}

channel!(
    /// A user completed sign-up.
    UserSignedUp,
    UserSignedUpEvent,
    OperationalDomain::Users,
    BusName::UserEventBus,
    "userSignedUp"
);

channel!(
    /// A user deleted their account.
    UserDeletedAccount,
    UserDeletedAccountEvent,
    OperationalDomain::Users,
    BusName::UserEventBus,
    "userDeletedAccount"
);

channel!(
    TaskCreated,
    TaskCreatedEvent,
    OperationalDomain::Tasks,
    BusName::TaskEventBus,
    "taskCreated"
);

channel!(
    TaskDeleted,
    TaskDeletedEvent,
    OperationalDomain::Tasks,
    BusName::TaskEventBus,
    "taskDeleted"
);
