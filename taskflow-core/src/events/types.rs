//! Event payload definitions.
//!
//! Payloads are serialized as camelCase JSON into the outbox and parsed back
//! by the relay. They carry identifiers so consumers can de-duplicate
//! redeliveries.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Published on `userSignedUp` once a user row is committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSignedUpEvent {
    pub id: Uuid,
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub email: String,
}

/// Published on `userDeletedAccount` after a user and their tasks are removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDeletedAccountEvent {
    pub id: Uuid,
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskCreatedEvent {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub due_date: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDeletedEvent {
    pub id: Uuid,
    pub owner_id: Uuid,
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn task_created_round_trips_due_date_as_rfc3339() {
        let event = TaskCreatedEvent {
            id: Uuid::nil(),
            owner_id: Uuid::nil(),
            name: "File taxes".to_string(),
            due_date: Some(datetime!(2025-04-15 09:00 UTC)),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["dueDate"], "2025-04-15T09:00:00Z");

        let parsed: TaskCreatedEvent = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn task_created_without_due_date() {
        let parsed: TaskCreatedEvent = serde_json::from_str(
            r#"{"id":"00000000-0000-0000-0000-000000000000","ownerId":"00000000-0000-0000-0000-000000000000","name":"x"}"#,
        )
        .unwrap();
        assert_eq!(parsed.due_date, None);
    }
}
