use crate::events::channels::Channel;
use crate::framework::{DatabaseError, DatabaseProcessor};
use kanau::processor::Processor;
use time::OffsetDateTime;
use uuid::Uuid;

pub type OutboxId = Uuid;

/// Durable record of an event raised by a business operation.
///
/// Written in the same unit of work as the state change it describes.
/// `processed_at` goes from `None` to `Some` exactly once, when the relay has
/// dispatched the message.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct OutboxMessage {
    #[sqlx(rename = "outbox_id")]
    pub id: OutboxId,
    /// The subsystem that raised the event (e.g. `users`).
    pub operational_domain: String,
    /// The event type within that domain (e.g. `userSignedUp`).
    pub operational_channel: String,
    /// Serialized JSON. Never interpreted by the outbox itself.
    pub payload: String,
    #[sqlx(rename = "processed_date")]
    pub processed_at: Option<OffsetDateTime>,
}

impl OutboxMessage {
    pub fn new(
        id: OutboxId,
        operational_domain: impl Into<String>,
        operational_channel: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            id,
            operational_domain: operational_domain.into(),
            operational_channel: operational_channel.into(),
            payload: payload.into(),
            processed_at: None,
        }
    }

    /// Build a pending message for channel `C`, serializing `payload` to JSON.
    pub fn for_event<C: Channel>(
        id: OutboxId,
        payload: &C::Payload,
    ) -> Result<Self, serde_json::Error> {
        let payload = serde_json::to_string(payload)?;
        Ok(Self::new(id, C::DOMAIN.as_str(), C::NAME, payload))
    }

    pub fn is_pending(&self) -> bool {
        self.processed_at.is_none()
    }
}

#[derive(Debug, Clone)]
/// Insert one outbox row.
pub struct InsertOutboxMessage {
    pub message: OutboxMessage,
}

impl Processor<InsertOutboxMessage> for DatabaseProcessor {
    type Output = ();
    type Error = DatabaseError;
    #[tracing::instrument(skip_all, err, name = "SQL:InsertOutboxMessage")]
    async fn process(&self, insert: InsertOutboxMessage) -> Result<(), DatabaseError> {
        let InsertOutboxMessage { message } = insert;
        let mut conn = self.acquire().await?;
        sqlx::query(
            r#"
            INSERT INTO outbox
                (outbox_id, operational_domain, operational_channel, payload, processed_date)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(message.id)
        .bind(message.operational_domain)
        .bind(message.operational_channel)
        .bind(message.payload)
        .bind(message.processed_at)
        .execute(conn.executor()?)
        .await?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
/// Select a batch of unprocessed rows in insertion order.
///
/// Rows are locked with `FOR UPDATE SKIP LOCKED`, so when this runs inside a
/// transaction a second relay selecting concurrently skips them until the
/// first one commits or rolls back. Ids in `skip` are never selected.
pub struct GetPendingOutboxMessages {
    pub limit: i64,
    pub skip: Vec<OutboxId>,
}

impl Processor<GetPendingOutboxMessages> for DatabaseProcessor {
    type Output = Vec<OutboxMessage>;
    type Error = DatabaseError;
    #[tracing::instrument(skip_all, err, name = "SQL:GetPendingOutboxMessages")]
    async fn process(
        &self,
        query: GetPendingOutboxMessages,
    ) -> Result<Vec<OutboxMessage>, DatabaseError> {
        let mut conn = self.acquire().await?;
        let messages = sqlx::query_as::<_, OutboxMessage>(
            r#"
            SELECT
                outbox_id,
                operational_domain,
                operational_channel,
                payload,
                processed_date
            FROM outbox
            WHERE processed_date IS NULL
              AND outbox_id <> ALL($2)
            ORDER BY created_at ASC, outbox_id ASC
            LIMIT $1
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(query.limit)
        .bind(query.skip.as_slice())
        .fetch_all(conn.executor()?)
        .await?;
        Ok(messages)
    }
}

#[derive(Debug, Clone)]
/// Set `processed_date` on a pending row.
///
/// Already-processed rows are left untouched. Returns the number of rows
/// updated.
pub struct MarkOutboxMessageProcessed {
    pub outbox_id: OutboxId,
}

impl Processor<MarkOutboxMessageProcessed> for DatabaseProcessor {
    type Output = u64;
    type Error = DatabaseError;
    #[tracing::instrument(skip_all, err, name = "SQL:MarkOutboxMessageProcessed")]
    async fn process(&self, cmd: MarkOutboxMessageProcessed) -> Result<u64, DatabaseError> {
        let mut conn = self.acquire().await?;
        let result = sqlx::query(
            r#"
            UPDATE outbox
            SET processed_date = CURRENT_TIMESTAMP
            WHERE outbox_id = $1 AND processed_date IS NULL
            "#,
        )
        .bind(cmd.outbox_id)
        .execute(conn.executor()?)
        .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::channels::UserSignedUp;
    use crate::events::types::UserSignedUpEvent;

    #[test]
    fn for_event_tags_domain_and_channel() {
        let id = Uuid::now_v7();
        let user_id = Uuid::now_v7();
        let message = OutboxMessage::for_event::<UserSignedUp>(
            id,
            &UserSignedUpEvent {
                id: user_id,
                first_name: "Ada".to_string(),
                last_name: "Lovelace".to_string(),
                email: "ada@example.com".to_string(),
            },
        )
        .unwrap();

        assert_eq!(message.id, id);
        assert_eq!(message.operational_domain, "users");
        assert_eq!(message.operational_channel, "userSignedUp");
        assert!(message.is_pending());

        let payload: serde_json::Value = serde_json::from_str(&message.payload).unwrap();
        assert_eq!(payload["firstName"], "Ada");
        assert_eq!(payload["id"], user_id.to_string());
    }
}
