//! Business operations that change state and raise events.
//!
//! Every operation writes its rows and its outbox message through
//! repositories bound to one unit of work, then commits that unit itself.

pub mod tasks;
pub mod users;

pub use tasks::TaskService;
pub use users::UserService;

use crate::entities::outbox::OutboxMessage;
use crate::error::CoreError;
use crate::events::Channel;
use crate::store::OutboxRepository;

/// Build the outbox row announcing `payload` on channel `C`.
fn outbox_event<C: Channel>(
    outbox: &impl OutboxRepository,
    payload: &C::Payload,
) -> Result<OutboxMessage, CoreError> {
    OutboxMessage::for_event::<C>(outbox.next_identity(), payload).map_err(|e| {
        tracing::error!(channel = C::NAME, error = %e, "Failed to serialize event payload");
        CoreError::unexpected("Outbox", format!("serialize {} payload", C::NAME))
    })
}
