//! Unit of work and repository seams.
//!
//! A [`UnitOfWork`] is one atomic persistence scope. Repositories are not
//! transaction-aware by themselves; [`UnitOfWorkCapable::for_unit_of_work`]
//! returns a new instance whose reads and writes go through the given scope,
//! leaving the original repository untouched.
//!
//! Two backends implement these traits:
//!
//! - [`postgres`]: `sqlx` transactions against a `PgPool`
//! - [`memory`]: an in-process store with the same visibility rules

pub mod memory;
pub mod postgres;

use crate::entities::outbox::{OutboxId, OutboxMessage};
use crate::entities::tasks::{Task, TaskId};
use crate::entities::users::{User, UserId};
use crate::error::CoreError;
use async_trait::async_trait;
use std::future::Future;
use tracing::warn;

/// One atomic execution scope.
///
/// Handles are cheap to clone; every clone refers to the same scope. The scope
/// is terminated by exactly one successful `commit` or `rollback`.
#[async_trait]
pub trait UnitOfWork: Clone + Send + Sync + 'static {
    /// Commit every write made through this scope.
    ///
    /// Fails with [`CoreError::ScopeTerminated`] if the scope was already
    /// committed or rolled back.
    async fn commit(&self) -> Result<(), CoreError>;

    /// Discard every write made through this scope.
    ///
    /// Rolling back a terminated scope is a no-op.
    async fn rollback(&self) -> Result<(), CoreError>;
}

/// Builds units of work against an underlying store.
#[async_trait]
pub trait UnitOfWorkFactory: Send + Sync {
    type UnitOfWork: UnitOfWork;

    /// Begin a new atomic scope.
    async fn create(&self) -> Result<Self::UnitOfWork, CoreError>;

    /// Run `operation` inside a fresh scope.
    ///
    /// The scope is not committed automatically; `operation` must call
    /// [`UnitOfWork::commit`] itself. If `operation` fails, the scope is rolled
    /// back and the original error is returned unchanged.
    async fn create_under_scope<T, E, Op, Fut>(&self, operation: Op) -> Result<T, E>
    where
        Op: FnOnce(Self::UnitOfWork) -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send,
        T: Send,
        E: From<CoreError> + Send,
    {
        let unit_of_work = self.create().await.map_err(E::from)?;

        match operation(unit_of_work.clone()).await {
            Ok(value) => Ok(value),
            Err(error) => {
                if let Err(rollback_error) = unit_of_work.rollback().await {
                    warn!(error = %rollback_error, "Failed to roll back unit of work");
                }
                Err(error)
            }
        }
    }
}

/// A repository that can re-instantiate itself bound to a unit of work.
pub trait UnitOfWorkCapable<U: UnitOfWork> {
    /// Return a new repository whose operations run inside `unit_of_work`.
    fn for_unit_of_work(&self, unit_of_work: &U) -> Self;
}

/// Durable record of "an event happened".
#[async_trait]
pub trait OutboxRepository: Send + Sync {
    /// Insert a fully-formed outbox message.
    ///
    /// Only valid on a repository bound to the same scope as the domain write
    /// it accompanies; an unbound repository returns
    /// [`CoreError::UnscopedWrite`].
    async fn add_outbox_message(&self, message: OutboxMessage) -> Result<(), CoreError>;

    /// Fresh identifier for a new message. Pure; safe before any scope exists.
    fn next_identity(&self) -> OutboxId;

    /// Select up to `limit` unprocessed messages in insertion order, passing
    /// over the ids in `skip`.
    ///
    /// Inside a scope the selected rows stay claimed until the scope ends, so
    /// concurrent relays never select the same pending row.
    async fn fetch_pending(
        &self,
        limit: u32,
        skip: &[OutboxId],
    ) -> Result<Vec<OutboxMessage>, CoreError>;

    /// Mark a message as dispatched.
    async fn mark_processed(&self, id: OutboxId) -> Result<(), CoreError>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    fn next_identity(&self) -> UserId;
    async fn add_user(&self, user: User) -> Result<(), CoreError>;
    async fn exists_by_id(&self, id: UserId) -> Result<bool, CoreError>;
    async fn exists_by_username(&self, username: &str) -> Result<bool, CoreError>;
    async fn exists_by_email(&self, email: &str) -> Result<bool, CoreError>;
    /// Fails with [`crate::DomainError::NotFound`] if no user has `id`.
    async fn find_user_by_id(&self, id: UserId) -> Result<User, CoreError>;
    async fn remove_user_by_id(&self, id: UserId) -> Result<(), CoreError>;
}

#[async_trait]
pub trait TaskRepository: Send + Sync {
    fn next_identity(&self) -> TaskId;
    async fn add_task(&self, task: Task) -> Result<(), CoreError>;
    async fn exists_by_id(&self, id: TaskId) -> Result<bool, CoreError>;
    /// Fails with [`crate::DomainError::NotFound`] if no task has `id`.
    async fn find_task_by_id(&self, id: TaskId) -> Result<Task, CoreError>;
    async fn remove_task_by_id(&self, id: TaskId) -> Result<(), CoreError>;
    /// Returns the number of removed tasks.
    async fn remove_tasks_by_owner_id(&self, owner_id: UserId) -> Result<u64, CoreError>;
}
