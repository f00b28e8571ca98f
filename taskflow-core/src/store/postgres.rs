//! Postgres backend: `sqlx` transactions and kanau query objects.

use super::{
    OutboxRepository, TaskRepository, UnitOfWork, UnitOfWorkCapable, UnitOfWorkFactory,
    UserRepository,
};
use crate::entities::outbox::{
    GetPendingOutboxMessages, InsertOutboxMessage, MarkOutboxMessageProcessed, OutboxId,
    OutboxMessage,
};
use crate::entities::tasks::{
    DeleteTask, DeleteTasksByOwner, GetTaskById, InsertTask, Task, TaskId,
};
use crate::entities::users::{DeleteUser, GetUserById, InsertUser, User, UserExists, UserId, UserLookup};
use crate::error::{CoreError, DomainError};
use crate::framework::{DatabaseError, DatabaseProcessor, TransactionSlot};
use async_trait::async_trait;
use kanau::processor::Processor;
use sqlx::PgPool;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, warn};
use uuid::Uuid;

/// Translate a query failure into a [`CoreError`].
///
/// Unique violations become [`DomainError::Conflict`]; everything else is
/// logged here and replaced by an opaque `Unexpected` error.
fn handle_errors(domain: &'static str, action: &'static str) -> impl FnOnce(DatabaseError) -> CoreError {
    move |err| match err {
        DatabaseError::ScopeTerminated => CoreError::ScopeTerminated,
        DatabaseError::Sqlx(e) => {
            let unique_violation = e
                .as_database_error()
                .is_some_and(|db| db.is_unique_violation());
            if unique_violation {
                return DomainError::conflict(domain, "The resource already exists.").into();
            }
            error!(domain, action, error = %e, "Database operation failed");
            CoreError::unexpected(domain, action)
        }
    }
}

#[derive(Clone)]
pub struct PgUnitOfWorkFactory {
    pool: PgPool,
}

impl PgUnitOfWorkFactory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UnitOfWorkFactory for PgUnitOfWorkFactory {
    type UnitOfWork = PgUnitOfWork;

    async fn create(&self) -> Result<PgUnitOfWork, CoreError> {
        let tx = self.pool.begin().await.map_err(|e| {
            error!(error = %e, "Failed to begin transaction");
            CoreError::ScopeCreation(Box::new(e))
        })?;
        Ok(PgUnitOfWork {
            slot: Arc::new(Mutex::new(Some(tx))),
        })
    }
}

/// Handle to one Postgres transaction.
///
/// Dropping the last handle of an unterminated scope rolls the transaction
/// back.
#[derive(Clone)]
pub struct PgUnitOfWork {
    slot: TransactionSlot,
}

impl PgUnitOfWork {
    fn slot(&self) -> TransactionSlot {
        Arc::clone(&self.slot)
    }
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn commit(&self) -> Result<(), CoreError> {
        let tx = self.slot.lock().await.take().ok_or(CoreError::ScopeTerminated)?;
        tx.commit().await.map_err(|e| {
            error!(error = %e, "Failed to commit transaction");
            CoreError::unexpected("UnitOfWork", "commit failed")
        })
    }

    async fn rollback(&self) -> Result<(), CoreError> {
        let Some(tx) = self.slot.lock().await.take() else {
            return Ok(());
        };
        tx.rollback().await.map_err(|e| {
            warn!(error = %e, "Failed to roll back transaction");
            CoreError::unexpected("UnitOfWork", "rollback failed")
        })
    }
}

// -- Outbox -------------------------------------------------------------

#[derive(Clone)]
pub struct PgOutboxRepository {
    db: DatabaseProcessor,
}

impl PgOutboxRepository {
    pub fn new(pool: PgPool) -> Self {
        Self {
            db: DatabaseProcessor::new(pool),
        }
    }
}

impl UnitOfWorkCapable<PgUnitOfWork> for PgOutboxRepository {
    fn for_unit_of_work(&self, unit_of_work: &PgUnitOfWork) -> Self {
        Self {
            db: self.db.bound_to(unit_of_work.slot()),
        }
    }
}

#[async_trait]
impl OutboxRepository for PgOutboxRepository {
    async fn add_outbox_message(&self, message: OutboxMessage) -> Result<(), CoreError> {
        if !self.db.is_scoped() {
            return Err(CoreError::UnscopedWrite);
        }
        self.db
            .process(InsertOutboxMessage { message })
            .await
            .map_err(handle_errors("Outbox", "insert outbox message"))
    }

    fn next_identity(&self) -> OutboxId {
        Uuid::now_v7()
    }

    async fn fetch_pending(
        &self,
        limit: u32,
        skip: &[OutboxId],
    ) -> Result<Vec<OutboxMessage>, CoreError> {
        self.db
            .process(GetPendingOutboxMessages {
                limit: i64::from(limit),
                skip: skip.to_vec(),
            })
            .await
            .map_err(handle_errors("Outbox", "select pending outbox messages"))
    }

    async fn mark_processed(&self, id: OutboxId) -> Result<(), CoreError> {
        let updated = self
            .db
            .process(MarkOutboxMessageProcessed { outbox_id: id })
            .await
            .map_err(handle_errors("Outbox", "mark outbox message processed"))?;
        if updated == 0 {
            warn!(outbox_id = %id, "Outbox message was already processed or does not exist");
        }
        Ok(())
    }
}

// -- Users --------------------------------------------------------------

#[derive(Clone)]
pub struct PgUserRepository {
    db: DatabaseProcessor,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self {
            db: DatabaseProcessor::new(pool),
        }
    }

    async fn exists(&self, lookup: UserLookup) -> Result<bool, CoreError> {
        self.db
            .process(UserExists { lookup })
            .await
            .map_err(handle_errors("Users", "check user existence"))
    }
}

impl UnitOfWorkCapable<PgUnitOfWork> for PgUserRepository {
    fn for_unit_of_work(&self, unit_of_work: &PgUnitOfWork) -> Self {
        Self {
            db: self.db.bound_to(unit_of_work.slot()),
        }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    fn next_identity(&self) -> UserId {
        Uuid::now_v7()
    }

    async fn add_user(&self, user: User) -> Result<(), CoreError> {
        self.db
            .process(InsertUser { user })
            .await
            .map_err(handle_errors("Users", "insert user"))
    }

    async fn exists_by_id(&self, id: UserId) -> Result<bool, CoreError> {
        self.exists(UserLookup::Id(id)).await
    }

    async fn exists_by_username(&self, username: &str) -> Result<bool, CoreError> {
        self.exists(UserLookup::Username(username.to_string())).await
    }

    async fn exists_by_email(&self, email: &str) -> Result<bool, CoreError> {
        self.exists(UserLookup::Email(email.to_string())).await
    }

    async fn find_user_by_id(&self, id: UserId) -> Result<User, CoreError> {
        self.db
            .process(GetUserById { user_id: id })
            .await
            .map_err(handle_errors("Users", "select user"))?
            .ok_or_else(|| DomainError::not_found("Users").into())
    }

    async fn remove_user_by_id(&self, id: UserId) -> Result<(), CoreError> {
        let removed = self
            .db
            .process(DeleteUser { user_id: id })
            .await
            .map_err(handle_errors("Users", "delete user"))?;
        if removed == 0 {
            return Err(DomainError::not_found("Users").into());
        }
        Ok(())
    }
}

// -- Tasks --------------------------------------------------------------

#[derive(Clone)]
pub struct PgTaskRepository {
    db: DatabaseProcessor,
}

impl PgTaskRepository {
    pub fn new(pool: PgPool) -> Self {
        Self {
            db: DatabaseProcessor::new(pool),
        }
    }
}

impl UnitOfWorkCapable<PgUnitOfWork> for PgTaskRepository {
    fn for_unit_of_work(&self, unit_of_work: &PgUnitOfWork) -> Self {
        Self {
            db: self.db.bound_to(unit_of_work.slot()),
        }
    }
}

#[async_trait]
impl TaskRepository for PgTaskRepository {
    fn next_identity(&self) -> TaskId {
        Uuid::now_v7()
    }

    async fn add_task(&self, task: Task) -> Result<(), CoreError> {
        self.db
            .process(InsertTask { task })
            .await
            .map_err(handle_errors("Tasks", "insert task"))
    }

    async fn exists_by_id(&self, id: TaskId) -> Result<bool, CoreError> {
        let task = self
            .db
            .process(GetTaskById { task_id: id })
            .await
            .map_err(handle_errors("Tasks", "select task"))?;
        Ok(task.is_some())
    }

    async fn find_task_by_id(&self, id: TaskId) -> Result<Task, CoreError> {
        self.db
            .process(GetTaskById { task_id: id })
            .await
            .map_err(handle_errors("Tasks", "select task"))?
            .ok_or_else(|| DomainError::not_found("Tasks").into())
    }

    async fn remove_task_by_id(&self, id: TaskId) -> Result<(), CoreError> {
        let removed = self
            .db
            .process(DeleteTask { task_id: id })
            .await
            .map_err(handle_errors("Tasks", "delete task"))?;
        if removed == 0 {
            return Err(DomainError::not_found("Tasks").into());
        }
        Ok(())
    }

    async fn remove_tasks_by_owner_id(&self, owner_id: UserId) -> Result<u64, CoreError> {
        self.db
            .process(DeleteTasksByOwner { owner_id })
            .await
            .map_err(handle_errors("Tasks", "delete tasks by owner"))
    }
}
