//! In-process backend with the same visibility rules as the Postgres one.
//!
//! Every scope keeps a log of its writes. Reads inside a scope see the
//! committed tables with that log replayed on top; other scopes and unbound
//! repositories only see committed data. Commit replays the log onto the
//! committed tables. Pending outbox rows selected inside a scope are claimed
//! until the scope ends, which gives the same effect as `SKIP LOCKED`.
//!
//! Fault injection ([`MemoryStore::close`], [`MemoryStore::fail_next_commit`])
//! and [`ScopeStats`] make failure paths testable without a database.

use super::{
    OutboxRepository, TaskRepository, UnitOfWork, UnitOfWorkCapable, UnitOfWorkFactory,
    UserRepository,
};
use crate::entities::outbox::{OutboxId, OutboxMessage};
use crate::entities::tasks::{Task, TaskId};
use crate::entities::users::{User, UserId};
use crate::error::{CoreError, DomainError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, warn};
use uuid::Uuid;

type ScopeId = u64;

#[derive(Debug, Error)]
#[error("memory store is closed")]
pub struct StoreClosed;

/// Counters over the lifetime of a [`MemoryStore`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScopeStats {
    pub begun: u64,
    pub committed: u64,
    pub rolled_back: u64,
    /// Commits that were attempted and failed; their writes are discarded.
    pub failed_commits: u64,
    /// Scopes dropped without commit or rollback.
    pub abandoned: u64,
}

#[derive(Debug, Clone, Default)]
struct Tables {
    users: HashMap<UserId, User>,
    tasks: HashMap<TaskId, Task>,
    /// Insertion order.
    outbox: Vec<OutboxMessage>,
}

#[derive(Debug, Clone)]
enum WriteOp {
    InsertUser(User),
    RemoveUser(UserId),
    InsertTask(Task),
    RemoveTask(TaskId),
    RemoveTasksByOwner(UserId),
    InsertOutbox(OutboxMessage),
    MarkProcessed(OutboxId, OffsetDateTime),
}

impl Tables {
    /// Apply one write, or leave the tables untouched and return the error.
    /// Returns the number of affected rows.
    fn apply(&mut self, op: &WriteOp) -> Result<u64, CoreError> {
        match op {
            WriteOp::InsertUser(user) => {
                let email = user.email.to_lowercase();
                let duplicate = self.users.contains_key(&user.id)
                    || self
                        .users
                        .values()
                        .any(|u| u.username == user.username || u.email.to_lowercase() == email);
                if duplicate {
                    return Err(DomainError::conflict("Users", "The resource already exists.").into());
                }
                self.users.insert(user.id, user.clone());
                Ok(1)
            }
            WriteOp::RemoveUser(id) => {
                if self.users.remove(id).is_none() {
                    return Err(DomainError::not_found("Users").into());
                }
                self.tasks.retain(|_, task| task.owner_id != *id);
                Ok(1)
            }
            WriteOp::InsertTask(task) => {
                if self.tasks.contains_key(&task.id) {
                    return Err(DomainError::conflict("Tasks", "The resource already exists.").into());
                }
                if !self.users.contains_key(&task.owner_id) {
                    // foreign key violation
                    return Err(CoreError::unexpected("Tasks", "insert task"));
                }
                self.tasks.insert(task.id, task.clone());
                Ok(1)
            }
            WriteOp::RemoveTask(id) => match self.tasks.remove(id) {
                Some(_) => Ok(1),
                None => Err(DomainError::not_found("Tasks").into()),
            },
            WriteOp::RemoveTasksByOwner(owner_id) => {
                let before = self.tasks.len();
                self.tasks.retain(|_, task| task.owner_id != *owner_id);
                Ok((before - self.tasks.len()) as u64)
            }
            WriteOp::InsertOutbox(message) => {
                if self.outbox.iter().any(|m| m.id == message.id) {
                    return Err(DomainError::conflict("Outbox", "The resource already exists.").into());
                }
                self.outbox.push(message.clone());
                Ok(1)
            }
            WriteOp::MarkProcessed(id, at) => {
                match self
                    .outbox
                    .iter_mut()
                    .find(|m| m.id == *id && m.processed_at.is_none())
                {
                    Some(message) => {
                        message.processed_at = Some(*at);
                        Ok(1)
                    }
                    None => Ok(0),
                }
            }
        }
    }
}

#[derive(Debug, Default)]
struct StoreState {
    tables: Tables,
    /// Write logs of live scopes.
    scopes: HashMap<ScopeId, Vec<WriteOp>>,
    claims: HashMap<OutboxId, ScopeId>,
    next_scope: ScopeId,
    closed: bool,
    fail_next_commit: bool,
    stats: ScopeStats,
}

impl StoreState {
    fn view(&self, scope: Option<ScopeId>) -> Result<Tables, CoreError> {
        let mut tables = self.tables.clone();
        if let Some(id) = scope {
            let ops = self.scopes.get(&id).ok_or(CoreError::ScopeTerminated)?;
            for op in ops {
                tables.apply(op)?;
            }
        }
        Ok(tables)
    }

    /// Unbound writes auto-commit.
    fn write(&mut self, scope: Option<ScopeId>, op: WriteOp) -> Result<u64, CoreError> {
        let Some(id) = scope else {
            return self.tables.apply(&op);
        };
        let affected = self.view(Some(id))?.apply(&op)?;
        self.scopes
            .get_mut(&id)
            .ok_or(CoreError::ScopeTerminated)?
            .push(op);
        Ok(affected)
    }

    fn end_scope(&mut self, id: ScopeId) -> Option<Vec<WriteOp>> {
        let ops = self.scopes.remove(&id)?;
        self.claims.retain(|_, owner| *owner != id);
        Some(ops)
    }

    fn commit(&mut self, id: ScopeId) -> Result<(), CoreError> {
        let ops = self.end_scope(id).ok_or(CoreError::ScopeTerminated)?;

        if std::mem::take(&mut self.fail_next_commit) {
            self.stats.failed_commits += 1;
            return Err(CoreError::unexpected("UnitOfWork", "commit failed"));
        }

        let mut tables = self.tables.clone();
        for op in &ops {
            if let Err(err) = tables.apply(op) {
                self.stats.failed_commits += 1;
                return Err(err);
            }
        }
        self.tables = tables;
        self.stats.committed += 1;
        Ok(())
    }
}

/// Shared in-memory store. Clones refer to the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<StoreState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn user_repository(&self) -> MemoryUserRepository {
        MemoryUserRepository {
            store: self.clone(),
            scope: None,
        }
    }

    pub fn task_repository(&self) -> MemoryTaskRepository {
        MemoryTaskRepository {
            store: self.clone(),
            scope: None,
        }
    }

    pub fn outbox_repository(&self) -> MemoryOutboxRepository {
        MemoryOutboxRepository {
            store: self.clone(),
            scope: None,
        }
    }

    /// Refuse new scopes until [`reopen`](Self::reopen) is called.
    pub fn close(&self) {
        self.lock().closed = true;
    }

    pub fn reopen(&self) {
        self.lock().closed = false;
    }

    /// Make the next commit fail and discard its writes.
    pub fn fail_next_commit(&self) {
        self.lock().fail_next_commit = true;
    }

    pub fn stats(&self) -> ScopeStats {
        self.lock().stats
    }

    /// Scopes that are neither committed nor rolled back.
    pub fn live_scopes(&self) -> usize {
        self.lock().scopes.len()
    }

    /// Committed outbox rows in insertion order.
    pub fn outbox_messages(&self) -> Vec<OutboxMessage> {
        self.lock().tables.outbox.clone()
    }

    pub fn users(&self) -> Vec<User> {
        self.lock().tables.users.values().cloned().collect()
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.lock().tables.tasks.values().cloned().collect()
    }

    fn read<T>(
        &self,
        scope: Option<&ScopeHandle>,
        f: impl FnOnce(&Tables) -> T,
    ) -> Result<T, CoreError> {
        let state = self.lock();
        match scope {
            None => Ok(f(&state.tables)),
            Some(scope) => Ok(f(&state.view(Some(scope.id))?)),
        }
    }

    fn write(&self, scope: Option<&ScopeHandle>, op: WriteOp) -> Result<u64, CoreError> {
        self.lock().write(scope.map(|s| s.id), op)
    }
}

#[async_trait]
impl UnitOfWorkFactory for MemoryStore {
    type UnitOfWork = MemoryUnitOfWork;

    async fn create(&self) -> Result<MemoryUnitOfWork, CoreError> {
        let mut state = self.lock();
        if state.closed {
            return Err(CoreError::ScopeCreation(Box::new(StoreClosed)));
        }
        state.next_scope += 1;
        let id = state.next_scope;
        state.scopes.insert(id, Vec::new());
        state.stats.begun += 1;
        Ok(MemoryUnitOfWork {
            handle: Arc::new(ScopeHandle {
                id,
                store: self.clone(),
            }),
        })
    }
}

/// Owns the scope's lifetime; dropping the last reference abandons the scope.
#[derive(Debug)]
struct ScopeHandle {
    id: ScopeId,
    store: MemoryStore,
}

impl Drop for ScopeHandle {
    fn drop(&mut self) {
        let mut state = self.store.lock();
        if state.end_scope(self.id).is_some() {
            state.stats.abandoned += 1;
            debug!(scope = self.id, "Unit of work dropped without commit; writes discarded");
        }
    }
}

#[derive(Debug, Clone)]
pub struct MemoryUnitOfWork {
    handle: Arc<ScopeHandle>,
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn commit(&self) -> Result<(), CoreError> {
        let result = self.handle.store.lock().commit(self.handle.id);
        if let Err(CoreError::Unexpected { .. }) = &result {
            warn!(scope = self.handle.id, "Unit of work commit failed; writes discarded");
        }
        result
    }

    async fn rollback(&self) -> Result<(), CoreError> {
        let mut state = self.handle.store.lock();
        if state.end_scope(self.handle.id).is_some() {
            state.stats.rolled_back += 1;
        }
        Ok(())
    }
}

// -- Outbox -------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MemoryOutboxRepository {
    store: MemoryStore,
    scope: Option<Arc<ScopeHandle>>,
}

impl UnitOfWorkCapable<MemoryUnitOfWork> for MemoryOutboxRepository {
    fn for_unit_of_work(&self, unit_of_work: &MemoryUnitOfWork) -> Self {
        Self {
            store: self.store.clone(),
            scope: Some(Arc::clone(&unit_of_work.handle)),
        }
    }
}

#[async_trait]
impl OutboxRepository for MemoryOutboxRepository {
    async fn add_outbox_message(&self, message: OutboxMessage) -> Result<(), CoreError> {
        if self.scope.is_none() {
            return Err(CoreError::UnscopedWrite);
        }
        self.store
            .write(self.scope.as_deref(), WriteOp::InsertOutbox(message))?;
        Ok(())
    }

    fn next_identity(&self) -> OutboxId {
        Uuid::now_v7()
    }

    async fn fetch_pending(
        &self,
        limit: u32,
        skip: &[OutboxId],
    ) -> Result<Vec<OutboxMessage>, CoreError> {
        let mut state = self.store.lock();
        let scope = self.scope.as_ref().map(|s| s.id);
        let view = state.view(scope)?;
        let pending: Vec<OutboxMessage> = view
            .outbox
            .into_iter()
            .filter(|m| m.is_pending() && !skip.contains(&m.id))
            .filter(|m| match state.claims.get(&m.id) {
                Some(owner) => Some(*owner) == scope,
                None => true,
            })
            .take(limit as usize)
            .collect();
        if let Some(id) = scope {
            for message in &pending {
                state.claims.insert(message.id, id);
            }
        }
        Ok(pending)
    }

    async fn mark_processed(&self, id: OutboxId) -> Result<(), CoreError> {
        let updated = self.store.write(
            self.scope.as_deref(),
            WriteOp::MarkProcessed(id, OffsetDateTime::now_utc()),
        )?;
        if updated == 0 {
            warn!(outbox_id = %id, "Outbox message was already processed or does not exist");
        }
        Ok(())
    }
}

// -- Users --------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MemoryUserRepository {
    store: MemoryStore,
    scope: Option<Arc<ScopeHandle>>,
}

impl UnitOfWorkCapable<MemoryUnitOfWork> for MemoryUserRepository {
    fn for_unit_of_work(&self, unit_of_work: &MemoryUnitOfWork) -> Self {
        Self {
            store: self.store.clone(),
            scope: Some(Arc::clone(&unit_of_work.handle)),
        }
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    fn next_identity(&self) -> UserId {
        Uuid::now_v7()
    }

    async fn add_user(&self, user: User) -> Result<(), CoreError> {
        self.store
            .write(self.scope.as_deref(), WriteOp::InsertUser(user))?;
        Ok(())
    }

    async fn exists_by_id(&self, id: UserId) -> Result<bool, CoreError> {
        self.store
            .read(self.scope.as_deref(), |t| t.users.contains_key(&id))
    }

    async fn exists_by_username(&self, username: &str) -> Result<bool, CoreError> {
        self.store.read(self.scope.as_deref(), |t| {
            t.users.values().any(|u| u.username == username)
        })
    }

    async fn exists_by_email(&self, email: &str) -> Result<bool, CoreError> {
        let email = email.to_lowercase();
        self.store.read(self.scope.as_deref(), |t| {
            t.users.values().any(|u| u.email.to_lowercase() == email)
        })
    }

    async fn find_user_by_id(&self, id: UserId) -> Result<User, CoreError> {
        self.store
            .read(self.scope.as_deref(), |t| t.users.get(&id).cloned())?
            .ok_or_else(|| DomainError::not_found("Users").into())
    }

    async fn remove_user_by_id(&self, id: UserId) -> Result<(), CoreError> {
        self.store
            .write(self.scope.as_deref(), WriteOp::RemoveUser(id))?;
        Ok(())
    }
}

// -- Tasks --------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MemoryTaskRepository {
    store: MemoryStore,
    scope: Option<Arc<ScopeHandle>>,
}

impl UnitOfWorkCapable<MemoryUnitOfWork> for MemoryTaskRepository {
    fn for_unit_of_work(&self, unit_of_work: &MemoryUnitOfWork) -> Self {
        Self {
            store: self.store.clone(),
            scope: Some(Arc::clone(&unit_of_work.handle)),
        }
    }
}

#[async_trait]
impl TaskRepository for MemoryTaskRepository {
    fn next_identity(&self) -> TaskId {
        Uuid::now_v7()
    }

    async fn add_task(&self, task: Task) -> Result<(), CoreError> {
        self.store
            .write(self.scope.as_deref(), WriteOp::InsertTask(task))?;
        Ok(())
    }

    async fn exists_by_id(&self, id: TaskId) -> Result<bool, CoreError> {
        self.store
            .read(self.scope.as_deref(), |t| t.tasks.contains_key(&id))
    }

    async fn find_task_by_id(&self, id: TaskId) -> Result<Task, CoreError> {
        self.store
            .read(self.scope.as_deref(), |t| t.tasks.get(&id).cloned())?
            .ok_or_else(|| DomainError::not_found("Tasks").into())
    }

    async fn remove_task_by_id(&self, id: TaskId) -> Result<(), CoreError> {
        self.store
            .write(self.scope.as_deref(), WriteOp::RemoveTask(id))?;
        Ok(())
    }

    async fn remove_tasks_by_owner_id(&self, owner_id: UserId) -> Result<u64, CoreError> {
        self.store
            .write(self.scope.as_deref(), WriteOp::RemoveTasksByOwner(owner_id))
    }
}
