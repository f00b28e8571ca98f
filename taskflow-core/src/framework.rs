use sqlx::pool::PoolConnection;
use sqlx::{PgConnection, PgPool, Postgres};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard};

pub type PgTransaction = sqlx::Transaction<'static, Postgres>;

/// Shared slot holding the transaction of one unit of work.
///
/// `None` once the transaction has been committed or rolled back.
pub type TransactionSlot = Arc<Mutex<Option<PgTransaction>>>;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("unit of work scope has already been terminated")]
    ScopeTerminated,
}

/// Runs query objects either directly on the pool or inside a bound
/// transaction.
#[derive(Clone)]
pub struct DatabaseProcessor {
    pub pool: PgPool,
    scope: Option<TransactionSlot>,
}

impl DatabaseProcessor {
    pub fn new(pool: PgPool) -> Self {
        Self { pool, scope: None }
    }

    /// Same pool, every query routed through `slot`.
    pub fn bound_to(&self, slot: TransactionSlot) -> Self {
        Self {
            pool: self.pool.clone(),
            scope: Some(slot),
        }
    }

    pub fn is_scoped(&self) -> bool {
        self.scope.is_some()
    }

    pub async fn acquire(&self) -> Result<DatabaseConnection<'_>, DatabaseError> {
        match &self.scope {
            Some(slot) => Ok(DatabaseConnection::Scoped(slot.lock().await)),
            None => Ok(DatabaseConnection::Pooled(self.pool.acquire().await?)),
        }
    }
}

pub enum DatabaseConnection<'a> {
    Pooled(PoolConnection<Postgres>),
    Scoped(MutexGuard<'a, Option<PgTransaction>>),
}

impl DatabaseConnection<'_> {
    pub fn executor(&mut self) -> Result<&mut PgConnection, DatabaseError> {
        match self {
            DatabaseConnection::Pooled(conn) => Ok(&mut **conn),
            DatabaseConnection::Scoped(slot) => {
                let slot: &mut Option<PgTransaction> = slot;
                match slot.as_mut() {
                    Some(tx) => Ok(&mut **tx),
                    None => Err(DatabaseError::ScopeTerminated),
                }
            }
        }
    }
}
