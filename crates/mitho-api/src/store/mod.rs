//! Persistence layer
//!
//! The auth service talks to three collaborators through traits:
//! - [`UserDirectory`]: identity lookup and creation
//! - [`RefreshTokenStore`]: refresh token records addressed by raw token
//! - [`TransactionManager`]: begins a [`UnitOfWork`]
//!
//! Every operation takes an optional unit of work. With `Some`, the call joins
//! that unit and becomes visible only when it commits; with `None` the call
//! runs on its own.
//!
//! Two implementations exist: [`memory::MemoryStore`] and
//! [`postgres::PgStore`].

pub mod memory;
pub mod postgres;

use crate::auth::models::RefreshTokenRecord;
use async_trait::async_trait;
use mitho_core::Identity;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard};
use uuid::Uuid;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Unique constraint violated: {0}")]
    Conflict(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Unit of work is already closed")]
    TransactionClosed,

    #[error("Unit of work belongs to a different store")]
    BackendMismatch,
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::Conflict(db.message().to_string())
            }
            _ => StoreError::Database(err.to_string()),
        }
    }
}

/// Identity lookup and persistence
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Look up by normalized email. Absence is not an error.
    async fn find_by_email(
        &self,
        tx: Option<&UnitOfWork>,
        email: &str,
    ) -> Result<Option<Identity>, StoreError>;

    async fn find_by_id(
        &self,
        tx: Option<&UnitOfWork>,
        id: Uuid,
    ) -> Result<Option<Identity>, StoreError>;

    /// Insert a new identity. A taken email yields [`StoreError::Conflict`].
    async fn create(
        &self,
        tx: Option<&UnitOfWork>,
        identity: Identity,
    ) -> Result<Identity, StoreError>;

    /// Stamp the last successful sign-in
    async fn record_sign_in(&self, tx: Option<&UnitOfWork>, id: Uuid) -> Result<(), StoreError>;
}

/// Record-keeper for issued refresh tokens
#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    /// Persist a new record. A duplicate token yields [`StoreError::Conflict`].
    async fn create(
        &self,
        tx: Option<&UnitOfWork>,
        record: RefreshTokenRecord,
    ) -> Result<RefreshTokenRecord, StoreError>;

    /// Look up by raw token. Revoked and expired records are still returned.
    async fn find_by_token(
        &self,
        tx: Option<&UnitOfWork>,
        raw_token: &str,
    ) -> Result<Option<RefreshTokenRecord>, StoreError>;

    /// Atomically revoke the record for `raw_token` if it is not revoked yet.
    ///
    /// Returns true only for the caller that performed the transition.
    async fn revoke_if_active(
        &self,
        tx: Option<&UnitOfWork>,
        raw_token: &str,
    ) -> Result<bool, StoreError>;

    /// Revoke one record by id. Idempotent.
    async fn revoke(&self, tx: Option<&UnitOfWork>, id: Uuid) -> Result<(), StoreError>;

    /// Revoke every unrevoked record of a user, returning how many changed
    async fn revoke_all(&self, tx: Option<&UnitOfWork>, user_id: Uuid) -> Result<u64, StoreError>;

    /// Remove expired records, returning how many were deleted
    async fn delete_expired(&self, tx: Option<&UnitOfWork>) -> Result<u64, StoreError>;

    /// All records of a user, newest first
    async fn find_by_user(
        &self,
        tx: Option<&UnitOfWork>,
        user_id: Uuid,
    ) -> Result<Vec<RefreshTokenRecord>, StoreError>;
}

/// Begins units of work
#[async_trait]
pub trait TransactionManager: Send + Sync {
    async fn begin(&self) -> Result<UnitOfWork, StoreError>;
}

/// Backend-specific transaction state
pub(crate) enum TxState {
    Postgres(sqlx::Transaction<'static, sqlx::Postgres>),
    Memory(memory::MemoryTx),
}

/// Handle to an open all-or-nothing unit of work
///
/// Cloning shares the same underlying transaction. After `commit` or
/// `rollback` every clone is closed and further use fails with
/// [`StoreError::TransactionClosed`].
#[derive(Clone)]
pub struct UnitOfWork {
    state: Arc<Mutex<Option<TxState>>>,
}

impl std::fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitOfWork").finish_non_exhaustive()
    }
}

impl UnitOfWork {
    pub(crate) fn new(state: TxState) -> Self {
        Self {
            state: Arc::new(Mutex::new(Some(state))),
        }
    }

    pub(crate) async fn lock(&self) -> MutexGuard<'_, Option<TxState>> {
        self.state.lock().await
    }

    /// Whether commit or rollback has not happened yet
    pub async fn is_open(&self) -> bool {
        self.state.lock().await.is_some()
    }

    /// Make all work visible
    pub async fn commit(&self) -> Result<(), StoreError> {
        let state = self
            .state
            .lock()
            .await
            .take()
            .ok_or(StoreError::TransactionClosed)?;

        match state {
            TxState::Postgres(tx) => tx.commit().await.map_err(StoreError::from),
            TxState::Memory(tx) => {
                tx.commit();
                Ok(())
            }
        }
    }

    /// Discard all work
    pub async fn rollback(&self) -> Result<(), StoreError> {
        let state = self
            .state
            .lock()
            .await
            .take()
            .ok_or(StoreError::TransactionClosed)?;

        match state {
            TxState::Postgres(tx) => tx.rollback().await.map_err(StoreError::from),
            TxState::Memory(tx) => {
                drop(tx);
                Ok(())
            }
        }
    }
}
