//! In-memory store
//!
//! Backs tests and `STORE_BACKEND=memory`. A unit of work takes the store
//! lock for its whole lifetime and edits a private copy, which replaces the
//! shared state on commit. Units of work are therefore serialized, and a
//! caller holding one must route every call of that request through it.

use super::{
    RefreshTokenStore, StoreError, TransactionManager, TxState, UnitOfWork, UserDirectory,
};
use crate::auth::models::{token_fingerprint, RefreshTokenRecord};
use async_trait::async_trait;
use chrono::Utc;
use mitho_core::Identity;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
pub(crate) struct MemoryState {
    users: HashMap<Uuid, Identity>,
    /// Keyed by token digest
    tokens: HashMap<String, RefreshTokenRecord>,
}

/// Open in-memory transaction
pub(crate) struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

impl MemoryTx {
    pub(crate) fn commit(mut self) {
        *self.guard = self.working;
    }
}

/// Thread-safe in-memory implementation of every store trait
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` against the shared state, or the unit of work's private copy
    async fn with_state<T: Send>(
        &self,
        tx: Option<&UnitOfWork>,
        f: impl FnOnce(&mut MemoryState) -> Result<T, StoreError> + Send,
    ) -> Result<T, StoreError> {
        match tx {
            None => {
                let mut state = self.state.lock().await;
                f(&mut state)
            }
            Some(uow) => {
                let mut guard = uow.lock().await;
                match guard.as_mut() {
                    Some(TxState::Memory(mtx))
                        if Arc::ptr_eq(OwnedMutexGuard::mutex(&mtx.guard), &self.state) =>
                    {
                        f(&mut mtx.working)
                    }
                    Some(_) => Err(StoreError::BackendMismatch),
                    None => Err(StoreError::TransactionClosed),
                }
            }
        }
    }

    /// Number of stored identities
    pub async fn user_count(&self) -> usize {
        self.state.lock().await.users.len()
    }

    /// Number of stored refresh token records
    pub async fn token_count(&self) -> usize {
        self.state.lock().await.tokens.len()
    }

    /// Overwrite an identity in place, creating it if missing
    pub async fn put_user(&self, identity: Identity) {
        self.state
            .lock()
            .await
            .users
            .insert(identity.id, identity);
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn find_by_email(
        &self,
        tx: Option<&UnitOfWork>,
        email: &str,
    ) -> Result<Option<Identity>, StoreError> {
        let email = mitho_core::normalize_email(email);
        self.with_state(tx, |state| {
            Ok(state.users.values().find(|u| u.email == email).cloned())
        })
        .await
    }

    async fn find_by_id(
        &self,
        tx: Option<&UnitOfWork>,
        id: Uuid,
    ) -> Result<Option<Identity>, StoreError> {
        self.with_state(tx, |state| Ok(state.users.get(&id).cloned()))
            .await
    }

    async fn create(
        &self,
        tx: Option<&UnitOfWork>,
        identity: Identity,
    ) -> Result<Identity, StoreError> {
        self.with_state(tx, move |state| {
            if state.users.values().any(|u| u.email == identity.email) {
                return Err(StoreError::Conflict(format!(
                    "email {} already exists",
                    identity.email
                )));
            }
            if state.users.contains_key(&identity.id) {
                return Err(StoreError::Conflict(format!("user {} already exists", identity.id)));
            }
            state.users.insert(identity.id, identity.clone());
            Ok(identity)
        })
        .await
    }

    async fn record_sign_in(&self, tx: Option<&UnitOfWork>, id: Uuid) -> Result<(), StoreError> {
        self.with_state(tx, |state| {
            if let Some(user) = state.users.get_mut(&id) {
                let now = Utc::now();
                user.last_sign_in_at = Some(now);
                user.updated_at = now;
            }
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl RefreshTokenStore for MemoryStore {
    async fn create(
        &self,
        tx: Option<&UnitOfWork>,
        record: RefreshTokenRecord,
    ) -> Result<RefreshTokenRecord, StoreError> {
        self.with_state(tx, move |state| {
            if state.tokens.contains_key(&record.token_hash) {
                return Err(StoreError::Conflict("refresh token already exists".to_string()));
            }
            state
                .tokens
                .insert(record.token_hash.clone(), record.clone());
            Ok(record)
        })
        .await
    }

    async fn find_by_token(
        &self,
        tx: Option<&UnitOfWork>,
        raw_token: &str,
    ) -> Result<Option<RefreshTokenRecord>, StoreError> {
        let hash = token_fingerprint(raw_token);
        self.with_state(tx, move |state| Ok(state.tokens.get(&hash).cloned()))
            .await
    }

    async fn revoke_if_active(
        &self,
        tx: Option<&UnitOfWork>,
        raw_token: &str,
    ) -> Result<bool, StoreError> {
        let hash = token_fingerprint(raw_token);
        self.with_state(tx, move |state| {
            Ok(state
                .tokens
                .get_mut(&hash)
                .map(|record| record.revoke(Utc::now()))
                .unwrap_or(false))
        })
        .await
    }

    async fn revoke(&self, tx: Option<&UnitOfWork>, id: Uuid) -> Result<(), StoreError> {
        self.with_state(tx, |state| {
            if let Some(record) = state.tokens.values_mut().find(|r| r.id == id) {
                record.revoke(Utc::now());
            }
            Ok(())
        })
        .await
    }

    async fn revoke_all(&self, tx: Option<&UnitOfWork>, user_id: Uuid) -> Result<u64, StoreError> {
        self.with_state(tx, |state| {
            let now = Utc::now();
            let revoked = state
                .tokens
                .values_mut()
                .filter(|r| r.user_id == user_id)
                .map(|r| r.revoke(now))
                .filter(|changed| *changed)
                .count();
            Ok(revoked as u64)
        })
        .await
    }

    async fn delete_expired(&self, tx: Option<&UnitOfWork>) -> Result<u64, StoreError> {
        self.with_state(tx, |state| {
            let now = Utc::now();
            let before = state.tokens.len();
            state.tokens.retain(|_, r| !r.is_expired_at(now));
            Ok((before - state.tokens.len()) as u64)
        })
        .await
    }

    async fn find_by_user(
        &self,
        tx: Option<&UnitOfWork>,
        user_id: Uuid,
    ) -> Result<Vec<RefreshTokenRecord>, StoreError> {
        self.with_state(tx, |state| {
            let mut records: Vec<_> = state
                .tokens
                .values()
                .filter(|r| r.user_id == user_id)
                .cloned()
                .collect();
            records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(records)
        })
        .await
    }
}

#[async_trait]
impl TransactionManager for MemoryStore {
    async fn begin(&self) -> Result<UnitOfWork, StoreError> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(UnitOfWork::new(TxState::Memory(MemoryTx { guard, working })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(user_id: Uuid, raw: &str, ttl: Duration) -> RefreshTokenRecord {
        RefreshTokenRecord::new(user_id, raw, Utc::now() + ttl)
    }

    #[tokio::test]
    async fn test_find_by_token_after_revoke() {
        let store = MemoryStore::new();
        let user_id = Uuid::new_v4();
        RefreshTokenStore::create(&store, None, record(user_id, "t1", Duration::days(1)))
            .await
            .unwrap();

        assert!(store.revoke_if_active(None, "t1").await.unwrap());
        assert!(!store.revoke_if_active(None, "t1").await.unwrap());

        let found = store.find_by_token(None, "t1").await.unwrap().unwrap();
        assert!(found.revoked);
        assert!(found.revoked_at.is_some());
    }

    #[tokio::test]
    async fn test_unknown_token_is_absent() {
        let store = MemoryStore::new();
        assert!(store.find_by_token(None, "nope").await.unwrap().is_none());
        assert!(!store.revoke_if_active(None, "nope").await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_token_conflicts() {
        let store = MemoryStore::new();
        let user_id = Uuid::new_v4();
        RefreshTokenStore::create(&store, None, record(user_id, "dup", Duration::days(1)))
            .await
            .unwrap();
        let second =
            RefreshTokenStore::create(&store, None, record(user_id, "dup", Duration::days(1)))
                .await;
        assert!(matches!(second, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_revoke_all_only_counts_active() {
        let store = MemoryStore::new();
        let user_id = Uuid::new_v4();
        let other = Uuid::new_v4();
        for raw in ["a", "b", "c"] {
            RefreshTokenStore::create(&store, None, record(user_id, raw, Duration::days(1)))
                .await
                .unwrap();
        }
        RefreshTokenStore::create(&store, None, record(other, "d", Duration::days(1)))
            .await
            .unwrap();
        store.revoke_if_active(None, "a").await.unwrap();

        assert_eq!(store.revoke_all(None, user_id).await.unwrap(), 2);
        assert_eq!(store.revoke_all(None, user_id).await.unwrap(), 0);
        assert!(store
            .find_by_token(None, "d")
            .await
            .unwrap()
            .unwrap()
            .is_valid());
    }

    #[tokio::test]
    async fn test_delete_expired() {
        let store = MemoryStore::new();
        let user_id = Uuid::new_v4();
        RefreshTokenStore::create(&store, None, record(user_id, "old", -Duration::hours(1)))
            .await
            .unwrap();
        RefreshTokenStore::create(&store, None, record(user_id, "new", Duration::hours(1)))
            .await
            .unwrap();

        assert_eq!(store.delete_expired(None).await.unwrap(), 1);
        assert_eq!(store.token_count().await, 1);
    }

    #[tokio::test]
    async fn test_rollback_discards_work() {
        let store = MemoryStore::new();
        let uow = store.begin().await.unwrap();
        UserDirectory::create(&store, Some(&uow), Identity::new("A", "B", "a@b.com", "h"))
            .await
            .unwrap();
        assert!(store
            .find_by_email(Some(&uow), "a@b.com")
            .await
            .unwrap()
            .is_some());

        uow.rollback().await.unwrap();
        assert!(!uow.is_open().await);
        assert_eq!(store.user_count().await, 0);
    }

    #[tokio::test]
    async fn test_commit_publishes_work() {
        let store = MemoryStore::new();
        let uow = store.begin().await.unwrap();
        UserDirectory::create(&store, Some(&uow), Identity::new("A", "B", "a@b.com", "h"))
            .await
            .unwrap();
        uow.commit().await.unwrap();

        assert_eq!(store.user_count().await, 1);
        assert!(matches!(uow.commit().await, Err(StoreError::TransactionClosed)));
    }

    #[tokio::test]
    async fn test_foreign_unit_of_work_is_rejected() {
        let store = MemoryStore::new();
        let other = MemoryStore::new();
        let uow = other.begin().await.unwrap();

        let result = store.find_by_email(Some(&uow), "a@b.com").await;
        assert!(matches!(result, Err(StoreError::BackendMismatch)));
    }
}
