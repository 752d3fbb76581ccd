//! PostgreSQL store
//!
//! Implements every store trait over a SQLx pool. Calls made with a unit of
//! work run on its transaction; calls without one check out a pooled
//! connection for the duration of the statement.

use super::{
    RefreshTokenStore, StoreError, TransactionManager, TxState, UnitOfWork, UserDirectory,
};
use crate::auth::models::{token_fingerprint, RefreshTokenRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mitho_core::Identity;
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions};
use sqlx::{FromRow, Postgres};
use tokio::sync::MutexGuard;
use uuid::Uuid;

const SCHEMA: &str = include_str!("../../migrations/0001_auth.sql");

const USER_COLUMNS: &str = "id, first_name, last_name, email, password_hash, account_type, \
                            status, last_sign_in_at, created_at, updated_at";

const TOKEN_COLUMNS: &str =
    "id, user_id, token_hash, expires_at, revoked, revoked_at, created_at, updated_at";

/// PostgreSQL-backed user directory, token store and transaction manager
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect with a bounded pool
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Database(format!("PostgreSQL connection failed: {e}")))?;

        Ok(Self { pool })
    }

    /// Create from an existing pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create tables and indexes if they do not exist yet
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    async fn conn<'a>(&self, tx: Option<&'a UnitOfWork>) -> Result<Conn<'a>, StoreError> {
        match tx {
            Some(uow) => Ok(Conn::Scoped(uow.lock().await)),
            None => Ok(Conn::Pooled(self.pool.acquire().await?)),
        }
    }
}

/// Where a statement runs
enum Conn<'a> {
    Pooled(PoolConnection<Postgres>),
    Scoped(MutexGuard<'a, Option<TxState>>),
}

impl Conn<'_> {
    fn get(&mut self) -> Result<&mut PgConnection, StoreError> {
        match self {
            Conn::Pooled(conn) => Ok(&mut **conn),
            Conn::Scoped(guard) => match guard.as_mut() {
                Some(TxState::Postgres(tx)) => Ok(&mut **tx),
                Some(_) => Err(StoreError::BackendMismatch),
                None => Err(StoreError::TransactionClosed),
            },
        }
    }
}

/// User row from database
#[derive(Debug, FromRow)]
struct UserRow {
    id: Uuid,
    first_name: String,
    last_name: String,
    email: String,
    password_hash: String,
    account_type: String,
    status: String,
    last_sign_in_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for Identity {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(Identity {
            id: row.id,
            first_name: row.first_name,
            last_name: row.last_name,
            email: row.email,
            password_hash: row.password_hash,
            account_type: row
                .account_type
                .parse()
                .map_err(|e| StoreError::Corrupt(format!("{e}")))?,
            status: row
                .status
                .parse()
                .map_err(|e| StoreError::Corrupt(format!("{e}")))?,
            last_sign_in_at: row.last_sign_in_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
impl UserDirectory for PgStore {
    async fn find_by_email(
        &self,
        tx: Option<&UnitOfWork>,
        email: &str,
    ) -> Result<Option<Identity>, StoreError> {
        let mut conn = self.conn(tx).await?;
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(mitho_core::normalize_email(email))
        .fetch_optional(conn.get()?)
        .await?;

        row.map(Identity::try_from).transpose()
    }

    async fn find_by_id(
        &self,
        tx: Option<&UnitOfWork>,
        id: Uuid,
    ) -> Result<Option<Identity>, StoreError> {
        let mut conn = self.conn(tx).await?;
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(conn.get()?)
        .await?;

        row.map(Identity::try_from).transpose()
    }

    async fn create(
        &self,
        tx: Option<&UnitOfWork>,
        identity: Identity,
    ) -> Result<Identity, StoreError> {
        let mut conn = self.conn(tx).await?;
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            INSERT INTO users ({USER_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(identity.id)
        .bind(&identity.first_name)
        .bind(&identity.last_name)
        .bind(&identity.email)
        .bind(&identity.password_hash)
        .bind(identity.account_type.as_str())
        .bind(identity.status.as_str())
        .bind(identity.last_sign_in_at)
        .bind(identity.created_at)
        .bind(identity.updated_at)
        .fetch_one(conn.get()?)
        .await?;

        Identity::try_from(row)
    }

    async fn record_sign_in(&self, tx: Option<&UnitOfWork>, id: Uuid) -> Result<(), StoreError> {
        let mut conn = self.conn(tx).await?;
        sqlx::query("UPDATE users SET last_sign_in_at = NOW(), updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(conn.get()?)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl RefreshTokenStore for PgStore {
    async fn create(
        &self,
        tx: Option<&UnitOfWork>,
        record: RefreshTokenRecord,
    ) -> Result<RefreshTokenRecord, StoreError> {
        let mut conn = self.conn(tx).await?;
        let created = sqlx::query_as::<_, RefreshTokenRecord>(&format!(
            r#"
            INSERT INTO refresh_tokens ({TOKEN_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {TOKEN_COLUMNS}
            "#
        ))
        .bind(record.id)
        .bind(record.user_id)
        .bind(&record.token_hash)
        .bind(record.expires_at)
        .bind(record.revoked)
        .bind(record.revoked_at)
        .bind(record.created_at)
        .bind(record.updated_at)
        .fetch_one(conn.get()?)
        .await?;

        Ok(created)
    }

    async fn find_by_token(
        &self,
        tx: Option<&UnitOfWork>,
        raw_token: &str,
    ) -> Result<Option<RefreshTokenRecord>, StoreError> {
        let mut conn = self.conn(tx).await?;
        let record = sqlx::query_as::<_, RefreshTokenRecord>(&format!(
            "SELECT {TOKEN_COLUMNS} FROM refresh_tokens WHERE token_hash = $1"
        ))
        .bind(token_fingerprint(raw_token))
        .fetch_optional(conn.get()?)
        .await?;

        Ok(record)
    }

    async fn revoke_if_active(
        &self,
        tx: Option<&UnitOfWork>,
        raw_token: &str,
    ) -> Result<bool, StoreError> {
        let mut conn = self.conn(tx).await?;
        // The revoked = FALSE guard makes this a compare-and-set
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked = TRUE, revoked_at = NOW(), updated_at = NOW()
            WHERE token_hash = $1 AND revoked = FALSE
            "#,
        )
        .bind(token_fingerprint(raw_token))
        .execute(conn.get()?)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn revoke(&self, tx: Option<&UnitOfWork>, id: Uuid) -> Result<(), StoreError> {
        let mut conn = self.conn(tx).await?;
        sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked = TRUE, revoked_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND revoked = FALSE
            "#,
        )
        .bind(id)
        .execute(conn.get()?)
        .await?;
        Ok(())
    }

    async fn revoke_all(&self, tx: Option<&UnitOfWork>, user_id: Uuid) -> Result<u64, StoreError> {
        let mut conn = self.conn(tx).await?;
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked = TRUE, revoked_at = NOW(), updated_at = NOW()
            WHERE user_id = $1 AND revoked = FALSE
            "#,
        )
        .bind(user_id)
        .execute(conn.get()?)
        .await?;

        Ok(result.rows_affected())
    }

    async fn delete_expired(&self, tx: Option<&UnitOfWork>) -> Result<u64, StoreError> {
        let mut conn = self.conn(tx).await?;
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at <= NOW()")
            .execute(conn.get()?)
            .await?;

        Ok(result.rows_affected())
    }

    async fn find_by_user(
        &self,
        tx: Option<&UnitOfWork>,
        user_id: Uuid,
    ) -> Result<Vec<RefreshTokenRecord>, StoreError> {
        let mut conn = self.conn(tx).await?;
        let records = sqlx::query_as::<_, RefreshTokenRecord>(&format!(
            "SELECT {TOKEN_COLUMNS} FROM refresh_tokens WHERE user_id = $1 ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(conn.get()?)
        .await?;

        Ok(records)
    }
}

#[async_trait]
impl TransactionManager for PgStore {
    async fn begin(&self) -> Result<UnitOfWork, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(UnitOfWork::new(TxState::Postgres(tx)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_defines_both_tables() {
        assert!(SCHEMA.contains("CREATE TABLE IF NOT EXISTS users"));
        assert!(SCHEMA.contains("CREATE TABLE IF NOT EXISTS refresh_tokens"));
        assert!(SCHEMA.contains("token_hash  TEXT NOT NULL UNIQUE"));
    }

    #[test]
    fn test_corrupt_status_is_reported() {
        let now = Utc::now();
        let row = UserRow {
            id: Uuid::new_v4(),
            first_name: "A".to_string(),
            last_name: "B".to_string(),
            email: "a@b.com".to_string(),
            password_hash: "h".to_string(),
            account_type: "customer".to_string(),
            status: "archived".to_string(),
            last_sign_in_at: None,
            created_at: now,
            updated_at: now,
        };
        assert!(matches!(Identity::try_from(row), Err(StoreError::Corrupt(_))));
    }
}
