//! Application state management
//!
//! Everything the handlers and pipeline stages need is built once at startup
//! and shared through [`AppState`]; there are no process-wide singletons.
//!
//! Author: hephaex@gmail.com

use crate::auth::{Argon2Hasher, AuthService, PasswordConfig, PasswordHasher, TokenCodec};
use crate::pipeline::KeyCache;
use crate::store::{MemoryStore, PgStore, RefreshTokenStore, TransactionManager, UserDirectory};
use anyhow::Context;
use mitho_core::{AppConfig, StoreBackend};
use std::sync::Arc;
use std::time::Instant;

/// Application state shared across handlers
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,
    /// Server start time
    pub start_time: Instant,
    /// Signup, login, rotation and logout
    pub auth: AuthService,
    /// Token codec, shared with the auth guard
    pub codec: Arc<TokenCodec>,
    /// Begins request-scoped units of work
    pub transactions: Arc<dyn TransactionManager>,
    /// Memoized JSON key conversions
    pub key_cache: Arc<KeyCache>,
}

impl AppState {
    /// Assemble state from explicit collaborators
    pub fn new(
        config: AppConfig,
        users: Arc<dyn UserDirectory>,
        tokens: Arc<dyn RefreshTokenStore>,
        transactions: Arc<dyn TransactionManager>,
        hasher: Arc<dyn PasswordHasher>,
    ) -> anyhow::Result<Self> {
        let codec = Arc::new(TokenCodec::new(&config.jwt).context("Invalid JWT configuration")?);
        let auth = AuthService::new(users, tokens, hasher, codec.clone());

        Ok(Self {
            config,
            start_time: Instant::now(),
            auth,
            codec,
            transactions,
            key_cache: Arc::new(KeyCache::default()),
        })
    }

    /// State backed by an in-memory store
    pub fn in_memory(
        config: AppConfig,
        store: MemoryStore,
        hasher: Arc<dyn PasswordHasher>,
    ) -> anyhow::Result<Self> {
        let store = Arc::new(store);
        Self::new(config, store.clone(), store.clone(), store, hasher)
    }

    /// State backed by PostgreSQL
    pub fn postgres(
        config: AppConfig,
        store: PgStore,
        hasher: Arc<dyn PasswordHasher>,
    ) -> anyhow::Result<Self> {
        let store = Arc::new(store);
        Self::new(config, store.clone(), store.clone(), store, hasher)
    }

    /// Build state for the configured backend
    pub async fn from_config(config: AppConfig) -> anyhow::Result<Self> {
        let hasher: Arc<dyn PasswordHasher> =
            Arc::new(Argon2Hasher::new(PasswordConfig::default()));

        match config.database.backend {
            StoreBackend::Memory => {
                tracing::warn!("Using in-memory store; data is lost on restart");
                Self::in_memory(config, MemoryStore::new(), hasher)
            }
            StoreBackend::Postgres => {
                let store = PgStore::connect(
                    &config.database.postgres_url,
                    config.database.postgres_pool_size,
                )
                .await
                .context("Failed to connect to PostgreSQL")?;
                store.migrate().await.context("Failed to apply schema")?;
                tracing::info!("PostgreSQL store ready");
                Self::postgres(config, store, hasher)
            }
        }
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
