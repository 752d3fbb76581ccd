//! Test utilities
//!
//! An application wired to an in-memory store with fast password hashing.
//! Compiled for unit tests and for integration tests via the `test-utils`
//! feature.

use crate::auth::{Argon2Hasher, PasswordConfig, PasswordHasher};
use crate::routes::create_router;
use crate::state::AppState;
use crate::store::MemoryStore;
use axum::Router;
use mitho_core::{AppConfig, Identity, StoreBackend, UserStatus};
use std::sync::Arc;

pub const TEST_JWT_SECRET: &str = "test-secret-key-for-integration-tests";

/// Configuration for tests: memory backend, fixed secret, no sweep and no
/// rate limit
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.database.backend = StoreBackend::Memory;
    config.jwt.secret = TEST_JWT_SECRET.to_string();
    config.server.rate_limit_enabled = false;
    config.maintenance.token_sweep_interval_secs = 0;
    config
}

/// A router plus handles to its state and store
pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
    pub store: MemoryStore,
    hasher: Arc<dyn PasswordHasher>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: AppConfig) -> Self {
        let store = MemoryStore::new();
        let hasher: Arc<dyn PasswordHasher> =
            Arc::new(Argon2Hasher::new(PasswordConfig::insecure_fast()));
        let state = Arc::new(
            AppState::in_memory(config, store.clone(), hasher.clone())
                .expect("test configuration is valid"),
        );

        Self {
            router: create_router(state.clone()),
            state,
            store,
            hasher,
        }
    }

    /// Insert a user with the given status and password
    pub async fn seed_user(&self, email: &str, password: &str, status: UserStatus) -> Identity {
        let hash = self
            .hasher
            .hash(password)
            .await
            .expect("hashing a test password");
        let mut identity = Identity::new("Test", "User", email, hash);
        identity.status = status;
        self.store.put_user(identity.clone()).await;
        identity
    }

    pub async fn seed_active_user(&self, email: &str, password: &str) -> Identity {
        self.seed_user(email, password, UserStatus::Active).await
    }
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}

/// Router over a fresh in-memory application
pub fn create_router_for_testing() -> Router {
    TestApp::new().router
}
