//! Argon2id password hashing
//!
//! Hashes are PHC strings (`$argon2id$v=19$...`) with a fresh 16-byte salt,
//! so the parameters travel with each hash and can be raised later without
//! breaking verification of older ones. Hashing is CPU-bound; the async
//! [`PasswordHasher`] runs it on the blocking pool.

use argon2::{
    password_hash::{
        rand_core::OsRng, PasswordHash, PasswordHasher as _, PasswordVerifier as _, SaltString,
    },
    Argon2, Params,
};
use async_trait::async_trait;
use rand::Rng;
use thiserror::Error;

/// Alphabet for generated placeholder passwords
const GENERATED_CHARSET: &[u8] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789!@#$%^&*";

/// Length of generated placeholder passwords
pub const GENERATED_LENGTH: usize = 10;

/// Password hashing and verification errors
#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("Failed to hash password: {0}")]
    HashingFailed(String),

    #[error("Failed to verify password: {0}")]
    VerificationFailed(String),

    #[error("Invalid password hash format")]
    InvalidHashFormat,

    #[error("Hashing task failed: {0}")]
    TaskFailed(String),
}

/// Argon2id cost parameters
#[derive(Debug, Clone)]
pub struct PasswordConfig {
    /// KiB of memory per hash
    pub memory_cost: u32,
    /// Passes over memory
    pub time_cost: u32,
    /// Lanes
    pub parallelism: u32,
    /// Digest length in bytes
    pub output_len: Option<usize>,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            memory_cost: 64 * 1024,
            time_cost: 3,
            parallelism: 4,
            output_len: Some(32),
        }
    }
}

impl PasswordConfig {
    /// Cheap parameters for tests. Never use in production.
    pub fn insecure_fast() -> Self {
        Self {
            memory_cost: 8,
            time_cost: 1,
            parallelism: 1,
            output_len: Some(32),
        }
    }

    fn to_params(&self) -> Result<Params, PasswordError> {
        Params::new(
            self.memory_cost,
            self.time_cost,
            self.parallelism,
            self.output_len,
        )
        .map_err(|e| PasswordError::HashingFailed(e.to_string()))
    }
}

/// One-way password hashing used by the auth service
#[async_trait]
pub trait PasswordHasher: Send + Sync {
    /// Hash a plaintext password into a PHC string
    async fn hash(&self, password: &str) -> Result<String, PasswordError>;

    /// Check a plaintext password against a stored PHC string
    async fn verify(&self, password: &str, hash: &str) -> Result<bool, PasswordError>;
}

/// Argon2id hasher running on the blocking pool
#[derive(Debug, Clone, Default)]
pub struct Argon2Hasher {
    config: PasswordConfig,
}

impl Argon2Hasher {
    pub fn new(config: PasswordConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl PasswordHasher for Argon2Hasher {
    async fn hash(&self, password: &str) -> Result<String, PasswordError> {
        let password = password.to_string();
        let config = self.config.clone();
        tokio::task::spawn_blocking(move || hash_password_with_config(&password, &config))
            .await
            .map_err(|e| PasswordError::TaskFailed(e.to_string()))?
    }

    async fn verify(&self, password: &str, hash: &str) -> Result<bool, PasswordError> {
        let password = password.to_string();
        let hash = hash.to_string();
        tokio::task::spawn_blocking(move || verify_password(&password, &hash))
            .await
            .map_err(|e| PasswordError::TaskFailed(e.to_string()))?
    }
}

/// Hash a password with custom configuration
///
/// Returns the PHC string (algorithm, parameters, salt and hash), which is
/// safe to store as is.
pub fn hash_password_with_config(
    password: &str,
    config: &PasswordConfig,
) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);

    let params = config.to_params()?;
    let argon2 = Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);

    let password_hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| PasswordError::HashingFailed(e.to_string()))?;

    Ok(password_hash.to_string())
}

/// Verify a plaintext password against a stored hash
///
/// Parameters are read from the PHC string, so hashes produced with any
/// [`PasswordConfig`] verify here.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, PasswordError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| PasswordError::InvalidHashFormat)?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(PasswordError::VerificationFailed(e.to_string())),
    }
}

/// Random password for accounts created before the owner sets one
///
/// The value is hashed and discarded; nobody ever learns it.
pub fn generate_password() -> String {
    let mut rng = rand::thread_rng();
    (0..GENERATED_LENGTH)
        .map(|_| GENERATED_CHARSET[rng.gen_range(0..GENERATED_CHARSET.len())] as char)
        .collect()
}
