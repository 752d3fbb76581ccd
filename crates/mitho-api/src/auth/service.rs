//! Authentication service layer
//!
//! Drives the credential lifecycle: signup, login, refresh token rotation and
//! logout. Collaborators are injected as trait objects and every operation
//! takes the caller's unit of work, if any, so that writes join the request's
//! transaction.

use super::jwt::{JwtError, TokenCodec, TokenKind};
use super::models::{RefreshTokenRecord, SessionView, UserProfile};
use super::password::{generate_password, PasswordHasher};
use crate::audit::{audit_log, AuditEvent, ClientInfo};
use crate::error::AppError;
use crate::store::{RefreshTokenStore, StoreError, UnitOfWork, UserDirectory};
use chrono::{DateTime, Utc};
use mitho_core::{normalize_email, Identity};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

pub const NOT_FOUND_MESSAGE: &str = "User not found with given email";
pub const INACTIVE_MESSAGE: &str =
    "Your account is not active. Please verify your email and set your password";
pub const INVALID_CREDENTIALS_MESSAGE: &str = "Invalid credentials";
pub const DUPLICATE_EMAIL_MESSAGE: &str = "User already exists with this email";
pub const INVALID_REFRESH_MESSAGE: &str = "Invalid or revoked refresh token";
pub const UNVERIFIABLE_REFRESH_MESSAGE: &str = "Invalid refresh token";
pub const WRONG_KIND_MESSAGE: &str = "Invalid token type, refresh token required";

fn required(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("required"));
    }
    Ok(())
}

/// User signup request
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
#[serde(default)]
pub struct SignupRequest {
    #[validate(custom(function = "required", message = "The first_name field is required."))]
    pub first_name: String,

    #[validate(custom(function = "required", message = "The last_name field is required."))]
    pub last_name: String,

    #[validate(
        custom(function = "required", message = "The email field is required."),
        email(message = "The email must be a valid email address.")
    )]
    pub email: String,
}

/// User login request
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
#[serde(default)]
pub struct LoginRequest {
    #[validate(
        custom(function = "required", message = "The email field is required."),
        email(message = "The email must be a valid email address.")
    )]
    pub email: String,

    #[validate(
        custom(function = "required", message = "The password field is required."),
        length(min = 6, message = "The password must be at least 6 characters.")
    )]
    pub password: String,
}

/// Token refresh request
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
#[serde(default)]
pub struct RefreshRequest {
    #[validate(custom(function = "required", message = "The refresh_token field is required."))]
    pub refresh_token: String,
}

/// Fresh access/refresh pair
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Access token lifetime in seconds
    pub expires_in: u64,
}

/// Login response with tokens and the signed-in user
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: u64,
    pub user: UserProfile,
}

/// Authentication service
#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserDirectory>,
    tokens: Arc<dyn RefreshTokenStore>,
    hasher: Arc<dyn PasswordHasher>,
    codec: Arc<TokenCodec>,
}

impl AuthService {
    /// Create a new authentication service
    pub fn new(
        users: Arc<dyn UserDirectory>,
        tokens: Arc<dyn RefreshTokenStore>,
        hasher: Arc<dyn PasswordHasher>,
        codec: Arc<TokenCodec>,
    ) -> Self {
        Self {
            users,
            tokens,
            hasher,
            codec,
        }
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    /// Register a new, inactive user
    ///
    /// The account gets a random placeholder password that nobody knows, so it
    /// cannot log in until verification sets a real one. No tokens are issued.
    pub async fn signup(
        &self,
        tx: Option<&UnitOfWork>,
        mut request: SignupRequest,
        client: &ClientInfo,
    ) -> Result<Identity, AppError> {
        request.email = normalize_email(&request.email);
        request.validate()?;
        let email = request.email.clone();

        if self.users.find_by_email(tx, &email).await?.is_some() {
            audit_log(&AuditEvent::RegistrationFailure {
                email,
                reason: "duplicate email".to_string(),
                ip_address: client.ip_address.clone(),
            });
            return Err(AppError::validation(DUPLICATE_EMAIL_MESSAGE));
        }

        let placeholder = self.hasher.hash(&generate_password()).await?;
        let identity = Identity::new(
            request.first_name.trim(),
            request.last_name.trim(),
            &email,
            placeholder,
        );

        // A concurrent signup can still win the unique index
        let identity = match self.users.create(tx, identity).await {
            Ok(identity) => identity,
            Err(StoreError::Conflict(_)) => {
                return Err(AppError::validation(DUPLICATE_EMAIL_MESSAGE));
            }
            Err(e) => return Err(e.into()),
        };

        audit_log(&AuditEvent::RegistrationSuccess {
            user_id: identity.id,
            email: identity.email.clone(),
            ip_address: client.ip_address.clone(),
        });

        Ok(identity)
    }

    /// Login with email and password
    ///
    /// Checks run in a fixed order: unknown email, inactive account, wrong
    /// password. Only a fully successful login creates a refresh record.
    pub async fn login(
        &self,
        tx: Option<&UnitOfWork>,
        mut request: LoginRequest,
        client: &ClientInfo,
    ) -> Result<LoginResponse, AppError> {
        request.email = normalize_email(&request.email);
        request.validate()?;
        let email = request.email.clone();

        let Some(user) = self.users.find_by_email(tx, &email).await? else {
            self.login_failed(&email, "unknown email", client);
            return Err(AppError::not_found(NOT_FOUND_MESSAGE));
        };

        if !user.is_active() {
            self.login_failed(&email, &format!("status {}", user.status), client);
            return Err(AppError::unauthorized(INACTIVE_MESSAGE));
        }

        if !self
            .hasher
            .verify(&request.password, &user.password_hash)
            .await?
        {
            self.login_failed(&email, "invalid password", client);
            return Err(AppError::unauthorized(INVALID_CREDENTIALS_MESSAGE));
        }

        let pair = self.issue_pair(tx, user.id).await?;

        if let Err(e) = self.users.record_sign_in(tx, user.id).await {
            tracing::warn!(user_id = %user.id, error = %e, "Failed to record sign-in time");
        }

        audit_log(&AuditEvent::LoginSuccess {
            user_id: user.id,
            email: user.email.clone(),
            ip_address: client.ip_address.clone(),
            user_agent: client.user_agent.clone(),
        });

        Ok(LoginResponse {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            token_type: pair.token_type,
            expires_in: pair.expires_in,
            user: UserProfile::from(&user),
        })
    }

    /// Rotate a refresh token
    ///
    /// The old token is revoked before the new pair is issued. If persisting
    /// the new record fails the old token stays revoked and the caller has to
    /// log in again.
    pub async fn refresh(
        &self,
        tx: Option<&UnitOfWork>,
        request: RefreshRequest,
        client: &ClientInfo,
    ) -> Result<TokenPair, AppError> {
        request.validate()?;
        let raw = request.refresh_token.as_str();

        // 1. The record must exist and still be valid
        let record = match self.tokens.find_by_token(tx, raw).await? {
            Some(record) if record.is_valid() => record,
            Some(record) => {
                self.refresh_rejected(Some(record.user_id), "revoked or expired", client);
                return Err(AppError::unauthorized(INVALID_REFRESH_MESSAGE));
            }
            None => {
                self.refresh_rejected(None, "unknown token", client);
                return Err(AppError::unauthorized(INVALID_REFRESH_MESSAGE));
            }
        };

        // 2. Signature, expiry and kind
        let claims = match self.codec.verify(raw, TokenKind::Refresh) {
            Ok(claims) => claims,
            Err(e) => {
                self.refresh_rejected(Some(record.user_id), &e.to_string(), client);
                let message = match e {
                    JwtError::WrongKind { .. } => WRONG_KIND_MESSAGE,
                    _ => UNVERIFIABLE_REFRESH_MESSAGE,
                };
                return Err(AppError::unauthorized(message));
            }
        };
        let user_id = claims.user_id()?;
        if user_id != record.user_id {
            self.refresh_rejected(Some(record.user_id), "subject mismatch", client);
            return Err(AppError::unauthorized(INVALID_REFRESH_MESSAGE));
        }

        // 3. Revoke the old token; losing the race means someone else rotated it
        if !self.tokens.revoke_if_active(tx, raw).await? {
            self.refresh_rejected(Some(user_id), "concurrent rotation", client);
            return Err(AppError::unauthorized(INVALID_REFRESH_MESSAGE));
        }

        // 4 + 5. Issue and persist the replacement pair
        let pair = self.issue_pair(tx, user_id).await.map_err(|e| {
            tracing::error!(
                user_id = %user_id,
                error = %e,
                "Refresh token revoked but replacement could not be issued"
            );
            e
        })?;

        audit_log(&AuditEvent::TokenRefresh {
            user_id,
            ip_address: client.ip_address.clone(),
        });

        Ok(pair)
    }

    /// Revoke every refresh token of the user
    ///
    /// Access tokens already issued stay valid until they expire.
    pub async fn logout(
        &self,
        tx: Option<&UnitOfWork>,
        user_id: Uuid,
        client: &ClientInfo,
    ) -> Result<u64, AppError> {
        let revoked = self.tokens.revoke_all(tx, user_id).await?;

        audit_log(&AuditEvent::Logout {
            user_id,
            revoked_tokens: revoked,
            ip_address: client.ip_address.clone(),
        });

        Ok(revoked)
    }

    /// Public profile of the user
    pub async fn me(&self, tx: Option<&UnitOfWork>, user_id: Uuid) -> Result<UserProfile, AppError> {
        self.users
            .find_by_id(tx, user_id)
            .await?
            .map(|user| UserProfile::from(&user))
            .ok_or_else(|| AppError::not_found("User not found"))
    }

    /// Refresh token records of the user, newest first
    pub async fn sessions(
        &self,
        tx: Option<&UnitOfWork>,
        user_id: Uuid,
    ) -> Result<Vec<SessionView>, AppError> {
        let records = self.tokens.find_by_user(tx, user_id).await?;
        Ok(records.into_iter().map(SessionView::from).collect())
    }

    /// Delete expired refresh token records
    pub async fn purge_expired(&self) -> Result<u64, AppError> {
        let deleted = self.tokens.delete_expired(None).await?;
        if deleted > 0 {
            tracing::info!(deleted, "Purged expired refresh tokens");
        }
        Ok(deleted)
    }

    async fn issue_pair(&self, tx: Option<&UnitOfWork>, user_id: Uuid) -> Result<TokenPair, AppError> {
        let access = self.codec.issue(user_id, TokenKind::Access)?;
        let refresh = self.codec.issue(user_id, TokenKind::Refresh)?;

        let expires_at = timestamp(refresh.claims.exp)?;
        self.tokens
            .create(tx, RefreshTokenRecord::new(user_id, &refresh.token, expires_at))
            .await?;

        Ok(TokenPair {
            access_token: access.token,
            refresh_token: refresh.token,
            token_type: "Bearer".to_string(),
            expires_in: self.codec.ttl_secs(TokenKind::Access),
        })
    }

    fn login_failed(&self, email: &str, reason: &str, client: &ClientInfo) {
        audit_log(&AuditEvent::LoginFailure {
            email: email.to_string(),
            reason: reason.to_string(),
            ip_address: client.ip_address.clone(),
            user_agent: client.user_agent.clone(),
        });
    }

    fn refresh_rejected(&self, user_id: Option<Uuid>, reason: &str, client: &ClientInfo) {
        audit_log(&AuditEvent::RefreshRejected {
            user_id,
            reason: reason.to_string(),
            ip_address: client.ip_address.clone(),
        });
    }
}

fn timestamp(secs: u64) -> Result<DateTime<Utc>, AppError> {
    i64::try_from(secs)
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .ok_or_else(|| AppError::internal(format!("Token expiry out of range: {secs}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password::{Argon2Hasher, PasswordConfig};
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use mitho_core::{JwtConfig, UserStatus};

    struct Harness {
        store: MemoryStore,
        service: AuthService,
    }

    fn harness_with_tokens(tokens: Arc<dyn RefreshTokenStore>, store: MemoryStore) -> Harness {
        let codec = TokenCodec::new(&JwtConfig {
            secret: "unit-test-secret".to_string(),
            ..Default::default()
        })
        .unwrap();
        let service = AuthService::new(
            Arc::new(store.clone()),
            tokens,
            Arc::new(Argon2Hasher::new(PasswordConfig::insecure_fast())),
            Arc::new(codec),
        );
        Harness { store, service }
    }

    fn harness() -> Harness {
        let store = MemoryStore::new();
        harness_with_tokens(Arc::new(store.clone()), store)
    }

    async fn seed_user(h: &Harness, email: &str, password: &str, status: UserStatus) -> Identity {
        let hash = Argon2Hasher::new(PasswordConfig::insecure_fast())
            .hash(password)
            .await
            .unwrap();
        let mut identity = Identity::new("Test", "User", email, hash);
        identity.status = status;
        h.store.put_user(identity.clone()).await;
        identity
    }

    fn login_request(email: &str, password: &str) -> LoginRequest {
        LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        }
    }

    fn refresh_request(token: &str) -> RefreshRequest {
        RefreshRequest {
            refresh_token: token.to_string(),
        }
    }

    #[tokio::test]
    async fn test_login_issues_one_pair_and_persists_refresh_record() {
        let h = harness();
        let user = seed_user(&h, "a@x.com", "secret1", UserStatus::Active).await;

        let response = h
            .service
            .login(None, login_request("a@x.com", "secret1"), &ClientInfo::default())
            .await
            .unwrap();

        assert_eq!(response.token_type, "Bearer");
        assert!(!response.access_token.is_empty());
        assert_eq!(response.user.id, user.id);
        assert_eq!(h.store.token_count().await, 1);

        let claims = h
            .service
            .codec()
            .verify(&response.refresh_token, TokenKind::Refresh)
            .unwrap();
        assert_eq!(claims.user_id().unwrap(), user.id);

        let record = h
            .store
            .find_by_token(None, &response.refresh_token)
            .await
            .unwrap()
            .unwrap();
        assert!(record.is_valid());
        assert_eq!(record.expires_at.timestamp() as u64, claims.exp);
    }

    #[tokio::test]
    async fn test_wrong_password_creates_no_record() {
        let h = harness();
        seed_user(&h, "a@x.com", "secret1", UserStatus::Active).await;

        let err = h
            .service
            .login(None, login_request("a@x.com", "secret2"), &ClientInfo::default())
            .await
            .unwrap_err();

        assert_eq!(err, AppError::unauthorized(INVALID_CREDENTIALS_MESSAGE));
        assert_eq!(h.store.token_count().await, 0);
    }

    #[tokio::test]
    async fn test_login_checks_unknown_then_inactive() {
        let h = harness();
        seed_user(&h, "pending@x.com", "secret1", UserStatus::Inactive).await;

        let unknown = h
            .service
            .login(None, login_request("nobody@x.com", "secret1"), &ClientInfo::default())
            .await
            .unwrap_err();
        assert_eq!(unknown, AppError::not_found(NOT_FOUND_MESSAGE));

        // Inactive wins over a wrong password
        let inactive = h
            .service
            .login(None, login_request("pending@x.com", "wrong-pass"), &ClientInfo::default())
            .await
            .unwrap_err();
        assert_eq!(inactive, AppError::unauthorized(INACTIVE_MESSAGE));
    }

    #[tokio::test]
    async fn test_login_accepts_padded_mixed_case_email() {
        let h = harness();
        let user = seed_user(&h, "a@x.com", "secret1", UserStatus::Active).await;

        let login = h
            .service
            .login(None, login_request("  A@X.com ", "secret1"), &ClientInfo::default())
            .await
            .unwrap();

        assert_eq!(login.user.id, user.id);
        assert_eq!(h.store.token_count().await, 1);
    }

    #[tokio::test]
    async fn test_login_validation_messages() {
        let h = harness();
        let err = h
            .service
            .login(None, login_request("not-an-email", "123"), &ClientInfo::default())
            .await
            .unwrap_err();

        let AppError::Validation { errors, .. } = err else {
            panic!("expected validation error");
        };
        assert_eq!(errors["email"], vec!["The email must be a valid email address."]);
        assert_eq!(errors["password"], vec!["The password must be at least 6 characters."]);
    }

    #[tokio::test]
    async fn test_signup_creates_inactive_user_without_tokens() {
        let h = harness();
        let request = SignupRequest {
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            email: "Ada@X.com".to_string(),
        };

        let identity = h
            .service
            .signup(None, request, &ClientInfo::default())
            .await
            .unwrap();

        assert_eq!(identity.email, "ada@x.com");
        assert_eq!(identity.status, UserStatus::Inactive);
        assert!(identity.password_hash.starts_with("$argon2id$"));
        assert_eq!(h.store.token_count().await, 0);
    }

    #[tokio::test]
    async fn test_duplicate_signup_is_rejected() {
        let h = harness();
        seed_user(&h, "a@x.com", "secret1", UserStatus::Active).await;

        let err = h
            .service
            .signup(
                None,
                SignupRequest {
                    first_name: "A".to_string(),
                    last_name: "B".to_string(),
                    email: "A@x.com ".to_string(),
                },
                &ClientInfo::default(),
            )
            .await
            .unwrap_err();

        assert_eq!(err, AppError::validation(DUPLICATE_EMAIL_MESSAGE));
        assert_eq!(h.store.user_count().await, 1);
    }

    #[tokio::test]
    async fn test_rotated_token_cannot_be_reused() {
        let h = harness();
        seed_user(&h, "a@x.com", "secret1", UserStatus::Active).await;
        let client = ClientInfo::default();
        let login = h
            .service
            .login(None, login_request("a@x.com", "secret1"), &client)
            .await
            .unwrap();

        let rotated = h
            .service
            .refresh(None, refresh_request(&login.refresh_token), &client)
            .await
            .unwrap();
        assert_ne!(rotated.refresh_token, login.refresh_token);

        let reuse = h
            .service
            .refresh(None, refresh_request(&login.refresh_token), &client)
            .await
            .unwrap_err();
        assert_eq!(reuse, AppError::unauthorized(INVALID_REFRESH_MESSAGE));

        // The replacement still works
        h.service
            .refresh(None, refresh_request(&rotated.refresh_token), &client)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_refresh_has_single_winner() {
        let h = harness();
        seed_user(&h, "a@x.com", "secret1", UserStatus::Active).await;
        let client = ClientInfo::default();
        let login = h
            .service
            .login(None, login_request("a@x.com", "secret1"), &client)
            .await
            .unwrap();

        let (a, b) = tokio::join!(
            h.service
                .refresh(None, refresh_request(&login.refresh_token), &client),
            h.service
                .refresh(None, refresh_request(&login.refresh_token), &client),
        );

        assert_eq!(
            [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(),
            1
        );
    }

    #[tokio::test]
    async fn test_logout_revokes_every_refresh_token() {
        let h = harness();
        let user = seed_user(&h, "a@x.com", "secret1", UserStatus::Active).await;
        let client = ClientInfo::default();

        let first = h
            .service
            .login(None, login_request("a@x.com", "secret1"), &client)
            .await
            .unwrap();
        let second = h
            .service
            .login(None, login_request("a@x.com", "secret1"), &client)
            .await
            .unwrap();

        assert_eq!(h.service.logout(None, user.id, &client).await.unwrap(), 2);

        for token in [first.refresh_token, second.refresh_token] {
            let err = h
                .service
                .refresh(None, refresh_request(&token), &client)
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::Unauthorized(_)));
        }
    }

    #[tokio::test]
    async fn test_access_token_is_not_a_refresh_token() {
        let h = harness();
        let user = seed_user(&h, "a@x.com", "secret1", UserStatus::Active).await;
        let access = h
            .service
            .codec()
            .issue(user.id, TokenKind::Access)
            .unwrap();

        // Even with a matching record, the kind check refuses it
        RefreshTokenStore::create(
            &h.store,
            None,
            RefreshTokenRecord::new(user.id, &access.token, Utc::now() + chrono::Duration::days(1)),
        )
        .await
        .unwrap();

        let err = h
            .service
            .refresh(None, refresh_request(&access.token), &ClientInfo::default())
            .await
            .unwrap_err();
        assert_eq!(err, AppError::unauthorized(WRONG_KIND_MESSAGE));
    }

    /// Token store whose `create` fails after the first call
    struct FailingCreate {
        inner: MemoryStore,
        allowed: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl RefreshTokenStore for FailingCreate {
        async fn create(
            &self,
            tx: Option<&UnitOfWork>,
            record: RefreshTokenRecord,
        ) -> Result<RefreshTokenRecord, StoreError> {
            use std::sync::atomic::Ordering;
            if self.allowed.fetch_sub(1, Ordering::SeqCst) == 0 {
                return Err(StoreError::Database("disk full".to_string()));
            }
            RefreshTokenStore::create(&self.inner, tx, record).await
        }

        async fn find_by_token(
            &self,
            tx: Option<&UnitOfWork>,
            raw_token: &str,
        ) -> Result<Option<RefreshTokenRecord>, StoreError> {
            self.inner.find_by_token(tx, raw_token).await
        }

        async fn revoke_if_active(
            &self,
            tx: Option<&UnitOfWork>,
            raw_token: &str,
        ) -> Result<bool, StoreError> {
            self.inner.revoke_if_active(tx, raw_token).await
        }

        async fn revoke(&self, tx: Option<&UnitOfWork>, id: Uuid) -> Result<(), StoreError> {
            self.inner.revoke(tx, id).await
        }

        async fn revoke_all(
            &self,
            tx: Option<&UnitOfWork>,
            user_id: Uuid,
        ) -> Result<u64, StoreError> {
            self.inner.revoke_all(tx, user_id).await
        }

        async fn delete_expired(&self, tx: Option<&UnitOfWork>) -> Result<u64, StoreError> {
            self.inner.delete_expired(tx).await
        }

        async fn find_by_user(
            &self,
            tx: Option<&UnitOfWork>,
            user_id: Uuid,
        ) -> Result<Vec<RefreshTokenRecord>, StoreError> {
            self.inner.find_by_user(tx, user_id).await
        }
    }

    #[tokio::test]
    async fn test_failed_persist_leaves_old_token_revoked() {
        let store = MemoryStore::new();
        let failing = Arc::new(FailingCreate {
            inner: store.clone(),
            allowed: std::sync::atomic::AtomicUsize::new(1),
        });
        let h = harness_with_tokens(failing, store);
        seed_user(&h, "a@x.com", "secret1", UserStatus::Active).await;
        let client = ClientInfo::default();

        let login = h
            .service
            .login(None, login_request("a@x.com", "secret1"), &client)
            .await
            .unwrap();

        let err = h
            .service
            .refresh(None, refresh_request(&login.refresh_token), &client)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));

        let old = h
            .store
            .find_by_token(None, &login.refresh_token)
            .await
            .unwrap()
            .unwrap();
        assert!(old.revoked);
        assert_eq!(h.store.token_count().await, 1);
    }

    #[tokio::test]
    async fn test_sessions_hide_token_material() {
        let h = harness();
        let user = seed_user(&h, "a@x.com", "secret1", UserStatus::Active).await;
        h.service
            .login(None, login_request("a@x.com", "secret1"), &ClientInfo::default())
            .await
            .unwrap();

        let sessions = h.service.sessions(None, user.id).await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert!(!sessions[0].revoked);

        let profile = h.service.me(None, user.id).await.unwrap();
        assert_eq!(profile.email, "a@x.com");
        assert!(profile.last_sign_in_at.is_some());
    }
}
