//! JWT token generation and validation
//!
//! Implements stateless access and refresh tokens signed with HMAC-SHA256.
//! The token kind is embedded in the claims so that a refresh token can never
//! be presented where an access token is expected, and vice versa.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use mitho_core::JwtConfig;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use uuid::Uuid;

/// Which half of the credential pair a token is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
        }
    }
}

/// JWT Claims structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Token issuer (always "mitho-api" unless configured)
    pub iss: String,
    /// Subject - user ID
    pub sub: String,
    /// JWT ID - unique per issued token
    pub jti: String,
    /// Token kind
    #[serde(rename = "type")]
    pub kind: TokenKind,
    /// Issued at timestamp (Unix epoch)
    pub iat: u64,
    /// Not before timestamp (Unix epoch)
    pub nbf: u64,
    /// Expiration timestamp (Unix epoch)
    pub exp: u64,
}

impl Claims {
    /// Subject parsed as a user id
    pub fn user_id(&self) -> Result<Uuid, JwtError> {
        Uuid::parse_str(&self.sub).map_err(|_| JwtError::InvalidToken)
    }
}

/// A freshly signed token together with its claims
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub claims: Claims,
}

/// JWT token generation and validation errors
#[derive(Debug, Error)]
pub enum JwtError {
    #[error("Failed to encode JWT: {0}")]
    EncodingError(#[from] jsonwebtoken::errors::Error),

    #[error("JWT secret must not be empty")]
    MissingSecret,

    #[error("Invalid token format")]
    InvalidToken,

    #[error("Token has expired")]
    ExpiredToken,

    #[error("Token is not valid yet")]
    ImmatureToken,

    #[error("Invalid token signature")]
    InvalidSignature,

    #[error("Unexpected signing algorithm")]
    UnexpectedAlgorithm,

    #[error("Expected {expected} token, got {actual}")]
    WrongKind { expected: &'static str, actual: &'static str },
}

/// Signs and verifies access and refresh tokens with a shared secret
#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    access_ttl_secs: u64,
    refresh_ttl_secs: u64,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("issuer", &self.issuer)
            .field("access_ttl_secs", &self.access_ttl_secs)
            .field("refresh_ttl_secs", &self.refresh_ttl_secs)
            .finish_non_exhaustive()
    }
}

impl TokenCodec {
    /// Build a codec from configuration. An empty secret is rejected.
    pub fn new(config: &JwtConfig) -> Result<Self, JwtError> {
        if config.secret.trim().is_empty() {
            return Err(JwtError::MissingSecret);
        }

        Ok(Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            issuer: config.issuer.clone(),
            access_ttl_secs: config.access_ttl_secs,
            refresh_ttl_secs: config.refresh_ttl_secs,
        })
    }

    /// Lifetime of the given token kind in seconds
    pub fn ttl_secs(&self, kind: TokenKind) -> u64 {
        match kind {
            TokenKind::Access => self.access_ttl_secs,
            TokenKind::Refresh => self.refresh_ttl_secs,
        }
    }

    /// Issue a token of the given kind using the configured lifetime
    pub fn issue(&self, subject: Uuid, kind: TokenKind) -> Result<IssuedToken, JwtError> {
        self.issue_with_ttl(subject, kind, self.ttl_secs(kind))
    }

    /// Issue a token with an explicit lifetime
    pub fn issue_with_ttl(
        &self,
        subject: Uuid,
        kind: TokenKind,
        ttl_secs: u64,
    ) -> Result<IssuedToken, JwtError> {
        let now = unix_now();

        let claims = Claims {
            iss: self.issuer.clone(),
            sub: subject.to_string(),
            jti: Uuid::new_v4().to_string(),
            kind,
            iat: now,
            nbf: now,
            exp: now + ttl_secs,
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?;

        Ok(IssuedToken { token, claims })
    }

    /// Verify signature, issuer, time window and kind, then return the claims
    pub fn verify(&self, token: &str, expected: TokenKind) -> Result<Claims, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "iss", "sub", "nbf"]);
        validation.validate_nbf = true;
        validation.leeway = 0;

        let token_data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::ExpiredToken,
                jsonwebtoken::errors::ErrorKind::ImmatureSignature => JwtError::ImmatureToken,
                jsonwebtoken::errors::ErrorKind::InvalidSignature => JwtError::InvalidSignature,
                jsonwebtoken::errors::ErrorKind::InvalidAlgorithm => JwtError::UnexpectedAlgorithm,
                _ => JwtError::InvalidToken,
            }
        })?;

        let claims = token_data.claims;
        if claims.kind != expected {
            return Err(JwtError::WrongKind {
                expected: expected.as_str(),
                actual: claims.kind.as_str(),
            });
        }

        Ok(claims)
    }
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
