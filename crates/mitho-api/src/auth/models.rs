//! Persistence models for authentication
//!
//! - RefreshTokenRecord: one row per issued refresh token
//! - UserProfile / SessionView: public projections safe for API responses

use chrono::{DateTime, Utc};
use mitho_core::{AccountType, Identity, UserStatus};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use utoipa::ToSchema;
use uuid::Uuid;

/// Refresh token record
///
/// The raw token is never stored; `token_hash` holds its SHA-256 digest and
/// is unique across all records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct RefreshTokenRecord {
    pub id: Uuid,

    /// Owner of the token
    pub user_id: Uuid,

    /// Hex-encoded SHA-256 of the raw token
    pub token_hash: String,

    /// Equal to the signed token's `exp`
    pub expires_at: DateTime<Utc>,

    pub revoked: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub revoked_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl RefreshTokenRecord {
    /// Create an unrevoked record for a freshly issued raw token
    pub fn new(user_id: Uuid, raw_token: &str, expires_at: DateTime<Utc>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            token_hash: token_fingerprint(raw_token),
            expires_at,
            revoked: false,
            revoked_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Valid iff not revoked and not yet expired
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && !self.is_expired_at(now)
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    /// Mark revoked. Returns false when it already was.
    pub fn revoke(&mut self, now: DateTime<Utc>) -> bool {
        if self.revoked {
            return false;
        }
        self.revoked = true;
        self.revoked_at = Some(now);
        self.updated_at = now;
        true
    }
}

/// Digest under which a raw refresh token is stored and looked up
pub fn token_fingerprint(raw_token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw_token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Public user representation (safe for API responses)
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserProfile {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub email: String,
    #[schema(value_type = String)]
    pub account_type: AccountType,
    #[schema(value_type = String)]
    pub status: UserStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sign_in_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<&Identity> for UserProfile {
    fn from(identity: &Identity) -> Self {
        Self {
            id: identity.id,
            first_name: identity.first_name.clone(),
            last_name: identity.last_name.clone(),
            full_name: identity.full_name(),
            email: identity.email.clone(),
            account_type: identity.account_type,
            status: identity.status,
            last_sign_in_at: identity.last_sign_in_at,
            created_at: identity.created_at,
        }
    }
}

/// Refresh token record without token material
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SessionView {
    pub id: Uuid,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<RefreshTokenRecord> for SessionView {
    fn from(record: RefreshTokenRecord) -> Self {
        Self {
            id: record.id,
            user_id: record.user_id,
            expires_at: record.expires_at,
            revoked: record.revoked,
            revoked_at: record.revoked_at,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_refresh_token_validation() {
        let now = Utc::now();
        let mut record = RefreshTokenRecord::new(Uuid::new_v4(), "raw", now + Duration::days(7));

        assert!(record.is_valid_at(now));
        assert!(!record.is_expired_at(now));

        // Expired exactly at expires_at
        assert!(!record.is_valid_at(record.expires_at));

        assert!(record.revoke(now));
        assert!(!record.is_valid_at(now));
        assert_eq!(record.revoked_at, Some(now));

        // Second revoke is a no-op
        assert!(!record.revoke(now + Duration::seconds(5)));
        assert_eq!(record.revoked_at, Some(now));
    }

    #[test]
    fn test_raw_token_is_not_stored() {
        let record = RefreshTokenRecord::new(Uuid::new_v4(), "raw-token", Utc::now());
        assert_ne!(record.token_hash, "raw-token");
        assert_eq!(record.token_hash, token_fingerprint("raw-token"));
        assert_eq!(record.token_hash.len(), 64);
    }

    #[test]
    fn test_session_view_drops_hash() {
        let record = RefreshTokenRecord::new(Uuid::new_v4(), "raw", Utc::now());
        let json = serde_json::to_value(SessionView::from(record)).unwrap();
        assert!(json.get("token_hash").is_none());
        assert_eq!(json["revoked"], false);
    }
}
