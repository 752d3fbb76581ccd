//! Mitho Core - Domain models and shared configuration
//!
//! This crate defines the types shared by the API server and the CLI:
//! - Identity records and their lifecycle status
//! - Configuration management

pub mod config;

pub use config::{
    AppConfig, ConfigError, DatabaseConfig, JwtConfig, LoggingConfig, MaintenanceConfig,
    ServerConfig, StoreBackend,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Identity
// ============================================================================

/// Raised when a persisted enum column holds an unknown value
#[derive(Debug, Error)]
#[error("Unknown {kind}: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// Account lifecycle status
///
/// New accounts start `Inactive` until the email is verified and a password
/// is set. Only `Active` accounts may log in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    #[default]
    Inactive,
    Active,
    Banned,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inactive => "inactive",
            Self::Active => "active",
            Self::Banned => "banned",
        }
    }
}

impl std::fmt::Display for UserStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for UserStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inactive" => Ok(Self::Inactive),
            "active" => Ok(Self::Active),
            "banned" => Ok(Self::Banned),
            _ => Err(UnknownVariant {
                kind: "user status",
                value: s.to_string(),
            }),
        }
    }
}

/// Kind of account
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    #[default]
    Customer,
    Admin,
    Staff,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Admin => "admin",
            Self::Staff => "staff",
        }
    }
}

impl std::fmt::Display for AccountType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AccountType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(Self::Customer),
            "admin" => Ok(Self::Admin),
            "staff" => Ok(Self::Staff),
            _ => Err(UnknownVariant {
                kind: "account type",
                value: s.to_string(),
            }),
        }
    }
}

/// A user known to the directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Stable opaque identifier
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    /// Unique, stored trimmed and lower-cased
    pub email: String,
    /// Argon2 PHC string
    #[serde(default, skip_serializing)]
    pub password_hash: String,
    pub account_type: AccountType,
    pub status: UserStatus,
    pub last_sign_in_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Identity {
    /// Create a new customer identity awaiting verification
    pub fn new(
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        email: impl AsRef<str>,
        password_hash: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            email: normalize_email(email.as_ref()),
            password_hash: password_hash.into(),
            account_type: AccountType::Customer,
            status: UserStatus::Inactive,
            last_sign_in_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }
}

/// Canonical form used for storing and looking up emails
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_identity_is_inactive_customer() {
        let identity = Identity::new("Ada", "Lovelace", "  Ada@Example.COM ", "hash");
        assert_eq!(identity.email, "ada@example.com");
        assert_eq!(identity.status, UserStatus::Inactive);
        assert_eq!(identity.account_type, AccountType::Customer);
        assert!(!identity.is_active());
        assert_eq!(identity.full_name(), "Ada Lovelace");
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [UserStatus::Inactive, UserStatus::Active, UserStatus::Banned] {
            assert_eq!(status.as_str().parse::<UserStatus>().unwrap(), status);
        }
        assert!("deleted".parse::<UserStatus>().is_err());
    }

    #[test]
    fn test_password_hash_is_not_serialized() {
        let identity = Identity::new("A", "B", "a@b.com", "secret-hash");
        let json = serde_json::to_value(&identity).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["status"], "inactive");
    }
}
