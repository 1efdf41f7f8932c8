//! PrismFit Core - Domain models, storage traits, and shared types
//!
//! This crate defines the abstractions the authentication core is built on:
//! - Identity models (users, refresh-token fingerprints, token pairs)
//! - Storage traits for the user directory and the refresh-token store
//! - In-memory and PostgreSQL implementations of those traits
//! - Configuration management

pub mod config;
pub mod postgres;
pub mod store;

pub use config::{
    AppConfig, AuthConfig, ConfigError, DatabaseConfig, LoggingConfig, ServerConfig,
    StorageBackend,
};
pub use postgres::PgStore;
pub use store::{MemoryRefreshTokenStore, MemoryUserDirectory};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Error Types
// ============================================================================

/// Errors raised by storage collaborators
#[derive(Error, Debug)]
pub enum StoreError {
    /// A uniqueness constraint was violated (e.g. duplicate email)
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err.as_database_error() {
            Some(db_err) if db_err.is_unique_violation() => {
                StoreError::Conflict(db_err.message().to_string())
            }
            _ => StoreError::DatabaseError(err.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

// ============================================================================
// Identity Models
// ============================================================================

/// Registered user account
///
/// Created on registration and immutable afterwards. The password is only
/// ever held as an Argon2 PHC string.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    /// Trimmed, lower-cased email address (unique)
    pub email: String,
    /// Never serialized into API responses
    #[serde(skip_serializing, default)]
    pub hashed_password: String,
    pub nickname: String,
    /// Date of birth as milliseconds since the Unix epoch
    pub date_of_birth: i64,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Create a new user with a fresh id; `email` is normalized here
    pub fn new(
        email: &str,
        hashed_password: String,
        nickname: String,
        date_of_birth: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: normalize_email(email),
            hashed_password,
            nickname,
            date_of_birth,
            created_at: Utc::now(),
        }
    }

    /// Convert to the public representation (no credential material)
    pub fn to_public(&self) -> UserPublic {
        UserPublic {
            id: self.id,
            email: self.email.clone(),
            nickname: self.nickname.clone(),
            date_of_birth: self.date_of_birth,
            created_at: self.created_at,
        }
    }
}

/// Public user representation, safe for API responses
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserPublic {
    pub id: Uuid,
    pub email: String,
    pub nickname: String,
    pub date_of_birth: i64,
    pub created_at: DateTime<Utc>,
}

/// Canonical form of an email address used for lookups and uniqueness
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Server-side fingerprint of an issued refresh token
///
/// Only the SHA-256 hash of the raw token is kept, so a leaked table does not
/// yield usable tokens.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RefreshToken {
    pub user_id: Uuid,
    pub hashed_token: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl RefreshToken {
    pub fn new(user_id: Uuid, hashed_token: String, expires_at: DateTime<Utc>) -> Self {
        Self {
            user_id,
            hashed_token,
            expires_at,
            created_at: Utc::now(),
        }
    }

    /// Whether the record is past its expiry at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Access/refresh token pair handed back to callers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

// ============================================================================
// Storage Traits
// ============================================================================

/// Persistence for user identities
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Find a user by (normalized) email
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Find a user by id
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>>;

    /// Insert a new user. Fails with [`StoreError::Conflict`] if the email is taken.
    async fn save(&self, user: User) -> Result<User>;

    /// Remove a user. Only used to roll back a registration that could not
    /// complete.
    async fn remove(&self, id: Uuid) -> Result<()>;

    /// Backend name for logging
    fn name(&self) -> &str;
}

/// Persistence for refresh-token fingerprints
///
/// Implementations never see raw tokens. A lookup miss is `Ok(None)`.
#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    /// Persist a new fingerprint record
    async fn save(&self, record: RefreshToken) -> Result<()>;

    /// Find an unexpired record for `(user_id, hashed_token)`
    async fn find_by_user_id_and_hash(
        &self,
        user_id: Uuid,
        hashed_token: &str,
    ) -> Result<Option<RefreshToken>>;

    /// Delete the record for `(user_id, hashed_token)`.
    ///
    /// Returns `true` only if this call removed it; concurrent callers racing
    /// on the same key see exactly one `true`.
    async fn delete_by_user_id_and_hash(&self, user_id: Uuid, hashed_token: &str) -> Result<bool>;

    /// Delete every record owned by `user_id`, returning how many were removed
    async fn delete_all_for_user(&self, user_id: Uuid) -> Result<u64>;

    /// Drop records that expired at or before `now`
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64>;

    /// Backend name for logging
    fn name(&self) -> &str;
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Alice@Example.COM "), "alice@example.com");
        assert_eq!(normalize_email("bob@x.com"), "bob@x.com");
    }

    #[test]
    fn test_user_new_normalizes_email() {
        let user = User::new(" A@X.com", "hash".to_string(), "nick".to_string(), 0);
        assert_eq!(user.email, "a@x.com");
        assert_ne!(user.id, Uuid::nil());
    }

    #[test]
    fn test_user_serialization_hides_password() {
        let user = User::new("a@x.com", "$argon2id$secret".to_string(), "nick".to_string(), 0);
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("argon2id"));
        assert!(json.contains("dateOfBirth"));
    }

    #[test]
    fn test_refresh_token_expiry() {
        let now = Utc::now();
        let record = RefreshToken::new(Uuid::new_v4(), "h".to_string(), now + Duration::days(1));
        assert!(!record.is_expired_at(now));
        assert!(record.is_expired_at(now + Duration::days(2)));
    }

    #[test]
    fn test_token_pair_wire_format() {
        let pair = TokenPair {
            access_token: "a".to_string(),
            refresh_token: "r".to_string(),
        };
        let json = serde_json::to_value(&pair).unwrap();
        assert_eq!(json["accessToken"], "a");
        assert_eq!(json["refreshToken"], "r");
    }
}
