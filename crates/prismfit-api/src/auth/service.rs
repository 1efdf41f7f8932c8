//! Authentication service layer
//!
//! Registration, login, refresh-token rotation and logout on top of the
//! user directory, the refresh-token store, the credential hasher and the
//! token signer. Callers pass the subject explicitly; nothing here reads
//! request context.

use super::jwt::TokenSigner;
use super::password::{CredentialHasher, PasswordError};
use base64::Engine;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use prismfit_core::{
    normalize_email, RefreshToken, RefreshTokenStore, StoreError, TokenPair, User, UserDirectory,
    UserPublic,
};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

const INVALID_REFRESH_TOKEN: &str = "Invalid refresh token.";
const REFRESH_TOKEN_NOT_RECOGNIZED: &str = "Refresh token not recognized (maybe used or expired?)";

/// Authentication failures surfaced to callers
///
/// The first four kinds are the caller-facing taxonomy; `Internal` and
/// `Storage` cover collaborator failures. Messages never carry secrets.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

impl From<PasswordError> for AuthError {
    fn from(err: PasswordError) -> Self {
        AuthError::Internal(err.to_string())
    }
}

/// SHA-256 fingerprint of a raw token, standard base64
///
/// This is the only form in which refresh tokens are persisted.
pub fn fingerprint(raw_token: &str) -> String {
    let digest = Sha256::digest(raw_token.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(digest)
}

/// Whole years between `date_of_birth` (epoch millis) and `today`
///
/// Returns `None` when the timestamp is out of range. A birth date in the
/// future counts as age 0.
pub fn age_in_years(date_of_birth: i64, today: NaiveDate) -> Option<u32> {
    let birth_date = DateTime::<Utc>::from_timestamp_millis(date_of_birth)?.date_naive();
    Some(today.years_since(birth_date).unwrap_or(0))
}

/// Authentication service
///
/// Cheap to clone; all collaborators are shared.
#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserDirectory>,
    refresh_tokens: Arc<dyn RefreshTokenStore>,
    hasher: CredentialHasher,
    signer: TokenSigner,
    min_registration_age: u32,
}

impl AuthService {
    /// Create a new authentication service
    pub fn new(
        users: Arc<dyn UserDirectory>,
        refresh_tokens: Arc<dyn RefreshTokenStore>,
        hasher: CredentialHasher,
        signer: TokenSigner,
        min_registration_age: u32,
    ) -> Self {
        Self {
            users,
            refresh_tokens,
            hasher,
            signer,
            min_registration_age,
        }
    }

    /// The signer, for resolving access tokens at the HTTP edge
    pub fn signer(&self) -> &TokenSigner {
        &self.signer
    }

    /// Register a new user and issue their first token pair
    ///
    /// # Returns
    ///
    /// * `Ok(TokenPair)` - Tokens for the new account
    /// * `Err(AuthError::Conflict)` - Email already registered
    /// * `Err(AuthError::InvalidInput)` - Under the minimum age or bad date of birth
    ///
    /// Either the user and its first refresh record are both persisted, or
    /// neither is.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        nickname: &str,
        date_of_birth: i64,
    ) -> Result<TokenPair, AuthError> {
        let email = normalize_email(email);

        if self.users.find_by_email(&email).await?.is_some() {
            return Err(email_taken());
        }

        let age = age_in_years(date_of_birth, Utc::now().date_naive())
            .ok_or_else(|| AuthError::InvalidInput("Invalid date of birth.".to_string()))?;
        if age < self.min_registration_age {
            return Err(AuthError::InvalidInput(format!(
                "User must be at least {} years old.",
                self.min_registration_age
            )));
        }

        let hashed_password = self.hash_password(password).await?;
        let user = User::new(&email, hashed_password, nickname.to_string(), date_of_birth);

        // Sign before persisting anything so a signing failure leaves no trace
        let pair = self.sign_pair(user.id)?;

        let user = self.users.save(user).await.map_err(|e| match e {
            StoreError::Conflict(_) => email_taken(),
            other => AuthError::Storage(other),
        })?;

        if let Err(e) = self.store_refresh_token(user.id, &pair.refresh_token).await {
            if let Err(rollback) = self.users.remove(user.id).await {
                tracing::error!(user_id = %user.id, error = %rollback, "Failed to roll back registration");
            }
            return Err(e);
        }

        tracing::info!(user_id = %user.id, "User registered");
        Ok(pair)
    }

    /// Login with email and password
    ///
    /// Unknown emails and wrong passwords are reported as different kinds
    /// (`NotFound` vs `Unauthorized`).
    pub async fn login(&self, email: &str, password: &str) -> Result<TokenPair, AuthError> {
        let email = normalize_email(email);

        let user = self
            .users
            .find_by_email(&email)
            .await?
            .ok_or_else(|| AuthError::NotFound("A user with that email doesn't exist.".to_string()))?;

        if !self.verify_password(password, &user.hashed_password).await? {
            return Err(AuthError::Unauthorized("Incorrect password.".to_string()));
        }

        let pair = self.issue(user.id).await?;
        tracing::info!(user_id = %user.id, "Login succeeded");
        Ok(pair)
    }

    /// Exchange a refresh token for a new pair, consuming the old one
    ///
    /// A token that was already redeemed fails the fingerprint lookup even
    /// though its signature is still valid. When two calls race on the same
    /// token, the conditional delete lets exactly one through.
    pub async fn refresh(&self, raw_refresh_token: &str) -> Result<TokenPair, AuthError> {
        if !self.signer.validate_refresh_token(raw_refresh_token) {
            return Err(unauthorized(INVALID_REFRESH_TOKEN));
        }

        let user_id = self
            .signer
            .user_id_from_token(raw_refresh_token)
            .ok()
            .and_then(|sub| Uuid::parse_str(&sub).ok())
            .ok_or_else(|| unauthorized(INVALID_REFRESH_TOKEN))?;

        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| unauthorized(INVALID_REFRESH_TOKEN))?;

        let hashed = fingerprint(raw_refresh_token);

        let record = match self
            .refresh_tokens
            .find_by_user_id_and_hash(user.id, &hashed)
            .await?
        {
            Some(record) => record,
            None => {
                tracing::warn!(user_id = %user.id, "Refresh token not recognized");
                return Err(unauthorized(REFRESH_TOKEN_NOT_RECOGNIZED));
            }
        };

        let pair = self.sign_pair(user.id)?;

        if !self
            .refresh_tokens
            .delete_by_user_id_and_hash(user.id, &hashed)
            .await?
        {
            tracing::warn!(user_id = %user.id, "Refresh token consumed concurrently");
            return Err(unauthorized(REFRESH_TOKEN_NOT_RECOGNIZED));
        }

        if let Err(e) = self.store_refresh_token(user.id, &pair.refresh_token).await {
            // Put the consumed record back so the session is not lost
            if let Err(restore) = self.refresh_tokens.save(record).await {
                tracing::error!(user_id = %user.id, error = %restore, "Failed to restore refresh token");
            }
            return Err(e);
        }

        tracing::info!(user_id = %user.id, "Refresh token rotated");
        Ok(pair)
    }

    /// Revoke refresh tokens for `user_id`
    ///
    /// With `all_devices` every session of the user is dropped; otherwise only
    /// the given refresh token (if any). Returns the number of records removed.
    pub async fn logout(
        &self,
        user_id: Uuid,
        raw_refresh_token: Option<&str>,
        all_devices: bool,
    ) -> Result<u64, AuthError> {
        let removed = if all_devices {
            self.refresh_tokens.delete_all_for_user(user_id).await?
        } else if let Some(raw) = raw_refresh_token {
            let deleted = self
                .refresh_tokens
                .delete_by_user_id_and_hash(user_id, &fingerprint(raw))
                .await?;
            u64::from(deleted)
        } else {
            0
        };

        tracing::info!(user_id = %user_id, removed, "Logged out");
        Ok(removed)
    }

    /// Public profile for `user_id`
    pub async fn current_user(&self, user_id: Uuid) -> Result<UserPublic, AuthError> {
        self.users
            .find_by_id(user_id)
            .await?
            .map(|u| u.to_public())
            .ok_or_else(|| AuthError::NotFound("User not found".to_string()))
    }

    /// Drop refresh records that have expired
    pub async fn purge_expired_tokens(&self) -> Result<u64, AuthError> {
        let purged = self.refresh_tokens.purge_expired(Utc::now()).await?;
        if purged > 0 {
            tracing::info!(purged, "Purged expired refresh tokens");
        }
        Ok(purged)
    }

    /// Sign a new pair and persist the refresh fingerprint
    async fn issue(&self, user_id: Uuid) -> Result<TokenPair, AuthError> {
        let pair = self.sign_pair(user_id)?;
        self.store_refresh_token(user_id, &pair.refresh_token).await?;
        Ok(pair)
    }

    fn sign_pair(&self, user_id: Uuid) -> Result<TokenPair, AuthError> {
        let subject = user_id.to_string();

        let access_token = self
            .signer
            .generate_access_token(&subject)
            .map_err(|e| AuthError::Internal(format!("Failed to generate access token: {e}")))?;
        let refresh_token = self
            .signer
            .generate_refresh_token(&subject)
            .map_err(|e| AuthError::Internal(format!("Failed to generate refresh token: {e}")))?;

        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }

    async fn store_refresh_token(&self, user_id: Uuid, raw_refresh_token: &str) -> Result<(), AuthError> {
        let validity_ms = self.signer.refresh_token_validity_ms();
        let expires_at = Duration::try_milliseconds(validity_ms)
            .and_then(|ttl| Utc::now().checked_add_signed(ttl))
            .ok_or_else(|| {
                AuthError::Internal(format!("Refresh token lifetime of {validity_ms}ms is out of range"))
            })?;
        let record = RefreshToken::new(user_id, fingerprint(raw_refresh_token), expires_at);

        self.refresh_tokens.save(record).await?;
        Ok(())
    }

    async fn hash_password(&self, password: &str) -> Result<String, AuthError> {
        let hasher = self.hasher.clone();
        let password = password.to_string();

        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| AuthError::Internal(format!("Hashing task failed: {e}")))?
            .map_err(AuthError::from)
    }

    async fn verify_password(&self, password: &str, hashed_password: &str) -> Result<bool, AuthError> {
        let hasher = self.hasher.clone();
        let password = password.to_string();
        let hashed_password = hashed_password.to_string();

        tokio::task::spawn_blocking(move || hasher.verify(&password, &hashed_password))
            .await
            .map_err(|e| AuthError::Internal(format!("Verification task failed: {e}")))?
            .map_err(AuthError::from)
    }
}

fn email_taken() -> AuthError {
    AuthError::Conflict("A user with that email already exists.".to_string())
}

fn unauthorized(message: &str) -> AuthError {
    AuthError::Unauthorized(message.to_string())
}
