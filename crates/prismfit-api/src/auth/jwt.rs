//! JWT token generation and validation
//!
//! Implements access and refresh tokens with HMAC-SHA256 signing. Both carry
//! the user id as `sub` and differ in lifetime and the `typ` claim, so one
//! kind can never be presented in place of the other.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use prismfit_core::AuthConfig;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use uuid::Uuid;

/// Which kind of token a claim set belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

/// JWT Claims structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Token issuer
    pub iss: String,
    /// Subject - user ID
    pub sub: String,
    /// JWT ID - random per token, keeps sibling tokens uncorrelated
    pub jti: String,
    /// Issued at timestamp (Unix epoch)
    pub iat: u64,
    /// Expiration timestamp (Unix epoch)
    pub exp: u64,
    /// Access or refresh
    pub typ: TokenType,
}

/// JWT token generation and validation errors
#[derive(Debug, Error)]
pub enum JwtError {
    #[error("Failed to encode JWT: {0}")]
    EncodingError(#[from] jsonwebtoken::errors::Error),

    #[error("Invalid token format")]
    InvalidToken,

    #[error("Token has expired")]
    ExpiredToken,

    #[error("Invalid token signature")]
    InvalidSignature,

    #[error("Wrong token type: expected {expected:?}")]
    WrongTokenType { expected: TokenType },

    #[error("Token lifetime of {0}s overflows the expiry timestamp")]
    ExpiryOverflow(u64),

    #[error("System time error: {0}")]
    SystemTimeError(#[from] std::time::SystemTimeError),
}

/// JWT Configuration
#[derive(Clone)]
pub struct JwtConfig {
    /// Secret key for HMAC signing (must be at least 256 bits)
    pub secret: String,
    /// Access token expiration time in seconds (default: 900 = 15 minutes)
    pub access_expiration_secs: u64,
    /// Refresh token expiration time in seconds (default: 30 days)
    pub refresh_expiration_secs: u64,
    /// Token issuer identifier
    pub issuer: String,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self::from(&AuthConfig::default())
    }
}

impl From<&AuthConfig> for JwtConfig {
    fn from(config: &AuthConfig) -> Self {
        Self {
            secret: config.jwt_secret.clone(),
            access_expiration_secs: config.access_token_ttl_secs,
            refresh_expiration_secs: u64::try_from(config.refresh_token_ttl_days)
                .unwrap_or(0)
                .saturating_mul(24 * 60 * 60),
            issuer: config.jwt_issuer.clone(),
        }
    }
}

impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"<redacted>")
            .field("access_expiration_secs", &self.access_expiration_secs)
            .field("refresh_expiration_secs", &self.refresh_expiration_secs)
            .field("issuer", &self.issuer)
            .finish()
    }
}

/// Signs and validates access and refresh tokens
///
/// The signing key is fixed at construction; replacing it invalidates every
/// outstanding token.
#[derive(Clone)]
pub struct TokenSigner {
    config: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSigner")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl TokenSigner {
    pub fn new(config: JwtConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());

        Self {
            config,
            encoding_key,
            decoding_key,
        }
    }

    /// Generate a short-lived access token for `subject`
    pub fn generate_access_token(&self, subject: &str) -> Result<String, JwtError> {
        self.generate(subject, TokenType::Access, self.config.access_expiration_secs)
    }

    /// Generate a long-lived refresh token for `subject`
    pub fn generate_refresh_token(&self, subject: &str) -> Result<String, JwtError> {
        self.generate(subject, TokenType::Refresh, self.config.refresh_expiration_secs)
    }

    /// Validate an access token and extract its claims
    pub fn validate_access_token(&self, token: &str) -> Result<Claims, JwtError> {
        self.validate(token, TokenType::Access)
    }

    /// Check signature, issuer, expiry and type of a refresh token.
    ///
    /// Says nothing about whether the token was already redeemed; that is
    /// the refresh-token store's job.
    pub fn validate_refresh_token(&self, token: &str) -> bool {
        self.validate(token, TokenType::Refresh).is_ok()
    }

    /// Extract the subject from a validly signed token of either type
    pub fn user_id_from_token(&self, token: &str) -> Result<String, JwtError> {
        Ok(self.decode_claims(token)?.sub)
    }

    /// Refresh token lifetime in milliseconds
    pub fn refresh_token_validity_ms(&self) -> i64 {
        i64::try_from(self.config.refresh_expiration_secs)
            .unwrap_or(i64::MAX)
            .saturating_mul(1000)
    }

    /// Access token lifetime in seconds
    pub fn access_token_validity_secs(&self) -> u64 {
        self.config.access_expiration_secs
    }

    fn generate(&self, subject: &str, typ: TokenType, ttl_secs: u64) -> Result<String, JwtError> {
        let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();
        let exp = now
            .checked_add(ttl_secs)
            .ok_or(JwtError::ExpiryOverflow(ttl_secs))?;

        let claims = Claims {
            iss: self.config.issuer.clone(),
            sub: subject.to_string(),
            jti: Uuid::new_v4().to_string(),
            iat: now,
            exp,
            typ,
        };

        self.encode_claims(&claims)
    }

    pub(crate) fn encode_claims(&self, claims: &Claims) -> Result<String, JwtError> {
        Ok(encode(
            &Header::new(Algorithm::HS256),
            claims,
            &self.encoding_key,
        )?)
    }

    fn validate(&self, token: &str, expected: TokenType) -> Result<Claims, JwtError> {
        let claims = self.decode_claims(token)?;
        if claims.typ != expected {
            return Err(JwtError::WrongTokenType { expected });
        }
        Ok(claims)
    }

    fn decode_claims(&self, token: &str) -> Result<Claims, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.config.issuer]);
        validation.set_required_spec_claims(&["exp", "sub", "iss"]);
        validation.leeway = 0;

        let token_data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::ExpiredToken,
                jsonwebtoken::errors::ErrorKind::InvalidSignature => JwtError::InvalidSignature,
                _ => JwtError::InvalidToken,
            }
        })?;

        Ok(token_data.claims)
    }
}
