//! Authentication and session-token lifecycle
//!
//! This module provides JWT-based authentication with the following components:
//! - Password hashing with Argon2 (`password`)
//! - Access/refresh token signing and validation (`jwt`)
//! - Registration, login and refresh-token rotation (`service`)
//! - Middleware resolving bearer access tokens into a subject (`middleware`)

pub mod jwt;
pub mod middleware;
pub mod password;
pub mod service;

pub use jwt::{Claims, JwtConfig, JwtError, TokenSigner, TokenType};
pub use middleware::{auth_middleware, AuthenticatedUser, TokenRejection};
pub use password::{validate_password_policy, CredentialHasher, PasswordConfig, PasswordError};
pub use service::{age_in_years, fingerprint, AuthError, AuthService};
