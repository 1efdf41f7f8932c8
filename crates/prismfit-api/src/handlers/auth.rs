//! Authentication API handlers
//!
//! HTTP endpoints for registration, login, refresh-token rotation, logout
//! and the caller's own profile.

use crate::audit::{audit_log, extract_ip_address, extract_user_agent, AuditEvent};
use crate::auth::{validate_password_policy, AuthError, AuthenticatedUser};
use crate::error::AppError;
use crate::state::AppState;
use axum::{extract::State, http::HeaderMap, response::IntoResponse, Extension, Json};
use chrono::{DateTime, Utc};
use prismfit_core::{TokenPair, UserPublic};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// User registration request
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[validate(email(message = "Invalid email format."))]
    pub email: String,
    #[validate(custom(function = "validate_password_policy"))]
    pub password: String,
    #[validate(length(min = 3, max = 20, message = "Nickname must be 3-20 characters long."))]
    pub nickname: String,
    /// Milliseconds since the Unix epoch
    pub date_of_birth: i64,
}

/// User login request
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Token refresh request
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Logout request
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LogoutRequest {
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub all_devices: bool,
}

/// Token pair response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Access token lifetime in seconds
    pub expires_in: u64,
}

impl AuthResponse {
    fn new(pair: TokenPair, expires_in: u64) -> Self {
        Self {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            token_type: "Bearer".to_string(),
            expires_in,
        }
    }
}

/// Logout response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LogoutResponse {
    pub message: String,
    pub sessions_revoked: u64,
}

/// Public profile of the authenticated user
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub nickname: String,
    pub date_of_birth: i64,
    pub created_at: DateTime<Utc>,
}

impl From<UserPublic> for UserProfile {
    fn from(user: UserPublic) -> Self {
        Self {
            id: user.id,
            email: user.email,
            nickname: user.nickname,
            date_of_birth: user.date_of_birth,
            created_at: user.created_at,
        }
    }
}

/// Register a new user account
///
/// Creates the account and returns its first token pair.
#[utoipa::path(
    post,
    path = "/api/v1/auth/register",
    tag = "auth",
    request_body = RegisterRequest,
    responses(
        (status = 200, description = "User registered", body = AuthResponse),
        (status = 400, description = "Invalid input or under minimum age", body = crate::error::ApiError),
        (status = 409, description = "Email already registered", body = crate::error::ApiError),
        (status = 500, description = "Internal server error", body = crate::error::ApiError),
    )
)]
pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let ip_address = extract_ip_address(&headers);
    let user_agent = extract_user_agent(&headers);

    let result = match request.validate() {
        Ok(()) => state
            .auth
            .register(
                &request.email,
                &request.password,
                &request.nickname,
                request.date_of_birth,
            )
            .await
            .map_err(AppError::from),
        Err(errors) => Err(AppError::from(errors)),
    };

    match result {
        Ok(pair) => {
            audit_log(&AuditEvent::RegistrationSuccess {
                email: request.email,
                ip_address,
                user_agent,
            });
            let expires_in = state.auth.signer().access_token_validity_secs();
            Ok(Json(AuthResponse::new(pair, expires_in)))
        }
        Err(e) => {
            audit_log(&AuditEvent::RegistrationFailure {
                email: request.email,
                reason: failure_reason(&e),
                ip_address,
                user_agent,
            });
            Err(e)
        }
    }
}

/// Login with email and password
#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Incorrect password", body = crate::error::ApiError),
        (status = 404, description = "Unknown email", body = crate::error::ApiError),
        (status = 500, description = "Internal server error", body = crate::error::ApiError),
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let ip_address = extract_ip_address(&headers);
    let user_agent = extract_user_agent(&headers);

    match state.auth.login(&request.email, &request.password).await {
        Ok(pair) => {
            audit_log(&AuditEvent::LoginSuccess {
                email: request.email,
                ip_address,
                user_agent,
            });
            let expires_in = state.auth.signer().access_token_validity_secs();
            Ok(Json(AuthResponse::new(pair, expires_in)))
        }
        Err(e) => {
            let e = AppError::from(e);
            audit_log(&AuditEvent::LoginFailure {
                email: request.email,
                reason: failure_reason(&e),
                ip_address,
                user_agent,
            });
            Err(e)
        }
    }
}

/// Refresh access token
///
/// Exchanges a refresh token for a new pair. The presented token is consumed;
/// presenting it again fails.
#[utoipa::path(
    post,
    path = "/api/v1/auth/refresh",
    tag = "auth",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Token refreshed successfully", body = AuthResponse),
        (status = 401, description = "Invalid, expired, or already used refresh token", body = crate::error::ApiError),
        (status = 500, description = "Internal server error", body = crate::error::ApiError),
    )
)]
pub async fn refresh_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<RefreshRequest>,
) -> Result<impl IntoResponse, AppError> {
    let ip_address = extract_ip_address(&headers);
    let user_agent = extract_user_agent(&headers);

    match state.auth.refresh(&request.refresh_token).await {
        Ok(pair) => {
            audit_log(&AuditEvent::TokenRefresh {
                ip_address,
                user_agent,
            });
            let expires_in = state.auth.signer().access_token_validity_secs();
            Ok(Json(AuthResponse::new(pair, expires_in)))
        }
        Err(e) => {
            if let AuthError::Unauthorized(reason) = &e {
                audit_log(&AuditEvent::RefreshRejected {
                    reason: reason.clone(),
                    ip_address,
                    user_agent,
                });
            }
            Err(e.into())
        }
    }
}

/// Logout
///
/// Deletes the given refresh token, or every refresh token of the caller
/// when `allDevices` is set. Outstanding access tokens stay valid until
/// they expire.
#[utoipa::path(
    post,
    path = "/api/v1/auth/logout",
    tag = "auth",
    request_body(content = LogoutRequest, description = "Logout options; may be omitted"),
    responses(
        (status = 200, description = "Logout successful", body = LogoutResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ApiError),
        (status = 500, description = "Internal server error", body = crate::error::ApiError),
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    headers: HeaderMap,
    body: Option<Json<LogoutRequest>>,
) -> Result<impl IntoResponse, AppError> {
    let request = body.map(|Json(request)| request).unwrap_or_default();

    let removed = state
        .auth
        .logout(
            user.user_id,
            request.refresh_token.as_deref(),
            request.all_devices,
        )
        .await?;

    audit_log(&AuditEvent::Logout {
        user_id: user.user_id,
        sessions_revoked: removed,
        all_devices: request.all_devices,
        ip_address: extract_ip_address(&headers),
    });

    Ok(Json(LogoutResponse {
        message: "Logged out successfully".to_string(),
        sessions_revoked: removed,
    }))
}

/// Get current user profile
#[utoipa::path(
    get,
    path = "/api/v1/auth/me",
    tag = "auth",
    responses(
        (status = 200, description = "Current user profile", body = UserProfile),
        (status = 401, description = "Unauthorized", body = crate::error::ApiError),
        (status = 404, description = "User no longer exists", body = crate::error::ApiError),
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn me_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<impl IntoResponse, AppError> {
    let profile = state.auth.current_user(user.user_id).await?;
    Ok(Json(UserProfile::from(profile)))
}

fn failure_reason(error: &AppError) -> String {
    match error {
        AppError::BadRequest(msg)
        | AppError::Conflict(msg)
        | AppError::NotFound(msg)
        | AppError::Unauthorized(msg) => msg.clone(),
        AppError::Internal(_) | AppError::Database(_) => "internal error".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register_request(email: &str, password: &str, nickname: &str) -> RegisterRequest {
        RegisterRequest {
            email: email.to_string(),
            password: password.to_string(),
            nickname: nickname.to_string(),
            date_of_birth: 0,
        }
    }

    #[test]
    fn test_register_request_validation() {
        assert!(register_request("a@x.com", "Abcdef123", "nick").validate().is_ok());
        assert!(register_request("not-an-email", "Abcdef123", "nick").validate().is_err());
        assert!(register_request("a@x.com", "weak", "nick").validate().is_err());
        assert!(register_request("a@x.com", "Abcdef123", "ab").validate().is_err());
        assert!(register_request("a@x.com", "Abcdef123", &"n".repeat(21)).validate().is_err());
    }

    #[test]
    fn test_register_request_wire_format() {
        let request: RegisterRequest = serde_json::from_value(serde_json::json!({
            "email": "a@x.com",
            "password": "Abcdef123",
            "nickname": "nick",
            "dateOfBirth": 631152000000i64,
        }))
        .unwrap();
        assert_eq!(request.date_of_birth, 631152000000);
    }

    #[test]
    fn test_auth_response_serialization() {
        let response = AuthResponse::new(
            TokenPair {
                access_token: "a".to_string(),
                refresh_token: "r".to_string(),
            },
            900,
        );

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["accessToken"], "a");
        assert_eq!(json["refreshToken"], "r");
        assert_eq!(json["tokenType"], "Bearer");
        assert_eq!(json["expiresIn"], 900);
    }

    #[test]
    fn test_logout_request_defaults() {
        let request: LogoutRequest = serde_json::from_str("{}").unwrap();
        assert!(request.refresh_token.is_none());
        assert!(!request.all_devices);
    }

    #[test]
    fn test_failure_reason_hides_internal_details() {
        let reason = failure_reason(&AppError::Database("connection refused at 10.0.0.3".into()));
        assert_eq!(reason, "internal error");
    }
}
