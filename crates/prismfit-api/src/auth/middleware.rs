//! Authentication middleware for protecting routes
//!
//! Extracts and validates the bearer access token from the Authorization
//! header. On success, adds the authenticated subject to request extensions.

use super::jwt::{Claims, JwtError};
use crate::audit::{audit_log, extract_ip_address, extract_user_agent, AuditEvent};
use crate::state::AppState;
use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Authenticated subject extracted from an access token
///
/// Handlers extract it with `Extension<AuthenticatedUser>`; ownership checks
/// on downstream resources compare against `user_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    /// User's unique identifier (token subject)
    pub user_id: Uuid,
    /// JWT token ID
    pub jti: String,
}

impl TryFrom<Claims> for AuthenticatedUser {
    type Error = TokenRejection;

    fn try_from(claims: Claims) -> Result<Self, Self::Error> {
        let user_id = Uuid::parse_str(&claims.sub)
            .map_err(|_| TokenRejection::InvalidToken(JwtError::InvalidToken))?;

        Ok(Self {
            user_id,
            jti: claims.jti,
        })
    }
}

/// Reasons a request is refused by [`auth_middleware`]
#[derive(Debug, Error)]
pub enum TokenRejection {
    #[error("Missing Authorization header")]
    MissingAuthHeader,

    #[error("Invalid Authorization header format")]
    InvalidAuthHeader,

    #[error("Invalid token: {0}")]
    InvalidToken(#[from] JwtError),
}

impl IntoResponse for TokenRejection {
    fn into_response(self) -> Response {
        let message = match self {
            TokenRejection::MissingAuthHeader => "Missing Authorization header",
            TokenRejection::InvalidAuthHeader => "Invalid Authorization header format",
            TokenRejection::InvalidToken(_) => "Invalid or expired token",
        };
        let status = StatusCode::UNAUTHORIZED;

        let body = serde_json::json!({
            "code": "UNAUTHORIZED",
            "message": message,
        });

        (status, axum::Json(body)).into_response()
    }
}

/// Authentication middleware that requires a valid access token
///
/// This middleware:
/// 1. Extracts the Authorization header
/// 2. Validates the Bearer token format
/// 3. Validates the JWT signature, expiry and token type
/// 4. Adds AuthenticatedUser to request extensions
///
/// # Usage
///
/// ```ignore
/// use axum::{Router, routing::get, middleware};
/// use prismfit_api::auth::middleware::auth_middleware;
///
/// let app = Router::new()
///     .route("/protected", get(protected_handler))
///     .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware));
/// ```
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, TokenRejection> {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .ok_or(TokenRejection::MissingAuthHeader)?
        .to_str()
        .map_err(|_| TokenRejection::InvalidAuthHeader)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(TokenRejection::InvalidAuthHeader)?;

    let user = match state
        .auth
        .signer()
        .validate_access_token(token)
        .map_err(TokenRejection::from)
        .and_then(AuthenticatedUser::try_from)
    {
        Ok(user) => user,
        Err(e) => {
            audit_log(&AuditEvent::InvalidToken {
                ip_address: extract_ip_address(request.headers()),
                user_agent: extract_user_agent(request.headers()),
                reason: e.to_string(),
            });
            return Err(e);
        }
    };

    request.extensions_mut().insert(user);

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::TokenType;

    fn claims(sub: &str) -> Claims {
        Claims {
            iss: "prismfit".to_string(),
            sub: sub.to_string(),
            jti: "jti-1".to_string(),
            iat: 0,
            exp: 0,
            typ: TokenType::Access,
        }
    }

    #[test]
    fn test_authenticated_user_from_claims() {
        let id = Uuid::new_v4();
        let user = AuthenticatedUser::try_from(claims(&id.to_string())).unwrap();
        assert_eq!(user.user_id, id);
        assert_eq!(user.jti, "jti-1");
    }

    #[test]
    fn test_non_uuid_subject_rejected() {
        let result = AuthenticatedUser::try_from(claims("not-a-uuid"));
        assert!(matches!(result, Err(TokenRejection::InvalidToken(_))));
    }

    #[test]
    fn test_rejection_status() {
        let response = TokenRejection::MissingAuthHeader.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
