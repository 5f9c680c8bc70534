use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::services::token::TokenError;

/// Failure kinds surfaced by the identity core.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    Unauthenticated(String),

    #[error("email not verified: please verify your email before logging in")]
    EmailNotVerified,

    #[error("{0}")]
    PermissionDenied(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("too many attempts, try again in a few minutes")]
    RateLimited,

    #[error("{0}")]
    DeliveryFailed(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type AuthResult<T> = Result<T, AuthError>;

impl AuthError {
    /// The one message used for every wrong-email / wrong-password combination.
    pub fn invalid_credentials() -> Self {
        Self::Unauthenticated("invalid email or password".into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn unauthenticated(msg: impl Into<String>) -> Self {
        Self::Unauthenticated(msg.into())
    }

    pub fn internal(msg: impl std::fmt::Display) -> Self {
        Self::Internal(msg.to_string())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::EmailNotVerified | Self::PermissionDenied(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::DeliveryFailed(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// RPC-style status code carried in the error body.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_argument",
            Self::Unauthenticated(_) => "unauthenticated",
            Self::EmailNotVerified | Self::PermissionDenied(_) => "permission_denied",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "already_exists",
            Self::RateLimited => "resource_exhausted",
            Self::DeliveryFailed(_) => "unavailable",
            Self::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let message = match &self {
            Self::Internal(detail) => {
                tracing::error!(error = %detail, "internal error");
                "internal server error".to_string()
            }
            other => other.to_string(),
        };

        (
            self.status(),
            Json(json!({ "code": self.code(), "error": message })),
        )
            .into_response()
    }
}

impl From<sqlx::Error> for AuthError {
    fn from(e: sqlx::Error) -> Self {
        Self::Internal(format!("store: {e}"))
    }
}

impl From<bcrypt::BcryptError> for AuthError {
    fn from(e: bcrypt::BcryptError) -> Self {
        Self::Internal(format!("password hashing: {e}"))
    }
}

impl From<TokenError> for AuthError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::Invalid => Self::Unauthenticated("invalid or expired token".into()),
            TokenError::Signing(detail) => Self::Internal(format!("token signing: {detail}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_distinct_statuses() {
        assert_eq!(AuthError::invalid_credentials().status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AuthError::EmailNotVerified.status(), StatusCode::FORBIDDEN);
        assert_eq!(AuthError::RateLimited.code(), "resource_exhausted");
        assert_eq!(AuthError::Conflict("dup".into()).code(), "already_exists");
    }

    #[test]
    fn email_not_verified_is_not_a_credentials_failure() {
        let msg = AuthError::EmailNotVerified.to_string();
        assert!(msg.contains("email not verified"));
        assert_ne!(msg, AuthError::invalid_credentials().to_string());
    }

    #[test]
    fn token_failures_collapse_to_unauthenticated() {
        let err: AuthError = TokenError::Invalid.into();
        assert!(matches!(err, AuthError::Unauthenticated(_)));
    }
}
