use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// DB row struct for a tenant-scoped login credential.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct UserCredential {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub email: String,
    pub name: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub email_verified_at: Option<DateTime<Utc>>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub last_login_ip: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserCredential {
    pub fn is_verified(&self) -> bool {
        self.email_verified_at.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct NewCredential {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// An organization the user belongs to.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct Membership {
    pub org_id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
}

/// Role names plus the union of their permissions.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Grants {
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
}

impl Grants {
    /// Builds a snapshot from (role, permissions) rows; both lists come out
    /// sorted and de-duplicated.
    pub fn from_roles<I>(rows: I) -> Self
    where
        I: IntoIterator<Item = (String, Vec<String>)>,
    {
        let mut roles = Vec::new();
        let mut permissions = Vec::new();
        for (role, perms) in rows {
            roles.push(role);
            permissions.extend(perms);
        }
        roles.sort();
        roles.dedup();
        permissions.sort();
        permissions.dedup();
        Self { roles, permissions }
    }
}

/// Request metadata recorded on login.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

// Request/Response DTOs
//
// Identifiers arrive as strings and are parsed by the handlers; an empty
// tenant id means "resolve the tenant from the email".

#[derive(Debug, Deserialize)]
pub struct RegisterUserRequest {
    pub tenant_id: String,
    #[serde(default)]
    pub org_id: String,
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub org_id: String,
    #[serde(alias = "login")]
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LogoutRequest {
    #[serde(default)]
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
    #[serde(default)]
    pub org_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ValidateTokenRequest {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    #[serde(default)]
    pub tenant_id: String,
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordByTokenRequest {
    pub token: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct SendVerificationEmailRequest {
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyEmailRequest {
    pub user_id: String,
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyOtpRequest {
    #[serde(default)]
    pub tenant_id: String,
    pub email: String,
    pub otp: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct RevokeSessionRequest {
    pub session_id: String,
}

/// Either field picks the target; the name wins when both are sent.
#[derive(Debug, Deserialize)]
pub struct SwitchOrganizationRequest {
    #[serde(default)]
    pub org_id: String,
    #[serde(default)]
    pub org_name: String,
}

#[derive(Debug, Deserialize)]
pub struct RevokeUserSessionsRequest {
    pub user_id: String,
}

/// Returned by Register, Login, RefreshToken and SwitchOrganization.
#[derive(Debug, Clone, Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    /// Epoch seconds.
    pub token_expires_at: i64,
    /// Epoch seconds.
    pub refresh_expires_at: i64,
    pub user_id: Uuid,
    pub email: String,
    pub name: String,
    pub tenant_id: Uuid,
    pub org_id: Option<Uuid>,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ValidateTokenResponse {
    pub valid: bool,
    pub user_id: Uuid,
    pub email: String,
    pub name: String,
    pub tenant_id: Uuid,
    pub org_id: Option<Uuid>,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
    pub expires_at: i64,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

impl MessageResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}
