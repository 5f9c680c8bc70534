use std::collections::HashSet;

use axum::{extract::State, http::HeaderMap, Json};
use uuid::Uuid;

use crate::{
    error::{AuthError, AuthResult},
    middleware::{
        auth::InterceptorConfig,
        rate_limit::{self, Limit, FORGOT_PASSWORD_LIMIT, LOGIN_LIMIT, VERIFY_OTP_LIMIT},
    },
    models::{
        auth::AuthenticatedUser,
        session::SessionDto,
        user::{
            ClientInfo, ForgotPasswordRequest, LoginRequest, LoginResponse, LogoutRequest,
            MessageResponse, RefreshTokenRequest, RegisterUserRequest, ResetPasswordByTokenRequest,
            RevokeSessionRequest, RevokeUserSessionsRequest, SendVerificationEmailRequest,
            SwitchOrganizationRequest, ValidateTokenRequest, ValidateTokenResponse, VerifyEmailRequest, VerifyOtpRequest,
        },
    },
    services::auth::{LoginInput, OrgTarget, Registration},
    AppState,
};

// ─── Method names ────────────────────────────────────────────────────────────

pub const REGISTER_USER: &str = "/auth.AuthService/RegisterUser";
pub const LOGIN: &str = "/auth.AuthService/Login";
pub const LOGOUT: &str = "/auth.AuthService/Logout";
pub const REFRESH_TOKEN: &str = "/auth.AuthService/RefreshToken";
pub const VALIDATE_TOKEN: &str = "/auth.AuthService/ValidateToken";
pub const FORGOT_PASSWORD: &str = "/auth.AuthService/ForgotPassword";
pub const RESET_PASSWORD_BY_TOKEN: &str = "/auth.AuthService/ResetPasswordByToken";
pub const SEND_VERIFICATION_EMAIL: &str = "/auth.AuthService/SendVerificationEmail";
pub const VERIFY_EMAIL: &str = "/auth.AuthService/VerifyEmail";
pub const FORGOT_PASSWORD_WITH_OTP: &str = "/auth.AuthService/ForgotPasswordWithOTP";
pub const VERIFY_OTP_AND_RESET_PASSWORD: &str = "/auth.AuthService/VerifyOTPAndResetPassword";
pub const LIST_SESSIONS: &str = "/auth.AuthService/ListSessions";
pub const REVOKE_SESSION: &str = "/auth.AuthService/RevokeSession";
pub const REVOKE_USER_SESSIONS: &str = "/auth.AuthService/RevokeUserSessions";
pub const SWITCH_ORGANIZATION: &str = "/auth.AuthService/SwitchOrganization";

pub const REVOKE_USER_SESSIONS_PERMISSION: &str = "revoke-user-sessions";
pub const SWITCH_ORGANIZATION_PERMISSION: &str = "switch-organizations";

/// Interceptor setup for this service's methods.
pub fn interceptor_config(super_roles: &HashSet<String>) -> InterceptorConfig {
    [
        REGISTER_USER,
        LOGIN,
        REFRESH_TOKEN,
        VALIDATE_TOKEN,
        FORGOT_PASSWORD,
        RESET_PASSWORD_BY_TOKEN,
        SEND_VERIFICATION_EMAIL,
        VERIFY_EMAIL,
        FORGOT_PASSWORD_WITH_OTP,
        VERIFY_OTP_AND_RESET_PASSWORD,
    ]
    .into_iter()
    .fold(InterceptorConfig::new(), |cfg, method| cfg.public_method(method))
    .require_any(REVOKE_USER_SESSIONS, &[REVOKE_USER_SESSIONS_PERMISSION])
    .require_any(SWITCH_ORGANIZATION, &[SWITCH_ORGANIZATION_PERMISSION])
    .super_roles(super_roles.iter().cloned())
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn parse_id(field: &str, raw: &str) -> AuthResult<Uuid> {
    Uuid::parse_str(raw.trim()).map_err(|_| AuthError::invalid_input(format!("invalid {field}")))
}

/// Empty means "not supplied".
fn parse_optional_id(field: &str, raw: &str) -> AuthResult<Option<Uuid>> {
    if raw.trim().is_empty() {
        return Ok(None);
    }
    parse_id(field, raw).map(Some)
}

fn client_info(headers: &HeaderMap) -> ClientInfo {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    };
    ClientInfo {
        ip: header("x-forwarded-for")
            .and_then(|v| v.split(',').next())
            .map(|v| v.trim().to_string())
            .or_else(|| header("x-real-ip").map(String::from)),
        user_agent: header("user-agent").map(String::from),
    }
}

async fn check_limit(state: &AppState, method: &str, email: &str, limit: Limit) -> AuthResult<()> {
    match &state.rate_limiter {
        Some(limiter) => limiter.check(&rate_limit::key(method, email), limit).await,
        None => Ok(()),
    }
}

// ─── Handlers ────────────────────────────────────────────────────────────────

/// Public, but a bearer token, when sent, identifies who is granting roles.
pub async fn register_user(
    State(state): State<AppState>,
    granter: Option<AuthenticatedUser>,
    Json(req): Json<RegisterUserRequest>,
) -> AuthResult<Json<LoginResponse>> {
    let registration = Registration {
        tenant_id: parse_id("tenant_id", &req.tenant_id)?,
        org_id: parse_optional_id("org_id", &req.org_id)?,
        name: req.name,
        email: req.email,
        password: req.password,
        roles: req.roles,
    };
    Ok(Json(state.auth.register(registration, granter.as_ref()).await?))
}

pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<LoginRequest>,
) -> AuthResult<Json<LoginResponse>> {
    let input = LoginInput {
        tenant_id: parse_optional_id("tenant_id", &req.tenant_id)?,
        org_id: parse_optional_id("org_id", &req.org_id)?,
        client: client_info(&headers),
        email: req.email,
        password: req.password,
    };
    check_limit(&state, "login", &input.email, LOGIN_LIMIT).await?;
    Ok(Json(state.auth.login(input).await?))
}

pub async fn logout(
    State(state): State<AppState>,
    caller: AuthenticatedUser,
    Json(req): Json<LogoutRequest>,
) -> AuthResult<Json<MessageResponse>> {
    state.auth.logout(caller.user_id, &req.refresh_token).await?;
    Ok(Json(MessageResponse::ok("logged out from all sessions")))
}

pub async fn refresh_token(
    State(state): State<AppState>,
    Json(req): Json<RefreshTokenRequest>,
) -> AuthResult<Json<LoginResponse>> {
    let org_id = parse_optional_id("org_id", &req.org_id)?;
    Ok(Json(state.auth.refresh(&req.refresh_token, org_id).await?))
}

pub async fn validate_token(
    State(state): State<AppState>,
    Json(req): Json<ValidateTokenRequest>,
) -> AuthResult<Json<ValidateTokenResponse>> {
    let identity = state.auth.validate(&req.token).await?;
    Ok(Json(ValidateTokenResponse {
        valid: true,
        user_id: identity.user_id,
        email: identity.email,
        name: identity.name,
        tenant_id: identity.tenant_id,
        org_id: identity.org_id,
        roles: identity.roles,
        permissions: identity.permissions,
        expires_at: identity.expires_at.timestamp(),
    }))
}

pub async fn forgot_password(
    State(state): State<AppState>,
    Json(req): Json<ForgotPasswordRequest>,
) -> AuthResult<Json<MessageResponse>> {
    let tenant_id = parse_optional_id("tenant_id", &req.tenant_id)?;
    check_limit(&state, "forgot", &req.email, FORGOT_PASSWORD_LIMIT).await?;
    state.auth.forgot_password(tenant_id, &req.email).await?;
    Ok(Json(MessageResponse::ok(
        "if an account exists for this email, a reset link has been sent",
    )))
}

pub async fn reset_password_by_token(
    State(state): State<AppState>,
    Json(req): Json<ResetPasswordByTokenRequest>,
) -> AuthResult<Json<MessageResponse>> {
    state
        .auth
        .reset_password_by_token(&req.token, &req.new_password)
        .await?;
    Ok(Json(MessageResponse::ok("password has been reset")))
}

pub async fn send_verification_email(
    State(state): State<AppState>,
    Json(req): Json<SendVerificationEmailRequest>,
) -> AuthResult<Json<MessageResponse>> {
    let user_id = parse_id("user_id", &req.user_id)?;
    state.auth.send_verification_email(user_id).await?;
    Ok(Json(MessageResponse::ok("verification email sent")))
}

pub async fn verify_email(
    State(state): State<AppState>,
    Json(req): Json<VerifyEmailRequest>,
) -> AuthResult<Json<MessageResponse>> {
    let user_id = parse_id("user_id", &req.user_id)?;
    state.auth.verify_email(user_id, &req.token).await?;
    Ok(Json(MessageResponse::ok("email verified")))
}

pub async fn forgot_password_with_otp(
    State(state): State<AppState>,
    Json(req): Json<ForgotPasswordRequest>,
) -> AuthResult<Json<MessageResponse>> {
    let tenant_id = parse_optional_id("tenant_id", &req.tenant_id)?;
    check_limit(&state, "forgot-otp", &req.email, FORGOT_PASSWORD_LIMIT).await?;
    state.auth.forgot_password_with_otp(tenant_id, &req.email).await?;
    Ok(Json(MessageResponse::ok(
        "if an account exists for this email, a reset code has been sent",
    )))
}

pub async fn verify_otp_and_reset_password(
    State(state): State<AppState>,
    Json(req): Json<VerifyOtpRequest>,
) -> AuthResult<Json<MessageResponse>> {
    let tenant_id = parse_optional_id("tenant_id", &req.tenant_id)?;
    check_limit(&state, "verify-otp", &req.email, VERIFY_OTP_LIMIT).await?;
    state
        .auth
        .verify_otp_and_reset_password(tenant_id, &req.email, &req.otp, &req.new_password)
        .await?;
    Ok(Json(MessageResponse::ok("password has been reset")))
}

pub async fn switch_organization(
    State(state): State<AppState>,
    caller: AuthenticatedUser,
    Json(req): Json<SwitchOrganizationRequest>,
) -> AuthResult<Json<LoginResponse>> {
    let target = if !req.org_name.trim().is_empty() {
        OrgTarget::Name(req.org_name)
    } else {
        match parse_optional_id("org_id", &req.org_id)? {
            Some(id) => OrgTarget::Id(id),
            None => return Err(AuthError::invalid_input("org_id or org_name is required")),
        }
    };
    Ok(Json(state.auth.switch_organization(&caller, target).await?))
}

pub async fn list_sessions(
    State(state): State<AppState>,
    caller: AuthenticatedUser,
) -> AuthResult<Json<Vec<SessionDto>>> {
    let sessions = state.auth.list_sessions(caller.user_id).await?;
    Ok(Json(sessions.into_iter().map(SessionDto::from).collect()))
}

pub async fn revoke_session(
    State(state): State<AppState>,
    caller: AuthenticatedUser,
    Json(req): Json<RevokeSessionRequest>,
) -> AuthResult<Json<MessageResponse>> {
    let session_id = parse_id("session_id", &req.session_id)?;
    state.auth.revoke_session(caller.user_id, session_id).await?;
    Ok(Json(MessageResponse::ok("session revoked")))
}

pub async fn revoke_user_sessions(
    State(state): State<AppState>,
    caller: AuthenticatedUser,
    Json(req): Json<RevokeUserSessionsRequest>,
) -> AuthResult<Json<MessageResponse>> {
    let user_id = parse_id("user_id", &req.user_id)?;
    let deleted = state.auth.revoke_user_sessions(user_id).await?;
    tracing::info!(admin_id = %caller.user_id, user_id = %user_id, deleted, "user sessions revoked by admin");
    Ok(Json(MessageResponse::ok(format!("{deleted} session(s) revoked"))))
}
