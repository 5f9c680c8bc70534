//! Authentication orchestration: login, registration, refresh, logout,
//! organization switching, password recovery and email verification on top
//! of the stores and the token service.
//!
//! Each flow is a short linear protocol. Persistence failures abort the flow;
//! notifications, audit events, mirroring and cleanup deletes are best-effort
//! and only logged.

mod login;
mod organizations;
mod recovery;
mod verification;


use std::sync::Arc;

use chrono::Duration;
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::Config;
use crate::error::{AuthError, AuthResult};
use crate::models::{
    auth::{AuthenticatedUser, Claims, TokenSubject},
    session::{RefreshToken, Session},
    user::{Grants, LoginResponse, UserCredential},
};
use crate::services::{
    audit::EventPublisher,
    notifications::{Notifications, Recipient},
    password::PasswordHasher,
    token::{epoch_to_datetime, token_digest, IssuedToken, TokenService},
};
use crate::store::{
    CredentialStore, OrganizationDirectory, PasswordMirror, RefreshTokenStore, ResetStore, SessionStore,
    VerificationStore,
};

pub use login::{LoginInput, Registration};
pub use organizations::OrgTarget;

/// Every repository the service composes.
#[derive(Clone)]
pub struct Stores {
    pub credentials: Arc<dyn CredentialStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub refresh_tokens: Arc<dyn RefreshTokenStore>,
    pub resets: Arc<dyn ResetStore>,
    pub verifications: Arc<dyn VerificationStore>,
    pub organizations: Arc<dyn OrganizationDirectory>,
}

/// Best-effort collaborators.
#[derive(Clone)]
pub struct Collaborators {
    pub notifications: Notifications,
    pub events: Arc<dyn EventPublisher>,
    /// Records outside this service that share the login email.
    pub mirrors: Vec<Arc<dyn PasswordMirror>>,
}

#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub link_reset_ttl: Duration,
    pub otp_ttl: Duration,
    pub verification_ttl: Duration,
    pub app_base_url: String,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            access_ttl: Duration::hours(2),
            refresh_ttl: Duration::days(7),
            link_reset_ttl: Duration::hours(1),
            otp_ttl: Duration::minutes(5),
            verification_ttl: Duration::hours(24),
            app_base_url: "http://localhost:3000".into(),
        }
    }
}

impl AuthSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            access_ttl: Duration::seconds(config.jwt_expiry_seconds as i64),
            refresh_ttl: Duration::days(config.jwt_refresh_expiry_days as i64),
            app_base_url: config.app_base_url.trim_end_matches('/').to_string(),
            ..Self::default()
        }
    }
}

pub struct AuthService {
    stores: Stores,
    tokens: TokenService,
    hasher: PasswordHasher,
    notifications: Notifications,
    events: Arc<dyn EventPublisher>,
    mirrors: Vec<Arc<dyn PasswordMirror>>,
    clock: Arc<dyn Clock>,
    settings: AuthSettings,
}

/// Freshly issued access + refresh pair.
struct IssuedPair {
    access: IssuedToken,
    refresh: IssuedToken,
}

impl AuthService {
    pub fn new(
        stores: Stores,
        tokens: TokenService,
        hasher: PasswordHasher,
        collaborators: Collaborators,
        clock: Arc<dyn Clock>,
        settings: AuthSettings,
    ) -> Self {
        Self {
            stores,
            tokens,
            hasher,
            notifications: collaborators.notifications,
            events: collaborators.events,
            mirrors: collaborators.mirrors,
            clock,
            settings,
        }
    }

    /// Health probe on the credential store.
    pub async fn ping(&self) -> AuthResult<()> {
        self.stores.credentials.ping().await
    }

    // ─── Validate ────────────────────────────────────────────────────────────

    /// Access token check used by the interceptor: a valid signature and
    /// expiry AND a live session row for this exact token.
    pub async fn validate(&self, token: &str) -> AuthResult<AuthenticatedUser> {
        let claims = self
            .tokens
            .verify(token)
            .map_err(|_| AuthError::unauthenticated("invalid or expired token"))?;

        let session = self
            .stores
            .sessions
            .get_by_token(&token_digest(token))
            .await?
            .ok_or_else(|| AuthError::unauthenticated("session not found"))?;

        if session.is_expired(self.clock.now()) {
            return Err(AuthError::unauthenticated("session expired"));
        }

        identity_from_claims(claims)
    }

    // ─── Sessions ────────────────────────────────────────────────────────────

    /// Live (unexpired) sessions of a user, oldest first.
    pub async fn list_sessions(&self, user_id: Uuid) -> AuthResult<Vec<Session>> {
        let now = self.clock.now();
        let sessions = self.stores.sessions.list_by_user(user_id).await?;
        Ok(sessions.into_iter().filter(|s| !s.is_expired(now)).collect())
    }

    /// Revokes one of the caller's own sessions.
    pub async fn revoke_session(&self, caller: Uuid, session_id: Uuid) -> AuthResult<()> {
        match self.stores.sessions.get_by_id(session_id).await? {
            Some(session) if session.user_id == caller => {
                self.stores.sessions.delete(session_id).await?;
                Ok(())
            }
            _ => Err(AuthError::NotFound("session not found".into())),
        }
    }

    /// Administrative revocation of every session and refresh token of a user.
    pub async fn revoke_user_sessions(&self, user_id: Uuid) -> AuthResult<usize> {
        let deleted = self.stores.sessions.delete_all_by_user(user_id).await?;
        self.stores.refresh_tokens.delete_all_by_user(user_id).await?;
        tracing::info!(user_id = %user_id, deleted, "revoked all sessions");
        Ok(deleted)
    }

    /// Deletes every session of the user. Failures are logged, never returned.
    pub async fn invalidate_all_sessions(&self, user_id: Uuid) -> usize {
        match self.stores.sessions.delete_all_by_user(user_id).await {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(user_id = %user_id, "failed to invalidate sessions: {e}");
                0
            }
        }
    }

    /// After a credential change: drop every session and refresh token.
    async fn revoke_credentials(&self, user_id: Uuid) {
        let sessions = self.invalidate_all_sessions(user_id).await;
        if let Err(e) = self.stores.refresh_tokens.delete_all_by_user(user_id).await {
            tracing::warn!(user_id = %user_id, "failed to delete refresh tokens: {e}");
        }
        tracing::info!(user_id = %user_id, sessions, "credentials revoked after password change");
    }

    // ─── Shared helpers ──────────────────────────────────────────────────────

    /// Resolves an account by email, scoped to a tenant when one is given.
    /// Without a tenant the email must identify exactly one account.
    async fn resolve_account(&self, tenant_id: Option<Uuid>, email: &str) -> AuthResult<Option<UserCredential>> {
        match tenant_id {
            Some(tenant_id) => self.stores.credentials.find_by_email(tenant_id, email).await,
            None => {
                let mut matches = self.stores.credentials.find_by_email_global(email).await?;
                match matches.len() {
                    0 => Ok(None),
                    1 => Ok(matches.pop()),
                    n => {
                        tracing::info!(accounts = n, "email registered in several tenants");
                        Err(AuthError::invalid_input(
                            "tenant_id is required: this email belongs to more than one tenant",
                        ))
                    }
                }
            }
        }
    }

    fn issue_pair(&self, user: &UserCredential, org_id: Option<Uuid>, grants: &Grants) -> AuthResult<IssuedPair> {
        let subject = TokenSubject {
            user_id: user.id,
            email: user.email.clone(),
            name: user.name.clone(),
            tenant_id: user.tenant_id,
            org_id,
        };
        let access = self
            .tokens
            .issue_access_token(&subject, grants, self.settings.access_ttl)?;
        let refresh = self
            .tokens
            .issue_refresh_token(user.id, user.tenant_id, self.settings.refresh_ttl)?;
        Ok(IssuedPair { access, refresh })
    }

    fn refresh_record(&self, user_id: Uuid, refresh: &IssuedToken) -> RefreshToken {
        RefreshToken {
            token_hash: token_digest(&refresh.token),
            user_id,
            expires_at: refresh.expires_at,
            created_at: self.clock.now(),
        }
    }

    async fn start_session(&self, user_id: Uuid, access: &IssuedToken) -> AuthResult<Session> {
        self.stores
            .sessions
            .create(Session {
                id: Uuid::new_v4(),
                user_id,
                token_hash: token_digest(&access.token),
                created_at: self.clock.now(),
                expires_at: access.expires_at,
            })
            .await
    }

    fn recipient(user: &UserCredential) -> Recipient {
        Recipient {
            email: user.email.clone(),
            name: user.name.clone(),
        }
    }
}

fn login_response(user: &UserCredential, org_id: Option<Uuid>, grants: Grants, pair: IssuedPair) -> LoginResponse {
    LoginResponse {
        access_token: pair.access.token,
        refresh_token: pair.refresh.token,
        token_expires_at: pair.access.expires_at.timestamp(),
        refresh_expires_at: pair.refresh.expires_at.timestamp(),
        user_id: user.id,
        email: user.email.clone(),
        name: user.name.clone(),
        tenant_id: user.tenant_id,
        org_id,
        roles: grants.roles,
        permissions: grants.permissions,
    }
}

fn identity_from_claims(claims: Claims) -> AuthResult<AuthenticatedUser> {
    let parse = |v: &str| Uuid::parse_str(v).map_err(|_| AuthError::unauthenticated("invalid token"));
    let org_id = match claims.org_id.as_deref() {
        Some(org) if !org.is_empty() => Some(parse(org)?),
        _ => None,
    };
    Ok(AuthenticatedUser {
        user_id: parse(&claims.user_id)?,
        tenant_id: parse(&claims.tenant_id)?,
        org_id,
        expires_at: epoch_to_datetime(claims.exp)
            .ok_or_else(|| AuthError::unauthenticated("invalid token"))?,
        email: claims.email,
        name: claims.name,
        roles: claims.roles,
        permissions: claims.permissions,
    })
}
