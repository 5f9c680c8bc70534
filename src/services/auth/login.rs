use uuid::Uuid;

use super::{login_response, AuthService};
use crate::error::{AuthError, AuthResult};
use crate::models::{
    auth::AuthenticatedUser,
    user::{ClientInfo, LoginResponse, NewCredential},
};
use crate::services::{
    metrics,
    password::{normalize_email, validate_email, validate_strength},
    token::token_digest,
};

#[derive(Debug, Clone)]
pub struct Registration {
    pub tenant_id: Uuid,
    pub org_id: Option<Uuid>,
    pub name: String,
    pub email: String,
    pub password: String,
    pub roles: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct LoginInput {
    /// `None` resolves the tenant from the email.
    pub tenant_id: Option<Uuid>,
    pub org_id: Option<Uuid>,
    pub email: String,
    pub password: String,
    pub client: ClientInfo,
}

impl AuthService {
    // ─── Register ────────────────────────────────────────────────────────────

    /// Creates an unverified account and signs it in. Roles can only be
    /// handed out by `granter`, an authenticated caller of the same tenant
    /// who holds every one of them.
    pub async fn register(&self, req: Registration, granter: Option<&AuthenticatedUser>) -> AuthResult<LoginResponse> {
        let email = normalize_email(&req.email);
        let name = req.name.trim().to_string();
        if name.is_empty() {
            return Err(AuthError::invalid_input("name is required"));
        }
        validate_email(&email)?;
        validate_strength(&req.password)?;
        check_role_grant(granter, req.tenant_id, &req.roles)?;
        if req.org_id.is_some() {
            // Membership is granted by the organization service, never at sign-up.
            return Err(AuthError::PermissionDenied(
                "a new account is not a member of any organization".into(),
            ));
        }

        let credentials = &self.stores.credentials;
        if credentials.find_by_email(req.tenant_id, &email).await?.is_some() {
            return Err(AuthError::Conflict(
                "a user with this email already exists in the tenant".into(),
            ));
        }
        let missing = credentials.missing_roles(req.tenant_id, &req.roles).await?;
        if !missing.is_empty() {
            return Err(AuthError::invalid_input(format!(
                "unknown role(s): {}",
                missing.join(", ")
            )));
        }

        let password_hash = self.hasher.hash(&req.password)?;
        let user = credentials
            .create(NewCredential {
                id: Uuid::new_v4(),
                tenant_id: req.tenant_id,
                email,
                name,
                password_hash,
                created_at: self.clock.now(),
            })
            .await?;

        if !req.roles.is_empty() {
            credentials
                .assign_roles(user.id, user.tenant_id, &req.roles)
                .await?;
        }

        let now = self.clock.now();
        let verification = self
            .stores
            .verifications
            .create(user.id, now + self.settings.verification_ttl, now)
            .await?;

        // Registration succeeds even when the verification email does not go out.
        if let Err(e) = self.deliver_verification(&user, verification.token).await {
            tracing::warn!(user_id = %user.id, "verification email not delivered at registration: {e:#}");
        }

        let grants = credentials.grants(user.id).await?;
        let pair = self.issue_pair(&user, None, &grants)?;
        self.stores
            .refresh_tokens
            .create(self.refresh_record(user.id, &pair.refresh))
            .await?;
        self.start_session(user.id, &pair.access).await?;

        tracing::info!(user_id = %user.id, tenant_id = %user.tenant_id, "user registered");
        Ok(login_response(&user, None, grants, pair))
    }

    // ─── Login ───────────────────────────────────────────────────────────────

    pub async fn login(&self, req: LoginInput) -> AuthResult<LoginResponse> {
        let email = normalize_email(&req.email);
        if email.is_empty() || req.password.is_empty() {
            return Err(AuthError::invalid_input("email and password are required"));
        }

        let user = match self.resolve_account(req.tenant_id, &email).await? {
            Some(user) => user,
            None => {
                self.hasher.verify_missing(&req.password);
                tracing::info!("login failed: unknown email");
                metrics::login("invalid_credentials");
                return Err(AuthError::invalid_credentials());
            }
        };

        if !self.hasher.verify(&req.password, &user.password_hash) {
            tracing::info!(user_id = %user.id, "login failed: wrong password");
            metrics::login("invalid_credentials");
            return Err(AuthError::invalid_credentials());
        }

        if !user.is_verified() {
            tracing::info!(user_id = %user.id, "login refused: email not verified");
            metrics::login("unverified");
            return Err(AuthError::EmailNotVerified);
        }

        let org_id = self.resolve_org(&user, req.org_id).await?;

        let now = self.clock.now();
        if let Err(e) = self
            .stores
            .credentials
            .update_last_login(user.id, now, &req.client)
            .await
        {
            tracing::warn!(user_id = %user.id, "failed to record last login: {e}");
        }

        let grants = self.stores.credentials.grants(user.id).await?;
        let pair = self.issue_pair(&user, org_id, &grants)?;
        self.stores
            .refresh_tokens
            .create(self.refresh_record(user.id, &pair.refresh))
            .await?;
        self.start_session(user.id, &pair.access).await?;

        metrics::login("success");
        tracing::info!(user_id = %user.id, tenant_id = %user.tenant_id, "login succeeded");
        Ok(login_response(&user, org_id, grants, pair))
    }

    // ─── Logout ──────────────────────────────────────────────────────────────

    /// Global logout: drops the supplied refresh token and every session of
    /// the user, on all devices.
    pub async fn logout(&self, user_id: Uuid, refresh_token: &str) -> AuthResult<()> {
        if !refresh_token.is_empty() {
            let digest = token_digest(refresh_token);
            match self.stores.refresh_tokens.owner_of(&digest, self.clock.now()).await {
                Ok(Some(owner)) if owner != user_id => {
                    tracing::warn!(user_id = %user_id, "logout with a refresh token owned by another user");
                }
                Ok(_) => {
                    if let Err(e) = self.stores.refresh_tokens.delete(&digest).await {
                        tracing::warn!(user_id = %user_id, "failed to delete refresh token on logout: {e}");
                    }
                }
                Err(e) => tracing::warn!(user_id = %user_id, "refresh token lookup failed on logout: {e}"),
            }
        }

        let deleted = self.invalidate_all_sessions(user_id).await;
        tracing::info!(user_id = %user_id, sessions = deleted, "user logged out");
        Ok(())
    }

    // ─── Refresh ─────────────────────────────────────────────────────────────

    /// Exchanges a refresh token for a new pair. The old token stops working
    /// the moment the rotation commits; a second use fails.
    pub async fn refresh(&self, refresh_token: &str, org_id: Option<Uuid>) -> AuthResult<LoginResponse> {
        let result = self.rotate_refresh(refresh_token, org_id).await;
        metrics::refresh(if result.is_ok() { "success" } else { "rejected" });
        result
    }

    async fn rotate_refresh(&self, refresh_token: &str, org_id: Option<Uuid>) -> AuthResult<LoginResponse> {
        let claims = self
            .tokens
            .verify_refresh(refresh_token)
            .map_err(|_| AuthError::unauthenticated("invalid or expired refresh token"))?;
        let subject = Uuid::parse_str(&claims.sub)
            .map_err(|_| AuthError::unauthenticated("invalid or expired refresh token"))?;

        let old_digest = token_digest(refresh_token);
        let owner = self
            .stores
            .refresh_tokens
            .owner_of(&old_digest, self.clock.now())
            .await?
            .ok_or_else(|| AuthError::unauthenticated("refresh token not found or expired"))?;

        if owner != subject {
            tracing::warn!(subject = %subject, owner = %owner, "refresh token presented for another user");
            return Err(AuthError::unauthenticated("refresh token does not belong to this user"));
        }

        let user = self
            .stores
            .credentials
            .find_by_id(owner)
            .await?
            .ok_or_else(|| AuthError::unauthenticated("user no longer exists"))?;
        let org_id = self.resolve_org(&user, org_id).await?;

        let grants = self.stores.credentials.grants(user.id).await?;
        let pair = self.issue_pair(&user, org_id, &grants)?;

        let rotated = self
            .stores
            .refresh_tokens
            .rotate(&old_digest, self.refresh_record(user.id, &pair.refresh))
            .await?;
        if !rotated {
            tracing::warn!(user_id = %user.id, "refresh token reused after rotation");
            return Err(AuthError::unauthenticated("refresh token already used"));
        }

        self.start_session(user.id, &pair.access).await?;

        tracing::debug!(user_id = %user.id, "refresh token rotated");
        Ok(login_response(&user, org_id, grants, pair))
    }
}

fn check_role_grant(granter: Option<&AuthenticatedUser>, tenant_id: Uuid, roles: &[String]) -> AuthResult<()> {
    if roles.is_empty() {
        return Ok(());
    }
    let Some(granter) = granter else {
        tracing::warn!(tenant_id = %tenant_id, "anonymous registration asked for roles");
        return Err(AuthError::PermissionDenied(
            "roles can only be assigned by an authenticated user".into(),
        ));
    };
    if granter.tenant_id != tenant_id {
        return Err(AuthError::PermissionDenied(
            "roles can only be assigned within your own tenant".into(),
        ));
    }
    let withheld: Vec<&str> = roles
        .iter()
        .filter(|r| !granter.has_role(r))
        .map(String::as_str)
        .collect();
    if !withheld.is_empty() {
        tracing::info!(user_id = %granter.user_id, "registration asked for roles the caller lacks");
        return Err(AuthError::PermissionDenied(format!(
            "cannot assign role(s) you do not hold: {}",
            withheld.join(", ")
        )));
    }
    Ok(())
}
