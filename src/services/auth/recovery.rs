use serde_json::json;
use uuid::Uuid;

use super::AuthService;
use crate::error::{AuthError, AuthResult};
use crate::models::{session::ResetKind, user::UserCredential};
use crate::services::{
    audit::{PASSWORD_RESET_OTP_REQUESTED, PASSWORD_RESET_REQUESTED},
    codes::generate_otp,
    metrics,
    notifications::Notice,
    password::{normalize_email, validate_strength},
    side_effects::SideEffects,
};

impl AuthService {
    // ─── Link flow ───────────────────────────────────────────────────────────

    /// Always `Ok` for an unknown email, so callers cannot discover accounts.
    pub async fn forgot_password(&self, tenant_id: Option<Uuid>, email: &str) -> AuthResult<()> {
        let email = normalize_email(email);
        let Some(user) = self.recovery_account(tenant_id, &email).await? else {
            return Ok(());
        };

        let now = self.clock.now();
        let token = Uuid::new_v4();
        let record = self
            .stores
            .resets
            .create_link(user.id, token, now + self.settings.link_reset_ttl, now)
            .await?;
        metrics::password_reset("link", "requested");

        let to = Self::recipient(&user);
        let url = format!("{}/reset-password?token={}", self.settings.app_base_url, token);

        let mut effects = SideEffects::new();
        effects.push("reset_link_email", async {
            self.notifications
                .deliver_or_report(&to, &Notice::PasswordResetLink { url })
                .await
                .map(|_| ())
        });
        effects.push(
            "audit_event",
            self.events.publish(
                PASSWORD_RESET_REQUESTED,
                json!({
                    "user_id": user.id,
                    "tenant_id": user.tenant_id,
                    "expires_at": record.expires_at,
                }),
            ),
        );
        effects.run("forgot_password").await;

        tracing::info!(user_id = %user.id, "password reset link issued");
        Ok(())
    }

    pub async fn reset_password_by_token(&self, token: &str, new_password: &str) -> AuthResult<()> {
        let token = Uuid::parse_str(token.trim())
            .map_err(|_| AuthError::invalid_input("invalid reset token format"))?;

        let record = self
            .stores
            .resets
            .get_by_token(token)
            .await?
            .filter(|r| r.kind == ResetKind::Link && !r.used)
            .ok_or_else(|| AuthError::invalid_input("invalid or expired reset token"))?;

        if record.expires_at <= self.clock.now() {
            return Err(AuthError::invalid_input("reset token has expired"));
        }

        validate_strength(new_password)?;
        let password_hash = self.hasher.hash(new_password)?;

        if !self.stores.resets.claim(record.id).await? {
            return Err(AuthError::invalid_input("invalid or expired reset token"));
        }

        self.stores
            .credentials
            .update_password(record.user_id, &password_hash, self.clock.now())
            .await?;

        if let Err(e) = self.stores.resets.delete(record.id).await {
            tracing::warn!(user_id = %record.user_id, "failed to delete used reset token: {e}");
        }
        self.revoke_credentials(record.user_id).await;

        metrics::password_reset("link", "completed");
        tracing::info!(user_id = %record.user_id, "password reset by link");
        Ok(())
    }

    // ─── One-time code flow ──────────────────────────────────────────────────

    /// Always `Ok` for an unknown email.
    pub async fn forgot_password_with_otp(&self, tenant_id: Option<Uuid>, email: &str) -> AuthResult<()> {
        let email = normalize_email(email);
        let Some(user) = self.recovery_account(tenant_id, &email).await? else {
            return Ok(());
        };

        let now = self.clock.now();
        let otp = generate_otp();
        let record = self
            .stores
            .resets
            .create_otp(user.id, &otp, now + self.settings.otp_ttl, now)
            .await?;
        metrics::password_reset("otp", "requested");

        let to = Self::recipient(&user);
        let notice = Notice::PasswordResetCode {
            code: otp,
            valid_minutes: self.settings.otp_ttl.num_minutes(),
        };

        let mut effects = SideEffects::new();
        effects.push("reset_code_delivery", async {
            self.notifications.deliver(&to, &notice).await.map(|_| ())
        });
        effects.push(
            "audit_event",
            self.events.publish(
                PASSWORD_RESET_OTP_REQUESTED,
                json!({
                    "user_id": user.id,
                    "tenant_id": user.tenant_id,
                    "expires_at": record.expires_at,
                }),
            ),
        );
        effects.run("forgot_password_with_otp").await;

        tracing::info!(user_id = %user.id, "password reset code issued");
        Ok(())
    }

    pub async fn verify_otp_and_reset_password(
        &self,
        tenant_id: Option<Uuid>,
        email: &str,
        otp: &str,
        new_password: &str,
    ) -> AuthResult<()> {
        let email = normalize_email(email);
        let otp = otp.trim();
        if email.is_empty() || otp.is_empty() {
            return Err(AuthError::invalid_input("email and otp are required"));
        }

        let invalid = || AuthError::invalid_input("invalid or expired code");

        let user = self
            .resolve_account(tenant_id, &email)
            .await?
            .ok_or_else(invalid)?;

        validate_strength(new_password)?;

        let now = self.clock.now();
        let record = self
            .stores
            .resets
            .find_active_otp(user.id, otp, now)
            .await?
            .filter(|r| r.is_usable(now))
            .ok_or_else(invalid)?;

        let password_hash = self.hasher.hash(new_password)?;

        if !self.stores.resets.claim(record.id).await? {
            return Err(invalid());
        }

        self.stores
            .credentials
            .update_password(user.id, &password_hash, self.clock.now())
            .await?;

        let mut effects = SideEffects::new();
        for mirror in &self.mirrors {
            let (email, hash) = (&user.email, &password_hash);
            effects.push(mirror.name(), async move {
                let updated = mirror.propagate(email, hash).await?;
                tracing::debug!(mirror = mirror.name(), updated, "password mirrored");
                Ok::<(), anyhow::Error>(())
            });
        }
        effects.push("delete_used_code", async {
            self.stores.resets.delete(record.id).await.map_err(anyhow::Error::from)
        });
        effects.run("verify_otp_and_reset_password").await;

        self.revoke_credentials(user.id).await;

        metrics::password_reset("otp", "completed");
        tracing::info!(user_id = %user.id, "password reset by one-time code");
        Ok(())
    }

    /// Account lookup for the "forgot" requests. Unknown and ambiguous
    /// emails both come back as `None` so the caller's answer is the same.
    async fn recovery_account(&self, tenant_id: Option<Uuid>, email: &str) -> AuthResult<Option<UserCredential>> {
        match self.resolve_account(tenant_id, email).await {
            Ok(None) => {
                tracing::debug!("reset requested for an unknown email");
                Ok(None)
            }
            Err(AuthError::InvalidInput(_)) => {
                tracing::info!("reset not sent: email belongs to several tenants and no tenant was given");
                Ok(None)
            }
            other => other,
        }
    }
}
