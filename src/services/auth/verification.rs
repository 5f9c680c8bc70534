use uuid::Uuid;

use super::AuthService;
use crate::error::{AuthError, AuthResult};
use crate::models::user::UserCredential;
use crate::services::notifications::Notice;

impl AuthService {
    /// Issues a fresh verification token (replacing any earlier one) and
    /// mails it. Unlike the other notices, a delivery failure is returned.
    pub async fn send_verification_email(&self, user_id: Uuid) -> AuthResult<()> {
        let user = self
            .stores
            .credentials
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AuthError::NotFound("user not found".into()))?;

        if user.is_verified() {
            return Err(AuthError::Conflict("email is already verified".into()));
        }

        let now = self.clock.now();
        let verification = self
            .stores
            .verifications
            .create(user.id, now + self.settings.verification_ttl, now)
            .await?;

        self.deliver_verification(&user, verification.token)
            .await
            .map_err(|e| {
                tracing::warn!(user_id = %user.id, "verification email not delivered: {e:#}");
                AuthError::DeliveryFailed(
                    "failed to send verification email, please update your email address".into(),
                )
            })
    }

    pub async fn verify_email(&self, user_id: Uuid, token: &str) -> AuthResult<()> {
        let token = Uuid::parse_str(token.trim())
            .map_err(|_| AuthError::invalid_input("invalid verification token format"))?;

        let record = self
            .stores
            .verifications
            .find(user_id, token)
            .await?
            .ok_or_else(|| AuthError::invalid_input("invalid or expired verification token"))?;

        let now = self.clock.now();
        if record.expires_at <= now {
            return Err(AuthError::invalid_input("invalid or expired verification token"));
        }

        self.stores.credentials.mark_email_verified(user_id, now).await?;

        if let Err(e) = self.stores.verifications.delete_for_user(user_id).await {
            tracing::warn!(user_id = %user_id, "failed to delete used verification token: {e}");
        }

        tracing::info!(user_id = %user_id, "email verified");
        Ok(())
    }

    /// Sends the verification link. When no channel takes it, a
    /// delivery-failure notice is attempted before the error is returned.
    pub(super) async fn deliver_verification(&self, user: &UserCredential, token: Uuid) -> anyhow::Result<()> {
        let to = Self::recipient(user);
        let url = format!(
            "{}/verify-email?user_id={}&token={}",
            self.settings.app_base_url, user.id, token
        );

        self.notifications
            .deliver_or_report(&to, &Notice::Verification { url })
            .await
            .map(|_| ())
    }
}
