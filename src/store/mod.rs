//! Repository contracts used by the authentication service.
//!
//! Tokens are never handed to a store in plaintext: sessions and refresh
//! tokens are keyed by the SHA-256 digest computed in `services::token`.
//! Every expiry filter takes an explicit `now` so the caller's clock decides.

#[cfg(test)]
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AuthResult;
use crate::models::{
    session::{EmailVerificationToken, PasswordReset, RefreshToken, Session},
    user::{ClientInfo, Grants, Membership, NewCredential, UserCredential},
};

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Cheap connectivity probe for the health endpoint.
    async fn ping(&self) -> AuthResult<()>;

    /// Fails with `Conflict` when the email is already registered in the tenant.
    async fn create(&self, new: NewCredential) -> AuthResult<UserCredential>;

    async fn find_by_email(&self, tenant_id: Uuid, email: &str) -> AuthResult<Option<UserCredential>>;

    /// Every credential with this email, across tenants.
    async fn find_by_email_global(&self, email: &str) -> AuthResult<Vec<UserCredential>>;

    async fn find_by_id(&self, user_id: Uuid) -> AuthResult<Option<UserCredential>>;

    async fn update_password(&self, user_id: Uuid, password_hash: &str, at: DateTime<Utc>) -> AuthResult<()>;

    async fn update_last_login(&self, user_id: Uuid, at: DateTime<Utc>, client: &ClientInfo) -> AuthResult<()>;

    async fn mark_email_verified(&self, user_id: Uuid, at: DateTime<Utc>) -> AuthResult<()>;

    /// Names from `roles` that are not defined for the tenant.
    async fn missing_roles(&self, tenant_id: Uuid, roles: &[String]) -> AuthResult<Vec<String>>;

    async fn assign_roles(&self, user_id: Uuid, tenant_id: Uuid, roles: &[String]) -> AuthResult<()>;

    async fn grants(&self, user_id: Uuid) -> AuthResult<Grants>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create(&self, session: Session) -> AuthResult<Session>;

    async fn get_by_token(&self, token_hash: &str) -> AuthResult<Option<Session>>;

    async fn get_by_id(&self, id: Uuid) -> AuthResult<Option<Session>>;

    async fn list_by_user(&self, user_id: Uuid) -> AuthResult<Vec<Session>>;

    /// Returns whether a row was removed.
    async fn delete(&self, id: Uuid) -> AuthResult<bool>;

    /// Deletes every session of the user one by one. A failed delete is
    /// logged and the remaining rows are still attempted. Returns the number
    /// of rows removed.
    async fn delete_all_by_user(&self, user_id: Uuid) -> AuthResult<usize> {
        let sessions = self.list_by_user(user_id).await?;
        let mut deleted = 0;
        for session in sessions {
            match self.delete(session.id).await {
                Ok(true) => deleted += 1,
                Ok(false) => {}
                Err(e) => tracing::warn!(
                    user_id = %user_id,
                    session_id = %session.id,
                    "failed to delete session: {e}"
                ),
            }
        }
        Ok(deleted)
    }
}

#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    async fn create(&self, token: RefreshToken) -> AuthResult<()>;

    /// Owner of a stored, unexpired refresh token.
    async fn owner_of(&self, token_hash: &str, now: DateTime<Utc>) -> AuthResult<Option<Uuid>>;

    async fn delete(&self, token_hash: &str) -> AuthResult<bool>;

    /// Atomically replaces `old_hash` with `replacement`. Returns `false`
    /// (and inserts nothing) if `old_hash` was no longer stored.
    async fn rotate(&self, old_hash: &str, replacement: RefreshToken) -> AuthResult<bool>;

    async fn delete_all_by_user(&self, user_id: Uuid) -> AuthResult<u64>;
}

#[async_trait]
pub trait ResetStore: Send + Sync {
    async fn create_link(
        &self,
        user_id: Uuid,
        token: Uuid,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AuthResult<PasswordReset>;

    async fn create_otp(
        &self,
        user_id: Uuid,
        otp: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AuthResult<PasswordReset>;

    async fn get_by_token(&self, token: Uuid) -> AuthResult<Option<PasswordReset>>;

    /// Unused, unexpired code for this user.
    async fn find_active_otp(
        &self,
        user_id: Uuid,
        otp: &str,
        now: DateTime<Utc>,
    ) -> AuthResult<Option<PasswordReset>>;

    /// Marks the record used. Returns `false` if it already was, so at most
    /// one caller ever wins a given record.
    async fn claim(&self, id: Uuid) -> AuthResult<bool>;

    async fn delete(&self, id: Uuid) -> AuthResult<()>;
}

#[async_trait]
pub trait VerificationStore: Send + Sync {
    /// Creates a fresh token, replacing any outstanding one for the user.
    async fn create(
        &self,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AuthResult<EmailVerificationToken>;

    async fn find(&self, user_id: Uuid, token: Uuid) -> AuthResult<Option<EmailVerificationToken>>;

    async fn delete_for_user(&self, user_id: Uuid) -> AuthResult<()>;
}

/// A secondary account record that shares a login email and should receive
/// the same password hash.
/// Read side of the organization service: which organizations a user
/// belongs to. Membership itself is managed elsewhere.
#[async_trait]
pub trait OrganizationDirectory: Send + Sync {
    async fn memberships(&self, user_id: Uuid) -> AuthResult<Vec<Membership>>;
}

#[async_trait]
pub trait PasswordMirror: Send + Sync {
    fn name(&self) -> &'static str;

    /// Returns the number of records updated.
    async fn propagate(&self, email: &str, password_hash: &str) -> anyhow::Result<u64>;
}
