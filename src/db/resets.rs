use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::error::{AuthError, AuthResult};
use crate::models::session::{EmailVerificationToken, PasswordReset, ResetKind};
use crate::store::{ResetStore, VerificationStore};

const RESET_COLUMNS: &str = "id, user_id, reset_type, token, otp, expires_at, created_at, used";

/// reset_type is plain TEXT in the table.
#[derive(FromRow)]
struct ResetRow {
    id: Uuid,
    user_id: Uuid,
    reset_type: String,
    token: Option<Uuid>,
    otp: Option<String>,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    used: bool,
}

impl TryFrom<ResetRow> for PasswordReset {
    type Error = AuthError;

    fn try_from(row: ResetRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            kind: row.reset_type.parse::<ResetKind>().map_err(AuthError::internal)?,
            token: row.token,
            otp: row.otp,
            expires_at: row.expires_at,
            created_at: row.created_at,
            used: row.used,
        })
    }
}

pub struct PgResetStore {
    pool: PgPool,
}

impl PgResetStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert(
        &self,
        user_id: Uuid,
        kind: ResetKind,
        token: Option<Uuid>,
        otp: Option<&str>,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AuthResult<PasswordReset> {
        let row = sqlx::query_as::<_, ResetRow>(&format!(
            "INSERT INTO password_resets (id, user_id, reset_type, token, otp, expires_at, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {RESET_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(kind.as_str())
        .bind(token)
        .bind(otp)
        .bind(expires_at)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }
}

#[async_trait]
impl ResetStore for PgResetStore {
    async fn create_link(
        &self,
        user_id: Uuid,
        token: Uuid,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AuthResult<PasswordReset> {
        self.insert(user_id, ResetKind::Link, Some(token), None, expires_at, now)
            .await
    }

    async fn create_otp(
        &self,
        user_id: Uuid,
        otp: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AuthResult<PasswordReset> {
        self.insert(user_id, ResetKind::Otp, None, Some(otp), expires_at, now)
            .await
    }

    async fn get_by_token(&self, token: Uuid) -> AuthResult<Option<PasswordReset>> {
        let row = sqlx::query_as::<_, ResetRow>(&format!(
            "SELECT {RESET_COLUMNS} FROM password_resets WHERE token = $1"
        ))
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        row.map(PasswordReset::try_from).transpose()
    }

    async fn find_active_otp(
        &self,
        user_id: Uuid,
        otp: &str,
        now: DateTime<Utc>,
    ) -> AuthResult<Option<PasswordReset>> {
        let row = sqlx::query_as::<_, ResetRow>(&format!(
            "SELECT {RESET_COLUMNS} FROM password_resets
             WHERE user_id = $1 AND otp = $2 AND reset_type = 'otp'
               AND used = FALSE AND expires_at > $3
             ORDER BY created_at DESC
             LIMIT 1"
        ))
        .bind(user_id)
        .bind(otp)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        row.map(PasswordReset::try_from).transpose()
    }

    async fn claim(&self, id: Uuid) -> AuthResult<bool> {
        let res = sqlx::query("UPDATE password_resets SET used = TRUE WHERE id = $1 AND used = FALSE")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() == 1)
    }

    async fn delete(&self, id: Uuid) -> AuthResult<()> {
        sqlx::query("DELETE FROM password_resets WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

pub struct PgVerificationStore {
    pool: PgPool,
}

impl PgVerificationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VerificationStore for PgVerificationStore {
    async fn create(
        &self,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AuthResult<EmailVerificationToken> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM email_verification_tokens WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        let token = sqlx::query_as::<_, EmailVerificationToken>(
            "INSERT INTO email_verification_tokens (token, user_id, expires_at, created_at)
             VALUES ($1, $2, $3, $4)
             RETURNING token, user_id, expires_at, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(expires_at)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(token)
    }

    async fn find(&self, user_id: Uuid, token: Uuid) -> AuthResult<Option<EmailVerificationToken>> {
        let row = sqlx::query_as::<_, EmailVerificationToken>(
            "SELECT token, user_id, expires_at, created_at
             FROM email_verification_tokens WHERE user_id = $1 AND token = $2",
        )
        .bind(user_id)
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn delete_for_user(&self, user_id: Uuid) -> AuthResult<()> {
        sqlx::query("DELETE FROM email_verification_tokens WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
