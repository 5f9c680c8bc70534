use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AuthError, AuthResult};
use crate::models::user::{ClientInfo, Grants, NewCredential, UserCredential};
use crate::store::CredentialStore;

const USER_COLUMNS: &str = "id, tenant_id, email, name, password_hash, email_verified_at,
    last_login_at, last_login_ip, created_at, updated_at";

pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn ping(&self) -> AuthResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn create(&self, new: NewCredential) -> AuthResult<UserCredential> {
        let res = sqlx::query_as::<_, UserCredential>(&format!(
            "INSERT INTO users (id, tenant_id, email, name, password_hash, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $6)
             RETURNING {USER_COLUMNS}"
        ))
        .bind(new.id)
        .bind(new.tenant_id)
        .bind(&new.email)
        .bind(&new.name)
        .bind(&new.password_hash)
        .bind(new.created_at)
        .fetch_one(&self.pool)
        .await;

        match res {
            Ok(user) => Ok(user),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => Err(AuthError::Conflict(
                "a user with this email already exists in the tenant".into(),
            )),
            Err(e) => Err(e.into()),
        }
    }

    async fn find_by_email(&self, tenant_id: Uuid, email: &str) -> AuthResult<Option<UserCredential>> {
        let user = sqlx::query_as::<_, UserCredential>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE tenant_id = $1 AND email = $2"
        ))
        .bind(tenant_id)
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_by_email_global(&self, email: &str) -> AuthResult<Vec<UserCredential>> {
        let users = sqlx::query_as::<_, UserCredential>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1 ORDER BY created_at"
        ))
        .bind(email)
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }

    async fn find_by_id(&self, user_id: Uuid) -> AuthResult<Option<UserCredential>> {
        let user = sqlx::query_as::<_, UserCredential>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn update_password(&self, user_id: Uuid, password_hash: &str, at: DateTime<Utc>) -> AuthResult<()> {
        let res = sqlx::query("UPDATE users SET password_hash = $1, updated_at = $2 WHERE id = $3")
            .bind(password_hash)
            .bind(at)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        if res.rows_affected() == 0 {
            return Err(AuthError::NotFound("user not found".into()));
        }
        Ok(())
    }

    async fn update_last_login(&self, user_id: Uuid, at: DateTime<Utc>, client: &ClientInfo) -> AuthResult<()> {
        sqlx::query(
            "UPDATE users
             SET last_login_at = $1, last_login_ip = $2, last_login_user_agent = $3
             WHERE id = $4",
        )
        .bind(at)
        .bind(client.ip.as_deref())
        .bind(client.user_agent.as_deref())
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_email_verified(&self, user_id: Uuid, at: DateTime<Utc>) -> AuthResult<()> {
        let res = sqlx::query("UPDATE users SET email_verified_at = $1, updated_at = $1 WHERE id = $2")
            .bind(at)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        if res.rows_affected() == 0 {
            return Err(AuthError::NotFound("user not found".into()));
        }
        Ok(())
    }

    async fn missing_roles(&self, tenant_id: Uuid, roles: &[String]) -> AuthResult<Vec<String>> {
        if roles.is_empty() {
            return Ok(Vec::new());
        }
        let known: Vec<String> =
            sqlx::query_scalar("SELECT name FROM roles WHERE tenant_id = $1 AND name = ANY($2)")
                .bind(tenant_id)
                .bind(roles)
                .fetch_all(&self.pool)
                .await?;
        Ok(roles.iter().filter(|r| !known.contains(r)).cloned().collect())
    }

    async fn assign_roles(&self, user_id: Uuid, tenant_id: Uuid, roles: &[String]) -> AuthResult<()> {
        sqlx::query(
            "INSERT INTO user_roles (user_id, role_id)
             SELECT $1, id FROM roles WHERE tenant_id = $2 AND name = ANY($3)
             ON CONFLICT DO NOTHING",
        )
        .bind(user_id)
        .bind(tenant_id)
        .bind(roles)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn grants(&self, user_id: Uuid) -> AuthResult<Grants> {
        let rows: Vec<(String, Vec<String>)> = sqlx::query_as(
            "SELECT r.name, r.permissions
             FROM roles r
             JOIN user_roles ur ON ur.role_id = r.id
             WHERE ur.user_id = $1",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(Grants::from_roles(rows))
    }
}
