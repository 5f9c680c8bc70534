use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;

use crate::store::PasswordMirror;

/// Mirrors a new password hash onto `linked_accounts` rows of one kind.
pub struct PgLinkedAccountMirror {
    pool: PgPool,
    kind: &'static str,
}

impl PgLinkedAccountMirror {
    pub fn new(pool: PgPool, kind: &'static str) -> Self {
        Self { pool, kind }
    }
}

#[async_trait]
impl PasswordMirror for PgLinkedAccountMirror {
    fn name(&self) -> &'static str {
        self.kind
    }

    async fn propagate(&self, email: &str, password_hash: &str) -> anyhow::Result<u64> {
        let res = sqlx::query(
            "UPDATE linked_accounts SET password_hash = $1, updated_at = NOW()
             WHERE kind = $2 AND email = $3",
        )
        .bind(password_hash)
        .bind(self.kind)
        .bind(email)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected())
    }
}

/// Tenant and organization admin mirrors.
pub fn linked_account_mirrors(pool: &PgPool) -> Vec<Arc<dyn PasswordMirror>> {
    vec![
        Arc::new(PgLinkedAccountMirror::new(pool.clone(), "tenant_admin")),
        Arc::new(PgLinkedAccountMirror::new(pool.clone(), "organization_admin")),
    ]
}
