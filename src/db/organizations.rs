use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AuthResult;
use crate::models::user::Membership;
use crate::store::OrganizationDirectory;

pub struct PgOrganizationDirectory {
    pool: PgPool,
}

impl PgOrganizationDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrganizationDirectory for PgOrganizationDirectory {
    async fn memberships(&self, user_id: Uuid) -> AuthResult<Vec<Membership>> {
        let rows = sqlx::query_as::<_, Membership>(
            "SELECT o.id AS org_id, o.tenant_id, o.name
             FROM organizations o
             JOIN organization_members m ON m.org_id = o.id
             WHERE m.user_id = $1
             ORDER BY o.name",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
