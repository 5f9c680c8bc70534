pub mod credentials;
pub mod mirrors;
pub mod organizations;
pub mod resets;
pub mod sessions;

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::services::auth::Stores;

pub async fn create_pool(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(20)
        .connect(database_url)
        .await?;
    Ok(pool)
}

/// Run the migrations embedded in ./migrations/
pub async fn run_migrations(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Postgres-backed implementations of every store the auth service needs.
pub fn stores(pool: &PgPool) -> Stores {
    Stores {
        credentials: Arc::new(credentials::PgCredentialStore::new(pool.clone())),
        sessions: Arc::new(sessions::PgSessionStore::new(pool.clone())),
        refresh_tokens: Arc::new(sessions::PgRefreshTokenStore::new(pool.clone())),
        resets: Arc::new(resets::PgResetStore::new(pool.clone())),
        verifications: Arc::new(resets::PgVerificationStore::new(pool.clone())),
        organizations: Arc::new(organizations::PgOrganizationDirectory::new(pool.clone())),
    }
}
