use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;

pub const PASSWORD_RESET_REQUESTED: &str = "user.password_reset_requested";
pub const PASSWORD_RESET_OTP_REQUESTED: &str = "user.password_reset_otp_requested";

/// Sink for account lifecycle events.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, topic: &str, payload: Value) -> anyhow::Result<()>;
}

/// Appends events to `auth_events`.
pub struct PgEventPublisher {
    pool: PgPool,
}

impl PgEventPublisher {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventPublisher for PgEventPublisher {
    async fn publish(&self, topic: &str, payload: Value) -> anyhow::Result<()> {
        sqlx::query("INSERT INTO auth_events (topic, payload) VALUES ($1, $2)")
            .bind(topic)
            .bind(payload)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
