use redis::aio::MultiplexedConnection;

use crate::error::{AuthError, AuthResult};
use crate::services::password::normalize_email;

/// A fixed-window limit: `max_attempts` per `window_secs`.
#[derive(Debug, Clone, Copy)]
pub struct Limit {
    pub max_attempts: u64,
    pub window_secs: u64,
}

pub const LOGIN_LIMIT: Limit = Limit { max_attempts: 5, window_secs: 15 * 60 };
pub const FORGOT_PASSWORD_LIMIT: Limit = Limit { max_attempts: 3, window_secs: 30 * 60 };
pub const VERIFY_OTP_LIMIT: Limit = Limit { max_attempts: 10, window_secs: 15 * 60 };

/// Email-keyed rate limits stored in Redis.
#[derive(Clone)]
pub struct RateLimiter {
    redis: MultiplexedConnection,
}

impl RateLimiter {
    pub fn new(redis: MultiplexedConnection) -> Self {
        Self { redis }
    }

    /// Uses the INCR + EXPIRE strategy:
    /// - Increments a counter for `key`
    /// - On first increment, sets TTL to the window
    /// - Fails with `RateLimited` once the counter exceeds the limit
    ///
    /// Redis errors fail open.
    pub async fn check(&self, key: &str, limit: Limit) -> AuthResult<()> {
        let mut redis = self.redis.clone();
        let count: u64 = match redis::cmd("INCR").arg(key).query_async(&mut redis).await {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(key, "rate limit check skipped: {e}");
                return Ok(());
            }
        };

        if count == 1 {
            // Set TTL only on first increment to avoid resetting the window on each attempt
            let _: Result<(), _> = redis::cmd("EXPIRE")
                .arg(key)
                .arg(limit.window_secs)
                .query_async(&mut redis)
                .await;
        }

        exceeded(count, limit)
    }
}

fn exceeded(count: u64, limit: Limit) -> AuthResult<()> {
    if count > limit.max_attempts {
        return Err(AuthError::RateLimited);
    }
    Ok(())
}

/// Redis key for a (method, email) bucket. The tenant is left out: it is
/// optional and has many spellings, and each spelling must not get a fresh
/// allowance.
pub fn key(method: &str, email: &str) -> String {
    format!("rl:{method}:{}", normalize_email(email))
}
