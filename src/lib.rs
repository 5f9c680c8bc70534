// Library exports for the server binary and tests
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod store;

use std::sync::Arc;

use middleware::rate_limit::RateLimiter;
use services::auth::AuthService;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthService>,
    /// `None` disables the per-email attempt limits.
    pub rate_limiter: Option<RateLimiter>,
}
