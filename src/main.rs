use std::sync::Arc;

use axum::http::{header, HeaderValue, Method};
use redis::Client as RedisClient;
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use identity_core::{
    clock::{Clock, SystemClock},
    config::Config,
    db,
    middleware::{auth::Interceptor, rate_limit::RateLimiter},
    routes,
    services::{
        audit::PgEventPublisher,
        auth::{AuthService, AuthSettings, Collaborators},
        email::EmailService,
        notifications::{HttpNotifier, Notifications, Notifier},
        password::PasswordHasher,
        token::TokenService,
    },
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let pool = db::create_pool(&config.database_url).await?;
    db::run_migrations(&pool).await?;
    info!("Database connected and migrations applied");

    let rate_limiter = match RedisClient::open(config.redis_url.as_str()) {
        Ok(client) => match client.get_multiplexed_async_connection().await {
            Ok(conn) => {
                info!("Redis connected");
                Some(RateLimiter::new(conn))
            }
            Err(e) => {
                warn!("Redis unavailable, rate limiting disabled: {e}");
                None
            }
        },
        Err(e) => {
            warn!("Invalid REDIS_URL, rate limiting disabled: {e}");
            None
        }
    };

    // Delivery channels in fallback order.
    let mut channels: Vec<Arc<dyn Notifier>> = Vec::new();
    if let Some(url) = &config.notification_service_url {
        channels.push(Arc::new(HttpNotifier::new(url)));
        info!("Notification service configured");
    }
    if let Some(email) = EmailService::new(&config) {
        channels.push(Arc::new(email));
        info!("SMTP email service configured");
    }
    let notifications = Notifications::new(channels);
    if notifications.is_empty() {
        warn!("No notification channel configured; account emails will not be delivered");
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let tokens = TokenService::new(
        &config.jwt_secret,
        &config.jwt_refresh_secret,
        &config.jwt_issuer,
        clock.clone(),
    );
    let auth = Arc::new(AuthService::new(
        db::stores(&pool),
        tokens,
        PasswordHasher::new(config.bcrypt_cost),
        Collaborators {
            notifications,
            events: Arc::new(PgEventPublisher::new(pool.clone())),
            mirrors: db::mirrors::linked_account_mirrors(&pool),
        },
        clock,
        AuthSettings::from_config(&config),
    ));

    let interceptor = Arc::new(Interceptor::new(
        routes::auth::interceptor_config(&config.super_roles),
        auth.clone(),
    ));

    let state = AppState { auth, rate_limiter };

    // Allow the app base domain and its subdomains; localhost is always allowed.
    let cors_origin = {
        let base = config.app_base_url.clone();
        AllowOrigin::predicate(move |origin: &HeaderValue, _| {
            let o = match origin.to_str() {
                Ok(s) => s,
                Err(_) => return false,
            };
            if o.starts_with("http://localhost") || o.starts_with("http://127.0.0.1") {
                return true;
            }
            if o == base {
                return true;
            }
            if let Some(idx) = base.find("://") {
                let after_scheme = &base[idx + 3..];
                let domain = after_scheme.split('/').next().unwrap_or(after_scheme);
                let domain_clean = domain.split(':').next().unwrap_or(domain);
                if o.ends_with(&format!(".{domain_clean}")) {
                    return true;
                }
            }
            false
        })
    };

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(AllowHeaders::list([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
        ]))
        .allow_origin(cors_origin);

    let app = routes::router(state, interceptor)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let addr = format!("{}:{}", config.host, config.port);
    info!("identity API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
