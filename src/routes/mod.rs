pub mod auth;
pub mod health;
pub mod metrics;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::middleware::auth::{intercept, Interceptor};
use crate::AppState;

/// Health and metrics stay outside the interceptor; every RPC method goes
/// through it.
pub fn router(state: AppState, interceptor: Arc<Interceptor>) -> Router {
    let rpc = Router::new()
        .route(auth::REGISTER_USER, post(auth::register_user))
        .route(auth::LOGIN, post(auth::login))
        .route(auth::LOGOUT, post(auth::logout))
        .route(auth::REFRESH_TOKEN, post(auth::refresh_token))
        .route(auth::VALIDATE_TOKEN, post(auth::validate_token))
        .route(auth::FORGOT_PASSWORD, post(auth::forgot_password))
        .route(auth::RESET_PASSWORD_BY_TOKEN, post(auth::reset_password_by_token))
        .route(auth::SEND_VERIFICATION_EMAIL, post(auth::send_verification_email))
        .route(auth::VERIFY_EMAIL, post(auth::verify_email))
        .route(auth::FORGOT_PASSWORD_WITH_OTP, post(auth::forgot_password_with_otp))
        .route(auth::VERIFY_OTP_AND_RESET_PASSWORD, post(auth::verify_otp_and_reset_password))
        .route(auth::LIST_SESSIONS, post(auth::list_sessions))
        .route(auth::REVOKE_SESSION, post(auth::revoke_session))
        .route(auth::REVOKE_USER_SESSIONS, post(auth::revoke_user_sessions))
        .route(auth::SWITCH_ORGANIZATION, post(auth::switch_organization))
        .route_layer(middleware::from_fn_with_state(interceptor, intercept));

    Router::new()
        .route("/health", get(health::health_check))
        .route("/metrics", get(metrics::metrics_handler))
        .merge(rpc)
        .with_state(state)
}
