//! Authorization interceptor.
//!
//! Runs in front of every RPC route. Public methods pass through, carrying
//! the caller's identity only when a valid token happens to be sent; every
//! other call needs a bearer token that validates against a live
//! session, and methods with a required-permission set additionally need a
//! super-role or one of the listed permissions. The validated identity is
//! placed in the request extensions for handlers to extract.

use std::collections::{HashMap, HashSet};
use std::convert::Infallible;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, OptionalFromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::{AuthError, AuthResult};
use crate::models::auth::AuthenticatedUser;
use crate::services::auth::AuthService;

/// Something that can turn a bearer token into a caller identity.
#[async_trait]
pub trait TokenValidator: Send + Sync {
    async fn validate(&self, token: &str) -> AuthResult<AuthenticatedUser>;
}

#[async_trait]
impl TokenValidator for AuthService {
    async fn validate(&self, token: &str) -> AuthResult<AuthenticatedUser> {
        AuthService::validate(self, token).await
    }
}

/// Allow-list, permission map and super-roles, built once at startup by the
/// service mounting the interceptor.
#[derive(Debug, Clone, Default)]
pub struct InterceptorConfig {
    public_methods: HashSet<String>,
    permissions: HashMap<String, Vec<String>>,
    super_roles: HashSet<String>,
}

impl InterceptorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn public_method(mut self, method: impl Into<String>) -> Self {
        self.public_methods.insert(method.into());
        self
    }

    /// Callers of `method` need at least one of `permissions`.
    pub fn require_any(mut self, method: impl Into<String>, permissions: &[&str]) -> Self {
        self.permissions.insert(
            method.into(),
            permissions.iter().map(|p| p.to_string()).collect(),
        );
        self
    }

    pub fn super_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.super_roles.extend(roles.into_iter().map(Into::into));
        self
    }

    pub fn is_public(&self, method: &str) -> bool {
        self.public_methods.contains(method)
    }

    pub fn required_permissions(&self, method: &str) -> Option<&[String]> {
        self.permissions
            .get(method)
            .map(Vec::as_slice)
            .filter(|p| !p.is_empty())
    }

    /// Super-roles pass unconditionally; everyone else needs an overlap with
    /// the method's required set. Methods without a set only need a valid token.
    pub fn check_permission(&self, method: &str, caller: &AuthenticatedUser) -> AuthResult<()> {
        let Some(required) = self.required_permissions(method) else {
            return Ok(());
        };
        if caller.roles.iter().any(|r| self.super_roles.contains(r)) {
            return Ok(());
        }
        if caller.has_any_permission(required) {
            return Ok(());
        }
        Err(AuthError::PermissionDenied(format!(
            "insufficient permissions: requires one of [{}]",
            required.join(", ")
        )))
    }
}

pub struct Interceptor {
    config: InterceptorConfig,
    validator: Arc<dyn TokenValidator>,
}

impl Interceptor {
    pub fn new(config: InterceptorConfig, validator: Arc<dyn TokenValidator>) -> Self {
        Self { config, validator }
    }

    /// Decides a call. `Ok(Some(identity))` for authorized callers. Public
    /// methods never fail here: they yield the identity behind a valid token
    /// and `Ok(None)` otherwise.
    pub async fn authorize(&self, method: &str, headers: &HeaderMap) -> AuthResult<Option<AuthenticatedUser>> {
        let token = headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(bearer_token);

        if self.config.is_public(method) {
            let Some(token) = token else {
                return Ok(None);
            };
            return Ok(match self.validator.validate(token).await {
                Ok(caller) => Some(caller),
                Err(e) => {
                    tracing::debug!(method, "ignoring unusable token on public method: {e}");
                    None
                }
            });
        }

        let token = token.ok_or_else(|| AuthError::unauthenticated("missing authorization token"))?;

        let caller = self.validator.validate(token).await.map_err(|e| match e {
            AuthError::Internal(_) => e,
            _ => AuthError::unauthenticated("invalid or expired token"),
        })?;

        self.config.check_permission(method, &caller).inspect_err(|_| {
            tracing::info!(user_id = %caller.user_id, method, "permission denied");
        })?;

        Ok(Some(caller))
    }
}

/// The token from an `authorization` value, with an optional `Bearer ` prefix.
pub fn bearer_token(value: &str) -> Option<&str> {
    let value = value.trim();
    let token = value.strip_prefix("Bearer ").unwrap_or(value).trim();
    (!token.is_empty()).then_some(token)
}

/// axum middleware wrapping [`Interceptor::authorize`]; the request path is
/// the method name.
pub async fn intercept(
    State(interceptor): State<Arc<Interceptor>>,
    mut req: Request,
    next: Next,
) -> Response {
    let method = req.uri().path().to_string();
    match interceptor.authorize(&method, req.headers()).await {
        Ok(Some(caller)) => {
            req.extensions_mut().insert(caller);
            next.run(req).await
        }
        Ok(None) => next.run(req).await,
        Err(e) => e.into_response(),
    }
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| AuthError::unauthenticated("missing caller identity"))
    }
}

/// Lets public handlers take `Option<AuthenticatedUser>`.
impl<S> OptionalFromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Option<Self>, Self::Rejection> {
        Ok(parts.extensions.get::<AuthenticatedUser>().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use chrono::Utc;
    use uuid::Uuid;

    const LIST: &str = "/auth.AuthService/ListUsers";
    const OPEN: &str = "/auth.AuthService/Login";
    const WHOAMI: &str = "/auth.AuthService/ListSessions";

    fn caller(roles: &[&str], permissions: &[&str]) -> AuthenticatedUser {
        AuthenticatedUser {
            user_id: Uuid::new_v4(),
            email: "ada@example.com".into(),
            name: "Ada".into(),
            tenant_id: Uuid::new_v4(),
            org_id: None,
            roles: roles.iter().map(|r| r.to_string()).collect(),
            permissions: permissions.iter().map(|p| p.to_string()).collect(),
            expires_at: Utc::now(),
        }
    }

    fn config() -> InterceptorConfig {
        InterceptorConfig::new()
            .public_method(OPEN)
            .require_any(LIST, &["view-users", "manage-users"])
            .super_roles(["SUPER_ADMIN"])
    }

    struct StaticValidator(Option<AuthenticatedUser>);

    #[async_trait]
    impl TokenValidator for StaticValidator {
        async fn validate(&self, token: &str) -> AuthResult<AuthenticatedUser> {
            match (&self.0, token) {
                (Some(user), "good") => Ok(user.clone()),
                _ => Err(AuthError::unauthenticated("session not found")),
            }
        }
    }

    fn headers(value: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        h
    }

    #[test]
    fn any_listed_permission_is_enough() {
        let cfg = config();
        assert!(cfg.check_permission(LIST, &caller(&[], &["manage-users"])).is_ok());
        assert!(matches!(
            cfg.check_permission(LIST, &caller(&["MANAGER"], &["edit-users"])),
            Err(AuthError::PermissionDenied(_))
        ));
    }

    #[test]
    fn super_role_bypasses_the_permission_map() {
        assert!(config().check_permission(LIST, &caller(&["SUPER_ADMIN"], &[])).is_ok());
    }

    #[test]
    fn unmapped_methods_need_no_permission() {
        assert!(config().check_permission(WHOAMI, &caller(&[], &[])).is_ok());
    }

    #[test]
    fn bearer_prefix_is_optional() {
        assert_eq!(bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(bearer_token("abc"), Some("abc"));
        assert_eq!(bearer_token("Bearer "), None);
        assert_eq!(bearer_token(""), None);
    }

    #[tokio::test]
    async fn public_methods_skip_validation() {
        let interceptor = Interceptor::new(config(), Arc::new(StaticValidator(None)));
        let res = interceptor.authorize(OPEN, &HeaderMap::new()).await.unwrap();
        assert!(res.is_none());
    }

    #[tokio::test]
    async fn public_methods_carry_a_valid_identity_and_ignore_bad_tokens() {
        let user = caller(&["SUPER_ADMIN"], &[]);
        let interceptor = Interceptor::new(config(), Arc::new(StaticValidator(Some(user.clone()))));

        let got = interceptor.authorize(OPEN, &headers("Bearer good")).await.unwrap();
        assert_eq!(got, Some(user));

        let got = interceptor.authorize(OPEN, &headers("Bearer bad")).await.unwrap();
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn missing_or_invalid_token_is_unauthenticated() {
        let interceptor = Interceptor::new(config(), Arc::new(StaticValidator(Some(caller(&[], &[])))));
        assert!(matches!(
            interceptor.authorize(WHOAMI, &HeaderMap::new()).await,
            Err(AuthError::Unauthenticated(_))
        ));
        assert!(matches!(
            interceptor.authorize(WHOAMI, &headers("Bearer bad")).await,
            Err(AuthError::Unauthenticated(_))
        ));
    }

    #[tokio::test]
    async fn valid_token_yields_the_identity() {
        let user = caller(&[], &["view-users"]);
        let interceptor = Interceptor::new(config(), Arc::new(StaticValidator(Some(user.clone()))));

        let got = interceptor.authorize(LIST, &headers("Bearer good")).await.unwrap();
        assert_eq!(got, Some(user));

        let got = interceptor.authorize(WHOAMI, &headers("good")).await.unwrap();
        assert!(got.is_some());
    }

    #[tokio::test]
    async fn valid_token_without_permission_is_denied() {
        let interceptor = Interceptor::new(config(), Arc::new(StaticValidator(Some(caller(&[], &[])))));
        assert!(matches!(
            interceptor.authorize(LIST, &headers("Bearer good")).await,
            Err(AuthError::PermissionDenied(_))
        ));
    }
}
