use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

use crate::clock::Clock;
use crate::models::auth::{Claims, RefreshClaims, TokenSubject};
use crate::models::user::Grants;

#[derive(Debug, Error, PartialEq)]
pub enum TokenError {
    /// Bad signature, wrong algorithm, malformed, expired or not yet valid.
    /// Deliberately one variant.
    #[error("invalid token")]
    Invalid,
    #[error("failed to sign token: {0}")]
    Signing(String),
}

/// A signed token and its absolute expiry.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Stateless HS256 signer/verifier. Access and refresh tokens use separate keys.
pub struct TokenService {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    issuer: String,
    clock: Arc<dyn Clock>,
}

impl TokenService {
    pub fn new(access_secret: &str, refresh_secret: &str, issuer: &str, clock: Arc<dyn Clock>) -> Self {
        Self {
            access_encoding: EncodingKey::from_secret(access_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(access_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(refresh_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(refresh_secret.as_bytes()),
            issuer: issuer.to_string(),
            clock,
        }
    }

    pub fn issue_access_token(
        &self,
        subject: &TokenSubject,
        grants: &Grants,
        ttl: Duration,
    ) -> Result<IssuedToken, TokenError> {
        let now = self.clock.now();
        let expires_at = now + ttl;
        let claims = Claims {
            user_id: subject.user_id.to_string(),
            email: subject.email.clone(),
            name: subject.name.clone(),
            tenant_id: subject.tenant_id.to_string(),
            org_id: subject.org_id.map(|id| id.to_string()),
            roles: grants.roles.clone(),
            permissions: grants.permissions.clone(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            nbf: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
            iss: self.issuer.clone(),
            sub: subject.user_id.to_string(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.access_encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))?;
        Ok(IssuedToken { token, expires_at })
    }

    pub fn issue_refresh_token(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
        ttl: Duration,
    ) -> Result<IssuedToken, TokenError> {
        let now = self.clock.now();
        let expires_at = now + ttl;
        let claims = RefreshClaims {
            sub: user_id.to_string(),
            tenant_id: tenant_id.to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            nbf: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
            iss: self.issuer.clone(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.refresh_encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))?;
        Ok(IssuedToken { token, expires_at })
    }

    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let claims: Claims = self.decode_with(token, &self.access_decoding)?;
        self.check_window(claims.nbf, claims.exp)?;
        Ok(claims)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, TokenError> {
        let claims: RefreshClaims = self.decode_with(token, &self.refresh_decoding)?;
        self.check_window(claims.nbf, claims.exp)?;
        Ok(claims)
    }

    fn decode_with<T: DeserializeOwned>(&self, token: &str, key: &DecodingKey) -> Result<T, TokenError> {
        // Only HS256 is accepted; alg=none and asymmetric headers fail here.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "nbf", "iss"]);

        decode::<T>(token, key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!("token rejected: {e}");
                TokenError::Invalid
            })
    }

    /// Expiry and not-before against our clock, whatever the library decided.
    fn check_window(&self, nbf: i64, exp: i64) -> Result<(), TokenError> {
        let now = self.clock.now().timestamp();
        if exp <= now || nbf > now {
            return Err(TokenError::Invalid);
        }
        Ok(())
    }
}

/// Converts an `exp`-style epoch into a timestamp.
pub fn epoch_to_datetime(secs: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0).single()
}

/// SHA-256 hex digest under which a token is persisted.
pub fn token_digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}
