use crate::error::{AuthError, AuthResult};

pub const MIN_PASSWORD_LEN: usize = 8;

/// bcrypt hasher with a configurable cost (12 in production).
#[derive(Debug, Clone)]
pub struct PasswordHasher {
    cost: u32,
    /// Hash at the same cost, checked when no account matches.
    dummy_hash: Option<String>,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new(12)
    }
}

impl PasswordHasher {
    pub fn new(cost: u32) -> Self {
        let dummy_hash = match bcrypt::hash("identity-core-dummy-password", cost) {
            Ok(hash) => Some(hash),
            Err(e) => {
                tracing::warn!(cost, "could not build dummy password hash: {e}");
                None
            }
        };
        Self { cost, dummy_hash }
    }

    pub fn hash(&self, password: &str) -> AuthResult<String> {
        Ok(bcrypt::hash(password, self.cost)?)
    }

    /// `false` for a wrong password. A malformed stored hash is treated the
    /// same way and logged.
    pub fn verify(&self, password: &str, hash: &str) -> bool {
        match bcrypt::verify(password, hash) {
            Ok(ok) => ok,
            Err(e) => {
                tracing::warn!("stored password hash could not be verified: {e}");
                false
            }
        }
    }

    /// Does the bcrypt work of `verify` for an email with no account, so
    /// both login failures take the same time. Always `false`.
    pub fn verify_missing(&self, password: &str) -> bool {
        if let Some(hash) = &self.dummy_hash {
            let _ = bcrypt::verify(password, hash);
        }
        false
    }
}

/// At least 8 characters with an uppercase letter, a lowercase letter, a
/// digit and a special character.
pub fn validate_strength(password: &str) -> AuthResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::invalid_input(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters long"
        )));
    }

    let mut upper = false;
    let mut lower = false;
    let mut digit = false;
    let mut special = false;
    for c in password.chars() {
        if c.is_uppercase() {
            upper = true;
        } else if c.is_lowercase() {
            lower = true;
        } else if c.is_ascii_digit() {
            digit = true;
        } else if !c.is_whitespace() {
            special = true;
        }
    }

    if !(upper && lower && digit && special) {
        return Err(AuthError::invalid_input(
            "password must contain uppercase, lowercase, digit and special character",
        ));
    }
    Ok(())
}

/// Minimal structural check: one `@`, non-empty local part, dotted domain.
pub fn validate_email(email: &str) -> AuthResult<()> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if !valid {
        return Err(AuthError::invalid_input("invalid email format"));
    }
    Ok(())
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
