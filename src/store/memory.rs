//! In-memory stores for tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{
    CredentialStore, OrganizationDirectory, PasswordMirror, RefreshTokenStore, ResetStore, SessionStore,
    VerificationStore,
};
use crate::error::{AuthError, AuthResult};
use crate::models::{
    session::{EmailVerificationToken, PasswordReset, RefreshToken, ResetKind, Session},
    user::{ClientInfo, Grants, Membership, NewCredential, UserCredential},
};

// ─── Credentials ─────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryCredentials {
    users: Mutex<HashMap<Uuid, UserCredential>>,
    // (tenant, role) -> permissions
    roles: Mutex<HashMap<(Uuid, String), Vec<String>>>,
    user_roles: Mutex<HashMap<Uuid, Vec<(Uuid, String)>>>,
    pub last_login_client: Mutex<Option<ClientInfo>>,
}

impl MemoryCredentials {
    pub fn define_role(&self, tenant_id: Uuid, name: &str, permissions: &[&str]) {
        self.roles.lock().unwrap().insert(
            (tenant_id, name.to_string()),
            permissions.iter().map(|p| p.to_string()).collect(),
        );
    }

    pub fn password_hash(&self, user_id: Uuid) -> Option<String> {
        self.users
            .lock()
            .unwrap()
            .get(&user_id)
            .map(|u| u.password_hash.clone())
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentials {
    async fn ping(&self) -> AuthResult<()> {
        Ok(())
    }

    async fn create(&self, new: NewCredential) -> AuthResult<UserCredential> {
        let mut users = self.users.lock().unwrap();
        if users
            .values()
            .any(|u| u.tenant_id == new.tenant_id && u.email == new.email)
        {
            return Err(AuthError::Conflict("email already registered".into()));
        }
        let user = UserCredential {
            id: new.id,
            tenant_id: new.tenant_id,
            email: new.email,
            name: new.name,
            password_hash: new.password_hash,
            email_verified_at: None,
            last_login_at: None,
            last_login_ip: None,
            created_at: new.created_at,
            updated_at: new.created_at,
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_by_email(&self, tenant_id: Uuid, email: &str) -> AuthResult<Option<UserCredential>> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .values()
            .find(|u| u.tenant_id == tenant_id && u.email == email)
            .cloned())
    }

    async fn find_by_email_global(&self, email: &str) -> AuthResult<Vec<UserCredential>> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .values()
            .filter(|u| u.email == email)
            .cloned()
            .collect())
    }

    async fn find_by_id(&self, user_id: Uuid) -> AuthResult<Option<UserCredential>> {
        Ok(self.users.lock().unwrap().get(&user_id).cloned())
    }

    async fn update_password(&self, user_id: Uuid, password_hash: &str, at: DateTime<Utc>) -> AuthResult<()> {
        let mut users = self.users.lock().unwrap();
        let user = users
            .get_mut(&user_id)
            .ok_or_else(|| AuthError::NotFound("user not found".into()))?;
        user.password_hash = password_hash.to_string();
        user.updated_at = at;
        Ok(())
    }

    async fn update_last_login(&self, user_id: Uuid, at: DateTime<Utc>, client: &ClientInfo) -> AuthResult<()> {
        if let Some(user) = self.users.lock().unwrap().get_mut(&user_id) {
            user.last_login_at = Some(at);
            user.last_login_ip = client.ip.clone();
        }
        *self.last_login_client.lock().unwrap() = Some(client.clone());
        Ok(())
    }

    async fn mark_email_verified(&self, user_id: Uuid, at: DateTime<Utc>) -> AuthResult<()> {
        let mut users = self.users.lock().unwrap();
        let user = users
            .get_mut(&user_id)
            .ok_or_else(|| AuthError::NotFound("user not found".into()))?;
        user.email_verified_at = Some(at);
        Ok(())
    }

    async fn missing_roles(&self, tenant_id: Uuid, roles: &[String]) -> AuthResult<Vec<String>> {
        let defined = self.roles.lock().unwrap();
        Ok(roles
            .iter()
            .filter(|r| !defined.contains_key(&(tenant_id, r.to_string())))
            .cloned()
            .collect())
    }

    async fn assign_roles(&self, user_id: Uuid, tenant_id: Uuid, roles: &[String]) -> AuthResult<()> {
        let mut grants = self.user_roles.lock().unwrap();
        let entry = grants.entry(user_id).or_default();
        for role in roles {
            if !entry.iter().any(|(t, r)| *t == tenant_id && r == role) {
                entry.push((tenant_id, role.clone()));
            }
        }
        Ok(())
    }

    async fn grants(&self, user_id: Uuid) -> AuthResult<Grants> {
        let assigned = self
            .user_roles
            .lock()
            .unwrap()
            .get(&user_id)
            .cloned()
            .unwrap_or_default();
        let defined = self.roles.lock().unwrap();
        Ok(Grants::from_roles(assigned.into_iter().map(|(tenant, role)| {
            let perms = defined.get(&(tenant, role.clone())).cloned().unwrap_or_default();
            (role, perms)
        })))
    }
}

// ─── Sessions ────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemorySessions {
    rows: Mutex<HashMap<Uuid, Session>>,
    failing_deletes: Mutex<HashSet<Uuid>>,
}

impl MemorySessions {
    /// Makes `delete` fail for this session id.
    pub fn fail_delete_of(&self, id: Uuid) {
        self.failing_deletes.lock().unwrap().insert(id);
    }

    pub fn count_for(&self, user_id: Uuid) -> usize {
        self.rows
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.user_id == user_id)
            .count()
    }
}

#[async_trait]
impl SessionStore for MemorySessions {
    async fn create(&self, session: Session) -> AuthResult<Session> {
        self.rows.lock().unwrap().insert(session.id, session.clone());
        Ok(session)
    }

    async fn get_by_token(&self, token_hash: &str) -> AuthResult<Option<Session>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .find(|s| s.token_hash == token_hash)
            .cloned())
    }

    async fn get_by_id(&self, id: Uuid) -> AuthResult<Option<Session>> {
        Ok(self.rows.lock().unwrap().get(&id).cloned())
    }

    async fn list_by_user(&self, user_id: Uuid) -> AuthResult<Vec<Session>> {
        let mut sessions: Vec<Session> = self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        sessions.sort_by_key(|s| s.created_at);
        Ok(sessions)
    }

    async fn delete(&self, id: Uuid) -> AuthResult<bool> {
        if self.failing_deletes.lock().unwrap().contains(&id) {
            return Err(AuthError::internal("injected delete failure"));
        }
        Ok(self.rows.lock().unwrap().remove(&id).is_some())
    }
}

// ─── Refresh tokens ──────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryRefreshTokens {
    rows: Mutex<HashMap<String, RefreshToken>>,
}

impl MemoryRefreshTokens {
    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }
}

#[async_trait]
impl RefreshTokenStore for MemoryRefreshTokens {
    async fn create(&self, token: RefreshToken) -> AuthResult<()> {
        self.rows
            .lock()
            .unwrap()
            .insert(token.token_hash.clone(), token);
        Ok(())
    }

    async fn owner_of(&self, token_hash: &str, now: DateTime<Utc>) -> AuthResult<Option<Uuid>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .get(token_hash)
            .filter(|t| t.expires_at > now)
            .map(|t| t.user_id))
    }

    async fn delete(&self, token_hash: &str) -> AuthResult<bool> {
        Ok(self.rows.lock().unwrap().remove(token_hash).is_some())
    }

    async fn rotate(&self, old_hash: &str, replacement: RefreshToken) -> AuthResult<bool> {
        let mut rows = self.rows.lock().unwrap();
        if rows.remove(old_hash).is_none() {
            return Ok(false);
        }
        rows.insert(replacement.token_hash.clone(), replacement);
        Ok(true)
    }

    async fn delete_all_by_user(&self, user_id: Uuid) -> AuthResult<u64> {
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|_, t| t.user_id != user_id);
        Ok((before - rows.len()) as u64)
    }
}

// ─── Password resets ─────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryResets {
    rows: Mutex<HashMap<Uuid, PasswordReset>>,
}

impl MemoryResets {
    pub fn latest_otp(&self, user_id: Uuid) -> Option<String> {
        self.rows
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.user_id == user_id && r.kind == ResetKind::Otp)
            .max_by_key(|r| r.created_at)
            .and_then(|r| r.otp.clone())
    }

    pub fn latest_link(&self, user_id: Uuid) -> Option<Uuid> {
        self.rows
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.user_id == user_id && r.kind == ResetKind::Link)
            .max_by_key(|r| r.created_at)
            .and_then(|r| r.token)
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    fn insert(&self, record: PasswordReset) -> PasswordReset {
        self.rows.lock().unwrap().insert(record.id, record.clone());
        record
    }
}

#[async_trait]
impl ResetStore for MemoryResets {
    async fn create_link(
        &self,
        user_id: Uuid,
        token: Uuid,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AuthResult<PasswordReset> {
        Ok(self.insert(PasswordReset {
            id: Uuid::new_v4(),
            user_id,
            kind: ResetKind::Link,
            token: Some(token),
            otp: None,
            expires_at,
            created_at: now,
            used: false,
        }))
    }

    async fn create_otp(
        &self,
        user_id: Uuid,
        otp: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AuthResult<PasswordReset> {
        Ok(self.insert(PasswordReset {
            id: Uuid::new_v4(),
            user_id,
            kind: ResetKind::Otp,
            token: None,
            otp: Some(otp.to_string()),
            expires_at,
            created_at: now,
            used: false,
        }))
    }

    async fn get_by_token(&self, token: Uuid) -> AuthResult<Option<PasswordReset>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .find(|r| r.token == Some(token))
            .cloned())
    }

    async fn find_active_otp(
        &self,
        user_id: Uuid,
        otp: &str,
        now: DateTime<Utc>,
    ) -> AuthResult<Option<PasswordReset>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|r| {
                r.user_id == user_id
                    && r.kind == ResetKind::Otp
                    && r.otp.as_deref() == Some(otp)
                    && r.is_usable(now)
            })
            .max_by_key(|r| r.created_at)
            .cloned())
    }

    async fn claim(&self, id: Uuid) -> AuthResult<bool> {
        let mut rows = self.rows.lock().unwrap();
        match rows.get_mut(&id) {
            Some(r) if !r.used => {
                r.used = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete(&self, id: Uuid) -> AuthResult<()> {
        self.rows.lock().unwrap().remove(&id);
        Ok(())
    }
}

// ─── Email verification ──────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryVerifications {
    rows: Mutex<HashMap<Uuid, EmailVerificationToken>>,
}

impl MemoryVerifications {
    pub fn token_for(&self, user_id: Uuid) -> Option<Uuid> {
        self.rows.lock().unwrap().get(&user_id).map(|t| t.token)
    }
}

#[async_trait]
impl VerificationStore for MemoryVerifications {
    async fn create(
        &self,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AuthResult<EmailVerificationToken> {
        let token = EmailVerificationToken {
            token: Uuid::new_v4(),
            user_id,
            expires_at,
            created_at: now,
        };
        // keyed by user: inserting replaces any earlier token
        self.rows.lock().unwrap().insert(user_id, token.clone());
        Ok(token)
    }

    async fn find(&self, user_id: Uuid, token: Uuid) -> AuthResult<Option<EmailVerificationToken>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .get(&user_id)
            .filter(|t| t.token == token)
            .cloned())
    }

    async fn delete_for_user(&self, user_id: Uuid) -> AuthResult<()> {
        self.rows.lock().unwrap().remove(&user_id);
        Ok(())
    }
}

// ─── Organizations ───────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryOrganizations {
    members: Mutex<HashMap<Uuid, Vec<Membership>>>,
}

impl MemoryOrganizations {
    /// Adds `user_id` to the organization, creating it on first use.
    pub fn add_member(&self, user_id: Uuid, tenant_id: Uuid, org_id: Uuid, name: &str) {
        self.members.lock().unwrap().entry(user_id).or_default().push(Membership {
            org_id,
            tenant_id,
            name: name.to_string(),
        });
    }
}

#[async_trait]
impl OrganizationDirectory for MemoryOrganizations {
    async fn memberships(&self, user_id: Uuid) -> AuthResult<Vec<Membership>> {
        Ok(self
            .members
            .lock()
            .unwrap()
            .get(&user_id)
            .cloned()
            .unwrap_or_default())
    }
}

// ─── Mirrors ─────────────────────────────────────────────────────────────────

/// Records propagated hashes, or fails every call when built with `failing`.
pub struct MemoryMirror {
    name: &'static str,
    fail: bool,
    pub updates: Mutex<Vec<(String, String)>>,
}

impl MemoryMirror {
    pub fn new(name: &'static str) -> Self {
        Self { name, fail: false, updates: Mutex::default() }
    }

    pub fn failing(name: &'static str) -> Self {
        Self { name, fail: true, updates: Mutex::default() }
    }
}

#[async_trait]
impl PasswordMirror for MemoryMirror {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn propagate(&self, email: &str, password_hash: &str) -> anyhow::Result<u64> {
        if self.fail {
            anyhow::bail!("{} unavailable", self.name);
        }
        self.updates
            .lock()
            .unwrap()
            .push((email.to_string(), password_hash.to_string()));
        Ok(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn session(user_id: Uuid, hash: &str) -> Session {
        let now = Utc::now();
        Session {
            id: Uuid::new_v4(),
            user_id,
            token_hash: hash.into(),
            created_at: now,
            expires_at: now + Duration::hours(2),
        }
    }

    #[tokio::test]
    async fn delete_all_by_user_continues_past_failed_rows() {
        let store = MemorySessions::default();
        let user = Uuid::new_v4();
        let other = Uuid::new_v4();
        let a = store.create(session(user, "a")).await.unwrap();
        store.create(session(user, "b")).await.unwrap();
        store.create(session(user, "c")).await.unwrap();
        store.create(session(other, "d")).await.unwrap();
        store.fail_delete_of(a.id);

        let deleted = store.delete_all_by_user(user).await.unwrap();

        assert_eq!(deleted, 2);
        assert_eq!(store.count_for(user), 1);
        assert_eq!(store.count_for(other), 1);
    }

    #[tokio::test]
    async fn rotate_refuses_a_missing_token() {
        let store = MemoryRefreshTokens::default();
        let user = Uuid::new_v4();
        let now = Utc::now();
        let token = |hash: &str| RefreshToken {
            token_hash: hash.into(),
            user_id: user,
            expires_at: now + Duration::days(7),
            created_at: now,
        };
        store.create(token("old")).await.unwrap();

        assert!(store.rotate("old", token("new")).await.unwrap());
        assert!(!store.rotate("old", token("newer")).await.unwrap());
        assert_eq!(store.owner_of("new", now).await.unwrap(), Some(user));
        assert_eq!(store.owner_of("newer", now).await.unwrap(), None);
    }

    #[tokio::test]
    async fn new_verification_token_replaces_the_previous_one() {
        let store = MemoryVerifications::default();
        let user = Uuid::new_v4();
        let now = Utc::now();
        let first = store.create(user, now + Duration::hours(24), now).await.unwrap();
        let second = store.create(user, now + Duration::hours(24), now).await.unwrap();

        assert!(store.find(user, first.token).await.unwrap().is_none());
        assert!(store.find(user, second.token).await.unwrap().is_some());
    }
}
