use uuid::Uuid;

use super::{login_response, AuthService};
use crate::error::{AuthError, AuthResult};
use crate::models::{
    auth::AuthenticatedUser,
    user::{LoginResponse, UserCredential},
};

/// How a caller names the organization to switch into.
#[derive(Debug, Clone)]
pub enum OrgTarget {
    Id(Uuid),
    /// Matched case-insensitively against the caller's memberships.
    Name(String),
}

impl AuthService {
    // ─── Switch organization ─────────────────────────────────────────────────

    /// Moves the caller into another organization of their tenant. Every
    /// existing session ends and a fresh pair carrying the new organization
    /// is issued.
    pub async fn switch_organization(&self, caller: &AuthenticatedUser, target: OrgTarget) -> AuthResult<LoginResponse> {
        let user = self
            .stores
            .credentials
            .find_by_id(caller.user_id)
            .await?
            .filter(|u| u.tenant_id == caller.tenant_id)
            .ok_or_else(|| AuthError::unauthenticated("user no longer exists"))?;

        let memberships = self.stores.organizations.memberships(user.id).await?;
        let membership = memberships
            .into_iter()
            .find(|m| match &target {
                OrgTarget::Id(id) => m.org_id == *id,
                OrgTarget::Name(name) => m.name.eq_ignore_ascii_case(name.trim()),
            })
            .ok_or_else(|| AuthError::NotFound("organization not found".into()))?;

        if membership.tenant_id != user.tenant_id {
            tracing::warn!(user_id = %user.id, org_id = %membership.org_id, "organization belongs to another tenant");
            return Err(AuthError::PermissionDenied(
                "organization belongs to another tenant".into(),
            ));
        }
        if caller.org_id == Some(membership.org_id) {
            return Err(AuthError::invalid_input("already in this organization"));
        }

        let ended = self.invalidate_all_sessions(user.id).await;

        let org_id = Some(membership.org_id);
        let grants = self.stores.credentials.grants(user.id).await?;
        let pair = self.issue_pair(&user, org_id, &grants)?;
        self.stores
            .refresh_tokens
            .create(self.refresh_record(user.id, &pair.refresh))
            .await?;
        self.start_session(user.id, &pair.access).await?;

        tracing::info!(
            user_id = %user.id,
            org_id = %membership.org_id,
            sessions = ended,
            "switched organization"
        );
        Ok(login_response(&user, org_id, grants, pair))
    }

    /// An organization claim is only issued to members of that organization
    /// inside the user's own tenant.
    pub(super) async fn resolve_org(&self, user: &UserCredential, org_id: Option<Uuid>) -> AuthResult<Option<Uuid>> {
        let Some(org_id) = org_id else {
            return Ok(None);
        };
        let member = self
            .stores
            .organizations
            .memberships(user.id)
            .await?
            .iter()
            .any(|m| m.org_id == org_id && m.tenant_id == user.tenant_id);
        if !member {
            tracing::info!(user_id = %user.id, org_id = %org_id, "organization claim refused: not a member");
            return Err(AuthError::PermissionDenied(
                "not a member of this organization".into(),
            ));
        }
        Ok(Some(org_id))
    }
}
