use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use userhub_core::UserId;

use crate::{Permission, Role, RoleGrant};

/// A user account as the auth core sees it.
///
/// `password_hash` is the stored bcrypt string. It is never serialized and is
/// redacted from `Debug` output.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: UserId,
    pub username: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    /// Primary role, snapshotted into issued tokens.
    pub role: Option<Role>,
    /// Many-to-many role assignments, each with its current permission set.
    pub roles: Vec<RoleGrant>,
    /// Permissions granted directly to this identity.
    pub permissions: Vec<Permission>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Identity {
    pub fn new(id: UserId, username: impl Into<String>, password_hash: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            username: username.into(),
            password_hash: password_hash.into(),
            role: None,
            roles: Vec::new(),
            permissions: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }

    pub fn with_role_grant(mut self, grant: RoleGrant) -> Self {
        self.roles.push(grant);
        self
    }

    pub fn with_permission(mut self, permission: Permission) -> Self {
        self.permissions.push(permission);
        self
    }

    /// Direct permissions plus those inherited through assigned roles.
    ///
    /// Roles do not nest: only one level of inheritance is followed.
    pub fn effective_permissions(&self) -> BTreeSet<Permission> {
        self.permissions
            .iter()
            .chain(self.roles.iter().flat_map(|grant| grant.permissions.iter()))
            .cloned()
            .collect()
    }

    pub fn has_permission(&self, permission: &Permission) -> bool {
        self.permissions.contains(permission) || self.roles.iter().any(|g| g.grants(permission))
    }
}

impl core::fmt::Debug for Identity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Identity")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("password_hash", &"<redacted>")
            .field("role", &self.role)
            .field("roles", &self.roles)
            .field("permissions", &self.permissions)
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

/// Storage failure while resolving an identity.
///
/// A missing identity is not an error; lookups return `Ok(None)` for that.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("identity lookup failed: {0}")]
pub struct LookupError(pub String);

impl LookupError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// The narrow read contract the auth core needs from an identity store.
#[async_trait]
pub trait IdentityLookup: Send + Sync {
    async fn lookup_by_username(&self, username: &str) -> Result<Option<Identity>, LookupError>;

    async fn lookup_by_id(&self, id: UserId) -> Result<Option<Identity>, LookupError>;
}

#[async_trait]
impl<L> IdentityLookup for std::sync::Arc<L>
where
    L: IdentityLookup + ?Sized,
{
    async fn lookup_by_username(&self, username: &str) -> Result<Option<Identity>, LookupError> {
        (**self).lookup_by_username(username).await
    }

    async fn lookup_by_id(&self, id: UserId) -> Result<Option<Identity>, LookupError> {
        (**self).lookup_by_id(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{permissions, roles};

    fn admin() -> Identity {
        Identity::new(UserId::new(), "superadmin@mail.com", "$2b$04$not-a-real-hash")
            .with_role(roles::SUPERADMIN)
            .with_role_grant(RoleGrant::new(
                roles::SUPERADMIN,
                vec![permissions::DELETE_USER, permissions::VIEW_USER],
            ))
            .with_permission(permissions::VIEW_USER)
            .with_permission(permissions::CREATE_USER)
    }

    #[test]
    fn effective_permissions_union_direct_and_role_grants() {
        let effective = admin().effective_permissions();
        let names: Vec<&str> = effective.iter().map(|p| p.as_str()).collect();
        assert_eq!(names, vec!["create_user", "delete_user", "view_user"]);
    }

    #[test]
    fn has_permission_checks_both_sources() {
        let identity = admin();
        assert!(identity.has_permission(&permissions::CREATE_USER));
        assert!(identity.has_permission(&permissions::DELETE_USER));
        assert!(!identity.has_permission(&permissions::EDIT_USER));
    }

    #[test]
    fn serialization_omits_password_hash() {
        let json = serde_json::to_value(admin()).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["username"], "superadmin@mail.com");
        assert_eq!(json["role"], "superadmin");
    }

    #[test]
    fn debug_redacts_password_hash() {
        let rendered = format!("{:?}", admin());
        assert!(!rendered.contains("not-a-real-hash"));
        assert!(rendered.contains("<redacted>"));
    }
}
