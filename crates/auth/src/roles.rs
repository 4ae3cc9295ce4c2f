use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::Permission;

/// The built-in role that owns every user-management permission.
pub const SUPERADMIN: Role = Role::from_static("superadmin");

/// Role name used for RBAC.
///
/// Role names are compared exactly (case-sensitive); `"Superadmin"` and
/// `"superadmin"` are different roles.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A role assignment as resolved by the identity store: the role together
/// with the permissions it currently bundles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleGrant {
    pub role: Role,
    pub permissions: Vec<Permission>,
}

impl RoleGrant {
    pub fn new(role: Role, permissions: Vec<Permission>) -> Self {
        Self { role, permissions }
    }

    pub fn grants(&self, permission: &Permission) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }
}
