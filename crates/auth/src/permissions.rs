use std::borrow::Cow;

use serde::{Deserialize, Serialize};

pub const CREATE_USER: Permission = Permission::from_static("create_user");
pub const EDIT_USER: Permission = Permission::from_static("edit_user");
pub const DELETE_USER: Permission = Permission::from_static("delete_user");
pub const VIEW_USER: Permission = Permission::from_static("view_user");

/// Every permission the user-management routes check, in seeding order.
pub fn user_management() -> Vec<Permission> {
    vec![CREATE_USER, EDIT_USER, DELETE_USER, VIEW_USER]
}

/// Permission identifier.
///
/// Permissions are atomic, opaque names (e.g. `"delete_user"`). There is no
/// wildcard: a permission is granted only when its exact name is present.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
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

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
