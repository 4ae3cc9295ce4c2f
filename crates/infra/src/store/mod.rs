//! Identity store: users, roles, permissions and their associations.
//!
//! The auth core only reads through [`IdentityLookup`]; the API's user
//! management routes use the wider [`IdentityStore`] contract.

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use userhub_auth::{Identity, IdentityLookup, LookupError, Permission, Role};
use userhub_core::UserId;

pub mod in_memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use in_memory::InMemoryIdentityStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresIdentityStore;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("not found")]
    NotFound,

    /// A uniqueness constraint was violated (e.g. username already taken).
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("unknown role '{0}'")]
    UnknownRole(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<StoreError> for LookupError {
    fn from(value: StoreError) -> Self {
        LookupError::new(value.to_string())
    }
}

/// Data for a new identity. The password must already be hashed.
#[derive(Clone, PartialEq, Eq)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
    /// Primary role; when set it is also assigned to the user.
    pub role: Option<Role>,
}

/// Partial update; `None` fields are left unchanged.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct UserUpdate {
    pub username: Option<String>,
    pub password_hash: Option<String>,
    /// Replaces the primary role (and its assignment).
    pub role: Option<Role>,
}

impl core::fmt::Debug for NewUser {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("NewUser")
            .field("username", &self.username)
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}

impl core::fmt::Debug for UserUpdate {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("UserUpdate")
            .field("username", &self.username)
            .field("password_changed", &self.password_hash.is_some())
            .field("role", &self.role)
            .finish()
    }
}

/// Listing filter. Results are ordered newest first; there is no paging.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct UserFilter {
    /// Exact username match.
    pub username: Option<String>,
}

/// Full read/write contract over stored identities.
#[async_trait]
pub trait IdentityStore: IdentityLookup {
    async fn list_users(&self, filter: UserFilter) -> Result<Vec<Identity>, StoreError>;

    /// Fails with `Conflict` when the username is taken and `UnknownRole` when
    /// `role` does not name a stored role.
    async fn create_user(&self, user: NewUser) -> Result<Identity, StoreError>;

    async fn update_user(&self, id: UserId, update: UserUpdate) -> Result<Identity, StoreError>;

    /// Hard delete; the username becomes available again.
    async fn delete_user(&self, id: UserId) -> Result<(), StoreError>;

    /// Create the role if needed and replace its permission set.
    async fn upsert_role(&self, role: Role, permissions: Vec<Permission>) -> Result<(), StoreError>;

    /// Idempotent.
    async fn assign_role(&self, id: UserId, role: Role) -> Result<(), StoreError>;

    /// Idempotent.
    async fn grant_permission(&self, id: UserId, permission: Permission) -> Result<(), StoreError>;
}
