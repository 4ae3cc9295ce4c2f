//! `userhub-auth`: authentication and authorization core.
//!
//! Password hashing, signed session tokens and role/permission gates. This
//! crate is decoupled from HTTP and storage: identities are resolved through
//! the [`IdentityLookup`] contract implemented elsewhere.

pub mod claims;
pub mod guard;
pub mod identity;
pub mod password;
pub mod permissions;
pub mod roles;
pub mod token;

pub use claims::{ClaimsError, SessionClaims, validate_claims};
pub use guard::{AccessRequirement, Authorized, AuthzError, require_permission, require_role};
pub use identity::{Identity, IdentityLookup, LookupError};
pub use password::{CredentialVerifier, MAX_PASSWORD_BYTES, PasswordError};
pub use permissions::Permission;
pub use roles::{Role, RoleGrant};
pub use token::{TokenConfig, TokenError, TokenService, issue_token, validate_token};
