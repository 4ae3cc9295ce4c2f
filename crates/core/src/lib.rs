//! `userhub-core`: shared identifiers and the domain error model.
//!
//! This crate has no infrastructure concerns; every other crate depends on it.

pub mod error;
pub mod id;

pub use error::DomainError;
pub use id::{PermissionId, RoleId, UserId};
