//! Role and permission gates for authenticated requests.
//!
//! - No mutation of stored state
//! - No panics
//! - Role check is a pure comparison against the token claims; the permission
//!   check resolves the identity's current permissions through `IdentityLookup`.

use thiserror::Error;

use crate::{Identity, IdentityLookup, LookupError, Permission, Role, SessionClaims};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    /// Authenticated, but the role or permission requirement is not met.
    /// The payload names the missing requirement for internal logging only.
    #[error("forbidden")]
    Forbidden(String),

    /// The token's subject no longer resolves to an identity.
    #[error("forbidden")]
    IdentityNotFound,

    #[error(transparent)]
    Lookup(#[from] LookupError),
}

/// Allow iff the claims carry exactly `required` as their role.
pub fn require_role(claims: &SessionClaims, required: &Role) -> Result<(), AuthzError> {
    match &claims.role {
        Some(role) if role == required => Ok(()),
        _ => Err(AuthzError::Forbidden(format!("role '{required}'"))),
    }
}

/// Allow iff the identity behind `claims` currently holds `required`,
/// directly or through one of its roles.
///
/// On success the freshly resolved identity is returned so callers can attach
/// it to the request context.
pub async fn require_permission(
    claims: &SessionClaims,
    required: &Permission,
    lookup: &dyn IdentityLookup,
) -> Result<Identity, AuthzError> {
    let identity = lookup
        .lookup_by_id(claims.sub)
        .await?
        .ok_or(AuthzError::IdentityNotFound)?;

    if identity.has_permission(required) {
        Ok(identity)
    } else {
        Err(AuthzError::Forbidden(format!("permission '{required}'")))
    }
}

/// What a route demands of its caller. Both parts are optional; when both are
/// set, both must pass and the role is checked first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessRequirement {
    pub role: Option<Role>,
    pub permission: Option<Permission>,
}

/// Outcome of a successful [`AccessRequirement::check`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authorized {
    /// Present when a permission gate resolved the identity from the store.
    pub identity: Option<Identity>,
}

impl AccessRequirement {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn role(role: Role) -> Self {
        Self {
            role: Some(role),
            permission: None,
        }
    }

    pub fn permission(permission: Permission) -> Self {
        Self {
            role: None,
            permission: Some(permission),
        }
    }

    pub fn and_permission(mut self, permission: Permission) -> Self {
        self.permission = Some(permission);
        self
    }

    pub async fn check(
        &self,
        claims: &SessionClaims,
        lookup: &dyn IdentityLookup,
    ) -> Result<Authorized, AuthzError> {
        if let Some(role) = &self.role {
            require_role(claims, role)?;
        }

        let identity = match &self.permission {
            Some(permission) => Some(require_permission(claims, permission, lookup).await?),
            None => None,
        };

        Ok(Authorized { identity })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::{Duration, Utc};

    use userhub_core::UserId;

    use super::*;
    use crate::{RoleGrant, permissions, roles};

    #[derive(Default)]
    struct FakeLookup {
        by_id: HashMap<UserId, Identity>,
        calls: AtomicUsize,
    }

    impl FakeLookup {
        fn with(identity: Identity) -> Self {
            let mut by_id = HashMap::new();
            by_id.insert(identity.id, identity);
            Self {
                by_id,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl IdentityLookup for FakeLookup {
        async fn lookup_by_username(&self, username: &str) -> Result<Option<Identity>, LookupError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.by_id.values().find(|i| i.username == username).cloned())
        }

        async fn lookup_by_id(&self, id: UserId) -> Result<Option<Identity>, LookupError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.by_id.get(&id).cloned())
        }
    }

    struct BrokenLookup;

    #[async_trait]
    impl IdentityLookup for BrokenLookup {
        async fn lookup_by_username(&self, _: &str) -> Result<Option<Identity>, LookupError> {
            Err(LookupError::new("connection refused"))
        }

        async fn lookup_by_id(&self, _: UserId) -> Result<Option<Identity>, LookupError> {
            Err(LookupError::new("connection refused"))
        }
    }

    fn claims_for(identity: &Identity) -> SessionClaims {
        SessionClaims::for_identity(identity, Utc::now(), Duration::hours(1)).unwrap()
    }

    fn viewer() -> Identity {
        Identity::new(UserId::new(), "viewer@mail.com", "hash")
            .with_role(Role::new("viewer"))
            .with_role_grant(RoleGrant::new(
                Role::new("viewer"),
                vec![permissions::VIEW_USER],
            ))
    }

    #[test]
    fn require_role_is_exact() {
        let admin = Identity::new(UserId::new(), "a@mail.com", "h").with_role(Role::new("admin"));
        let superadmin =
            Identity::new(UserId::new(), "s@mail.com", "h").with_role(roles::SUPERADMIN);
        let shouting =
            Identity::new(UserId::new(), "x@mail.com", "h").with_role(Role::new("SUPERADMIN"));
        let roleless = Identity::new(UserId::new(), "n@mail.com", "h");

        assert!(matches!(
            require_role(&claims_for(&admin), &roles::SUPERADMIN),
            Err(AuthzError::Forbidden(_))
        ));
        assert_eq!(require_role(&claims_for(&superadmin), &roles::SUPERADMIN), Ok(()));
        assert!(require_role(&claims_for(&shouting), &roles::SUPERADMIN).is_err());
        assert!(require_role(&claims_for(&roleless), &roles::SUPERADMIN).is_err());
    }

    #[test]
    fn denial_displays_generic_reason() {
        let err = AuthzError::Forbidden("permission 'delete_user'".into());
        assert_eq!(err.to_string(), "forbidden");
    }

    #[tokio::test]
    async fn permission_inherited_through_role_is_allowed() {
        let identity = viewer();
        let lookup = FakeLookup::with(identity.clone());

        let resolved = require_permission(&claims_for(&identity), &permissions::VIEW_USER, &lookup)
            .await
            .unwrap();
        assert_eq!(resolved.id, identity.id);
    }

    #[tokio::test]
    async fn direct_permission_is_allowed() {
        let identity = Identity::new(UserId::new(), "d@mail.com", "h")
            .with_permission(permissions::EDIT_USER);
        let lookup = FakeLookup::with(identity.clone());

        assert!(
            require_permission(&claims_for(&identity), &permissions::EDIT_USER, &lookup)
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn missing_permission_is_denied() {
        let identity = viewer();
        let lookup = FakeLookup::with(identity.clone());

        let err = require_permission(&claims_for(&identity), &permissions::DELETE_USER, &lookup)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthzError::Forbidden(reason) if reason.contains("delete_user")));
    }

    #[tokio::test]
    async fn permission_check_uses_current_store_state() {
        // The token was issued while the identity still held delete_user.
        let before = viewer().with_permission(permissions::DELETE_USER);
        let claims = claims_for(&before);
        assert!(claims.has_permission(&permissions::DELETE_USER));

        let mut after = before.clone();
        after.permissions.clear();
        let lookup = FakeLookup::with(after);

        assert!(
            require_permission(&claims, &permissions::DELETE_USER, &lookup)
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn unknown_subject_is_denied() {
        let lookup = FakeLookup::default();
        let err = require_permission(&claims_for(&viewer()), &permissions::VIEW_USER, &lookup)
            .await
            .unwrap_err();
        assert_eq!(err, AuthzError::IdentityNotFound);
    }

    #[tokio::test]
    async fn lookup_failure_is_propagated() {
        let err = require_permission(&claims_for(&viewer()), &permissions::VIEW_USER, &BrokenLookup)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthzError::Lookup(_)));
    }

    #[tokio::test]
    async fn combined_requirement_checks_role_first() {
        let identity = viewer();
        let lookup = FakeLookup::with(identity.clone());
        let requirement =
            AccessRequirement::role(roles::SUPERADMIN).and_permission(permissions::VIEW_USER);

        let err = requirement
            .check(&claims_for(&identity), &lookup)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthzError::Forbidden(reason) if reason.contains("superadmin")));
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn combined_requirement_needs_both() {
        let identity = Identity::new(UserId::new(), "s@mail.com", "h").with_role(roles::SUPERADMIN);
        let lookup = FakeLookup::with(identity.clone());
        let claims = claims_for(&identity);

        let requirement =
            AccessRequirement::role(roles::SUPERADMIN).and_permission(permissions::DELETE_USER);
        assert!(requirement.check(&claims, &lookup).await.is_err());

        let granted = identity.with_permission(permissions::DELETE_USER);
        let lookup = FakeLookup::with(granted);
        let authorized = requirement.check(&claims, &lookup).await.unwrap();
        assert!(authorized.identity.is_some());
    }

    #[tokio::test]
    async fn empty_requirement_allows_without_lookup() {
        let lookup = FakeLookup::default();
        let authorized = AccessRequirement::none()
            .check(&claims_for(&viewer()), &lookup)
            .await
            .unwrap();
        assert_eq!(authorized.identity, None);
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 0);
    }
}
