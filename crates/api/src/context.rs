use userhub_auth::{Permission, Role, SessionClaims};
use userhub_core::UserId;

/// Principal context for a request: the validated token claims.
///
/// Inserted by the bearer middleware; present on every protected route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    claims: SessionClaims,
}

impl PrincipalContext {
    pub fn new(claims: SessionClaims) -> Self {
        Self { claims }
    }

    pub fn user_id(&self) -> UserId {
        self.claims.sub
    }

    pub fn username(&self) -> &str {
        &self.claims.username
    }

    pub fn role(&self) -> Option<&Role> {
        self.claims.role.as_ref()
    }

    pub fn permissions(&self) -> &[Permission] {
        &self.claims.permissions
    }

    pub fn claims(&self) -> &SessionClaims {
        &self.claims
    }
}
