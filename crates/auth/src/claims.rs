use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use userhub_core::UserId;

use crate::{Identity, Permission, Role};

/// Claim set carried by a session token.
///
/// This is a snapshot of the identity at issuance time: if the identity's role
/// or permissions change afterwards, the token keeps the old values until it
/// expires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject / user identifier.
    pub sub: UserId,

    pub username: String,

    /// Primary role at issuance (absent for role-less identities).
    pub role: Option<Role>,

    /// Effective permissions at issuance, sorted and deduplicated.
    #[serde(default)]
    pub permissions: Vec<Permission>,

    /// Token identifier, usable as a denylist key.
    pub jti: Uuid,

    /// Issued-at (JWT NumericDate, whole seconds).
    #[serde(with = "chrono::serde::ts_seconds")]
    pub iat: DateTime<Utc>,

    /// Expiration (JWT NumericDate, whole seconds).
    #[serde(with = "chrono::serde::ts_seconds")]
    pub exp: DateTime<Utc>,
}

impl SessionClaims {
    /// Build the claim set for `identity`, valid from `now` for `ttl`.
    ///
    /// `now` is truncated to whole seconds so that the encoded token decodes to
    /// an identical value. Fails when `now + ttl` is not a representable time.
    pub fn for_identity(
        identity: &Identity,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<Self, ClaimsError> {
        let iat = truncate_to_seconds(now);
        let exp = iat.checked_add_signed(ttl).ok_or(ClaimsError::InvalidTimeWindow)?;
        Ok(Self {
            sub: identity.id,
            username: identity.username.clone(),
            role: identity.role.clone(),
            permissions: identity.effective_permissions().into_iter().collect(),
            jti: Uuid::now_v7(),
            iat,
            exp,
        })
    }

    pub fn has_permission(&self, permission: &Permission) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }
}

fn truncate_to_seconds(at: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp(at.timestamp(), 0).unwrap_or(at)
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClaimsError {
    #[error("token has expired")]
    Expired,

    #[error("invalid token time window (exp <= iat)")]
    InvalidTimeWindow,
}

/// Check the time window of already-decoded claims.
///
/// Valid while `now < exp`; at `now == exp` the token is expired.
pub fn validate_claims(claims: &SessionClaims, now: DateTime<Utc>) -> Result<(), ClaimsError> {
    if claims.exp <= claims.iat {
        return Err(ClaimsError::InvalidTimeWindow);
    }
    if now >= claims.exp {
        return Err(ClaimsError::Expired);
    }
    Ok(())
}
