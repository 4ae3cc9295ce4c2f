//! Route-level role/permission gates.
//!
//! Runs after the bearer middleware; reads the caller's claims from the
//! request and checks them against the route's [`AccessRequirement`].

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    middleware::Next,
    response::Response,
};

use userhub_auth::{AccessRequirement, AuthzError, IdentityLookup};

use crate::app::errors::json_error;
use crate::context::PrincipalContext;
use crate::middleware::MISSING_TOKEN;

pub const ACCESS_DENIED: &str = "Access denied";

#[derive(Clone)]
pub struct GateState {
    pub requirement: AccessRequirement,
    pub lookup: Arc<dyn IdentityLookup>,
}

impl GateState {
    pub fn new(requirement: AccessRequirement, lookup: Arc<dyn IdentityLookup>) -> Self {
        Self { requirement, lookup }
    }
}

/// Deny with 403 unless the caller meets the gate's requirement.
///
/// On allow, the identity resolved by a permission check (if any) is attached
/// to the request for handlers to read.
pub async fn gate_middleware(
    State(gate): State<GateState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, Response> {
    let principal = req
        .extensions()
        .get::<PrincipalContext>()
        .cloned()
        .ok_or_else(|| json_error(StatusCode::UNAUTHORIZED, MISSING_TOKEN))?;

    match gate.requirement.check(principal.claims(), gate.lookup.as_ref()).await {
        Ok(authorized) => {
            if let Some(identity) = authorized.identity {
                req.extensions_mut().insert(identity);
            }
            Ok(next.run(req).await)
        }
        Err(AuthzError::Lookup(e)) => {
            tracing::error!(error = %e, user_id = %principal.user_id(), "authorization lookup failed");
            Err(json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal error"))
        }
        Err(e) => {
            let reason = match &e {
                AuthzError::Forbidden(missing) => missing.as_str(),
                _ => "identity no longer exists",
            };
            tracing::warn!(
                user_id = %principal.user_id(),
                role = ?principal.role().map(|r| r.as_str()),
                path = %req.uri().path(),
                reason,
                "access denied"
            );
            Err(json_error(StatusCode::FORBIDDEN, ACCESS_DENIED))
        }
    }
}
