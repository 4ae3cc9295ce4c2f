use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use chrono::Utc;

use userhub_auth::TokenService;

use crate::app::errors::json_error;
use crate::context::PrincipalContext;

pub const MISSING_TOKEN: &str = "missing or malformed JWT";
pub const INVALID_TOKEN: &str = "invalid or expired JWT";

#[derive(Clone)]
pub struct AuthState {
    pub tokens: Arc<TokenService>,
}

/// Validate the bearer token and attach the caller's claims to the request.
///
/// Every validation failure (malformed, bad signature, expired) yields the
/// same 401 body.
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, Response> {
    let token = extract_bearer(req.headers())
        .ok_or_else(|| json_error(StatusCode::UNAUTHORIZED, MISSING_TOKEN))?;

    let claims = state.tokens.validate(token, Utc::now()).map_err(|e| {
        tracing::debug!(error = %e, path = %req.uri().path(), "rejected bearer token");
        json_error(StatusCode::UNAUTHORIZED, INVALID_TOKEN)
    })?;

    req.extensions_mut().insert(PrincipalContext::new(claims));

    Ok(next.run(req).await)
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let header = headers.get(axum::http::header::AUTHORIZATION)?;
    let header = header.to_str().ok()?;
    let token = header.strip_prefix("Bearer ")?.trim();

    if token.is_empty() {
        return None;
    }

    Some(token)
}
