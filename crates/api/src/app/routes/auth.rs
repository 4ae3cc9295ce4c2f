//! Login and profile.

use std::sync::Arc;

use axum::{
    extract::{Extension, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::app::dto::{LoginRequest, LoginResponse};
use crate::app::errors::{INTERNAL_ERROR, INVALID_REQUEST, json_error};
use crate::app::services::{AppServices, LoginError};
use crate::context::PrincipalContext;

/// POST /api/login
pub async fn login(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Response {
    let Ok(Json(body)) = body else {
        return json_error(StatusCode::BAD_REQUEST, INVALID_REQUEST);
    };
    if let Err(e) = body.validate() {
        tracing::debug!(error = %e, "login request failed validation");
        return json_error(StatusCode::BAD_REQUEST, INVALID_REQUEST);
    }

    match services.login(&body.username, &body.password).await {
        Ok(token) => {
            tracing::info!(username = %body.username, "login succeeded");
            (StatusCode::OK, Json(LoginResponse { token })).into_response()
        }
        Err(LoginError::InvalidCredentials) => {
            tracing::info!(username = %body.username, "login rejected");
            json_error(StatusCode::UNAUTHORIZED, "invalid credentials")
        }
        Err(LoginError::Token(e)) => {
            tracing::error!(error = %e, "token signing failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "could not generate token")
        }
        Err(e) => {
            tracing::error!(error = %e, "login failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR)
        }
    }
}

/// GET /api/profile
pub async fn profile(Extension(principal): Extension<PrincipalContext>) -> impl IntoResponse {
    Json(json!({
        "message": "Welcome to your profile!",
        "id": principal.user_id(),
        "username": principal.username(),
        "role": principal.role(),
        "permissions": principal.permissions(),
    }))
}
