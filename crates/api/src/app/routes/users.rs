//! User management routes.
//!
//! Reads need `view_user`; writes need the `superadmin` role plus the
//! matching permission.

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    extract::{
        Extension, Path, Query,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    middleware::from_fn_with_state,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde_json::json;

use userhub_auth::{AccessRequirement, Permission, permissions, roles};
use userhub_core::UserId;
use userhub_infra::UserFilter;

use crate::app::dto::{CreateUserRequest, ListUsersQuery, MessageResponse, UpdateUserRequest, UserView};
use crate::app::errors::{
    INTERNAL_ERROR, INVALID_ID, INVALID_REQUEST, json_error, store_error_to_response,
};
use crate::app::services::{AppServices, UserServiceError};
use crate::authz::{GateState, gate_middleware};
use crate::context::PrincipalContext;

const INVALID_PAYLOAD: &str = "Invalid request payload";

pub fn router(services: &AppServices) -> Router {
    let gate = |requirement: AccessRequirement| GateState::new(requirement, services.lookup.clone());
    let superadmin_with =
        |permission: Permission| gate(AccessRequirement::role(roles::SUPERADMIN).and_permission(permission));

    let reads = Router::new()
        .route("/api/users", get(list_users))
        .route("/api/users/:id", get(get_user))
        .route_layer(from_fn_with_state(
            gate(AccessRequirement::permission(permissions::VIEW_USER)),
            gate_middleware,
        ));

    let create = Router::new()
        .route("/api/users", post(create_user))
        .route_layer(from_fn_with_state(
            superadmin_with(permissions::CREATE_USER),
            gate_middleware,
        ));

    let update = Router::new()
        .route("/api/users/:id", put(update_user))
        .route_layer(from_fn_with_state(
            superadmin_with(permissions::EDIT_USER),
            gate_middleware,
        ));

    let remove = Router::new()
        .route("/api/users/:id", delete(delete_user))
        .route_layer(from_fn_with_state(
            superadmin_with(permissions::DELETE_USER),
            gate_middleware,
        ));

    reads.merge(create).merge(update).merge(remove)
}

fn parse_id(raw: &str) -> Result<UserId, Response> {
    UserId::from_str(raw).map_err(|_| json_error(StatusCode::BAD_REQUEST, INVALID_ID))
}

fn service_error_to_response(err: UserServiceError) -> Response {
    match err {
        UserServiceError::Store(e) => store_error_to_response(e),
        other => {
            tracing::error!(error = %other, "user operation failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR)
        }
    }
}

fn validation_failed(details: impl std::fmt::Display) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": "Validation failed", "details": details.to_string() })),
    )
        .into_response()
}

/// GET /api/users?username=
pub async fn list_users(
    Extension(services): Extension<Arc<AppServices>>,
    query: Result<Query<ListUsersQuery>, QueryRejection>,
) -> Response {
    let Ok(Query(query)) = query else {
        return json_error(StatusCode::BAD_REQUEST, INVALID_REQUEST);
    };
    let filter = UserFilter {
        username: query.username.filter(|u| !u.is_empty()),
    };

    match services.list_users(filter).await {
        Ok(users) => {
            let data: Vec<UserView> = users.iter().map(UserView::from).collect();
            Json(json!({ "total": data.len(), "data": data })).into_response()
        }
        Err(e) => service_error_to_response(e),
    }
}

/// GET /api/users/:id
pub async fn get_user(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Response {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.get_user(id).await {
        Ok(user) => Json(UserView::from(&user)).into_response(),
        Err(e) => service_error_to_response(e),
    }
}

/// POST /api/users
pub async fn create_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    body: Result<Json<CreateUserRequest>, JsonRejection>,
) -> Response {
    let Ok(Json(body)) = body else {
        return json_error(StatusCode::BAD_REQUEST, INVALID_PAYLOAD);
    };
    if let Err(e) = body.validate() {
        return validation_failed(e);
    }

    match services.create_user(body).await {
        Ok(user) => {
            tracing::info!(user_id = %user.id, actor = %principal.user_id(), "user created");
            (
                StatusCode::CREATED,
                Json(MessageResponse {
                    message: "User created successfully",
                    data: Some(UserView::from(&user)),
                }),
            )
                .into_response()
        }
        Err(e) => service_error_to_response(e),
    }
}

/// PUT /api/users/:id
pub async fn update_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Result<Json<UpdateUserRequest>, JsonRejection>,
) -> Response {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let Ok(Json(body)) = body else {
        return json_error(StatusCode::BAD_REQUEST, INVALID_PAYLOAD);
    };
    if let Err(e) = body.validate() {
        return validation_failed(e);
    }

    match services.update_user(id, body).await {
        Ok(user) => {
            tracing::info!(user_id = %user.id, actor = %principal.user_id(), "user updated");
            Json(MessageResponse {
                message: "User updated successfully",
                data: Some(UserView::from(&user)),
            })
            .into_response()
        }
        Err(e) => service_error_to_response(e),
    }
}

/// DELETE /api/users/:id
pub async fn delete_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.delete_user(id).await {
        Ok(()) => {
            tracing::info!(user_id = %id, actor = %principal.user_id(), "user deleted");
            Json(MessageResponse::<()> {
                message: "User deleted successfully",
                data: None,
            })
            .into_response()
        }
        Err(e) => service_error_to_response(e),
    }
}
