use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use userhub_infra::StoreError;

pub const INVALID_REQUEST: &str = "invalid request";
pub const INVALID_ID: &str = "Invalid ID format";
pub const USER_NOT_FOUND: &str = "User not found";
pub const INTERNAL_ERROR: &str = "internal error";

/// `{"error": message}` with the given status.
pub fn json_error(status: StatusCode, message: impl Into<String>) -> axum::response::Response {
    (status, axum::Json(json!({ "error": message.into() }))).into_response()
}

pub fn store_error_to_response(err: StoreError) -> axum::response::Response {
    match err {
        StoreError::NotFound => json_error(StatusCode::NOT_FOUND, USER_NOT_FOUND),
        StoreError::Conflict(_) => json_error(StatusCode::CONFLICT, "username already exists"),
        StoreError::UnknownRole(role) => {
            json_error(StatusCode::BAD_REQUEST, format!("unknown role '{role}'"))
        }
        StoreError::Backend(msg) => {
            tracing::error!(error = %msg, "identity store failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_to_statuses() {
        assert_eq!(store_error_to_response(StoreError::NotFound).status(), StatusCode::NOT_FOUND);
        assert_eq!(
            store_error_to_response(StoreError::Conflict("dup".into())).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            store_error_to_response(StoreError::UnknownRole("ghost".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            store_error_to_response(StoreError::Backend("db down".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
