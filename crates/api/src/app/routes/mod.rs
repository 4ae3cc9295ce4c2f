use axum::{routing::get, Router};

use crate::app::services::AppServices;

pub mod auth;
pub mod system;
pub mod users;

/// Router for all bearer-authenticated endpoints.
pub fn router(services: &AppServices) -> Router {
    Router::new()
        .route("/api/profile", get(auth::profile))
        .merge(users::router(services))
}
