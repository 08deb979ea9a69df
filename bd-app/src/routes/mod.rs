mod activity;
mod health;
mod schedules;
mod webhooks;

use crate::server::AppState;
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::Router;
use bd_core::Error;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/health", get(health::health))
        .route("/api/v1/webhooks", post(webhooks::register))
        .route("/api/v1/webhooks/{id}", post(webhooks::receive))
        .route("/api/v1/activity", get(activity::list))
        .route("/api/v1/activity/{id}/undo", post(activity::undo))
        .route(
            "/api/v1/schedules",
            get(schedules::list).post(schedules::create),
        )
        .route(
            "/api/v1/schedules/{id}",
            put(schedules::update).delete(schedules::remove),
        )
        .route("/api/v1/schedules/{id}/run", post(schedules::run_now))
        .with_state(state)
}

/// Maps core errors onto response codes. Webhook admission handles its
/// own mapping so the uniform-rejection contract stays in one place.
pub(crate) fn error_status(error: &Error) -> StatusCode {
    match error {
        Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::Conflict(_) => StatusCode::CONFLICT,
        Error::PermissionDenied(_) | Error::ApprovalDenied(_) => StatusCode::FORBIDDEN,
        Error::LimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
        Error::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        Error::SignatureInvalid => StatusCode::UNAUTHORIZED,
        Error::Backend { .. } | Error::BackendMessage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
