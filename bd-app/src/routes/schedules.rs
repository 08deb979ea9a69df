use crate::routes::error_status;
use crate::server::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use bd_core::models::{OrgId, ProjectId, UserId};
use bd_core::schedule::{CreateScheduleInput, UpdateScheduleInput};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

#[derive(Deserialize)]
pub struct OrgQuery {
    pub org_id: Uuid,
}

pub async fn list(State(state): State<AppState>, Query(query): Query<OrgQuery>) -> Response {
    match state.runtime.scheduler.list(OrgId(query.org_id)).await {
        Ok(schedules) => Json(json!({ "schedules": schedules })).into_response(),
        Err(e) => (
            error_status(&e),
            Json(json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

#[derive(Deserialize)]
pub struct CreateScheduleRequest {
    pub org_id: Uuid,
    pub project_id: Uuid,
    pub created_by: Uuid,
    pub name: String,
    pub cron_expression: String,
    pub instruction: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

pub async fn create(
    State(state): State<AppState>,
    Json(request): Json<CreateScheduleRequest>,
) -> Response {
    match state
        .runtime
        .scheduler
        .create_schedule(
            OrgId(request.org_id),
            ProjectId(request.project_id),
            UserId(request.created_by),
            CreateScheduleInput {
                name: request.name,
                cron_expression: request.cron_expression,
                instruction: request.instruction,
                enabled: request.enabled,
            },
        )
        .await
    {
        Ok(schedule) => (StatusCode::CREATED, Json(json!({ "schedule": schedule }))).into_response(),
        Err(e) => (
            error_status(&e),
            Json(json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

#[derive(Deserialize)]
pub struct UpdateScheduleRequest {
    pub org_id: Uuid,
    pub name: Option<String>,
    pub cron_expression: Option<String>,
    pub instruction: Option<String>,
    pub enabled: Option<bool>,
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateScheduleRequest>,
) -> Response {
    match state
        .runtime
        .scheduler
        .update_schedule(
            OrgId(request.org_id),
            id,
            UpdateScheduleInput {
                name: request.name,
                cron_expression: request.cron_expression,
                instruction: request.instruction,
                enabled: request.enabled,
            },
        )
        .await
    {
        Ok(schedule) => Json(json!({ "schedule": schedule })).into_response(),
        Err(e) => (
            error_status(&e),
            Json(json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

pub async fn remove(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<OrgQuery>,
) -> Response {
    match state.runtime.scheduler.delete(OrgId(query.org_id), id).await {
        Ok(true) => Json(json!({ "deleted": true })).into_response(),
        Ok(false) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "schedule not found" })),
        )
            .into_response(),
        Err(e) => (
            error_status(&e),
            Json(json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

pub async fn run_now(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<OrgQuery>,
) -> Response {
    match state
        .runtime
        .scheduler
        .execute_by_id(OrgId(query.org_id), id)
        .await
    {
        Ok(()) => Json(json!({ "executed": true })).into_response(),
        Err(e) => (
            error_status(&e),
            Json(json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}
