use crate::routes::error_status;
use crate::server::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use bd_core::models::{OrgId, UserId};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

#[derive(Deserialize)]
pub struct ListQuery {
    pub org_id: Uuid,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

pub async fn list(State(state): State<AppState>, Query(query): Query<ListQuery>) -> Response {
    match state
        .runtime
        .ledger
        .list_recent(OrgId(query.org_id), query.limit.min(200))
        .await
    {
        Ok(records) => Json(json!({ "records": records })).into_response(),
        Err(e) => (
            error_status(&e),
            Json(json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

#[derive(Deserialize)]
pub struct UndoRequest {
    pub org_id: Uuid,
    pub user_id: Uuid,
}

pub async fn undo(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UndoRequest>,
) -> Response {
    match state
        .runtime
        .undo
        .undo(OrgId(request.org_id), id, UserId(request.user_id))
        .await
    {
        Ok(outcome) => {
            let status = if outcome.success {
                StatusCode::OK
            } else {
                StatusCode::CONFLICT
            };
            (
                status,
                Json(json!({
                    "success": outcome.success,
                    "message": outcome.message,
                    "restored_ids": outcome.restored_ids,
                })),
            )
                .into_response()
        }
        Err(e) => {
            let status = match &e {
                bd_tools::ToolError::NotFound(_) => StatusCode::NOT_FOUND,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (status, Json(json!({ "error": e.to_string() }))).into_response()
        }
    }
}
