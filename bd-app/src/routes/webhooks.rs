use crate::routes::error_status;
use crate::server::AppState;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bd_core::models::{OrgId, ProjectId, UserId};
use bd_core::secrets::DevSecretCipher;
use bd_core::webhook::WebhookEndpoint;
use bd_core::Error;
use bytes::Bytes;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

const SIGNATURE_HEADER: &str = "x-boardpilot-signature";

/// Inbound delivery receiver. The response acknowledges receipt; agent
/// execution continues in the background.
pub async fn receive(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let declared_len = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    match state
        .runtime
        .webhook_gate
        .admit(id, declared_len, signature, &body)
        .await
    {
        Ok(delivery) => {
            let executor = state.runtime.executor.clone();
            tokio::spawn(async move {
                executor.webhook_delivery(delivery).await;
            });
            (StatusCode::ACCEPTED, Json(json!({ "accepted": true }))).into_response()
        }
        // Unknown id, disabled endpoint, and bad signature all land
        // here with one indistinguishable response.
        Err(Error::SignatureInvalid) => (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "webhook verification failed" })),
        )
            .into_response(),
        Err(Error::InvalidInput(message)) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": message })),
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "webhook admission failed unexpectedly");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "internal error" })),
            )
                .into_response()
        }
    }
}

#[derive(Deserialize)]
pub struct RegisterWebhookRequest {
    pub org_id: Uuid,
    pub project_id: Uuid,
    pub created_by: Uuid,
    pub name: String,
    pub secret: String,
    pub instruction: String,
}

pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterWebhookRequest>,
) -> Response {
    if request.name.trim().is_empty()
        || request.secret.trim().is_empty()
        || request.instruction.trim().is_empty()
    {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "name, secret, and instruction are required" })),
        )
            .into_response();
    }

    let endpoint = WebhookEndpoint {
        id: Uuid::new_v4(),
        org_id: OrgId(request.org_id),
        project_id: ProjectId(request.project_id),
        name: request.name.trim().to_string(),
        secret_ciphertext: DevSecretCipher::encrypt(request.secret.trim()),
        instruction: request.instruction.trim().to_string(),
        enabled: true,
        created_by: UserId(request.created_by),
        created_at: Utc::now(),
    };

    match state.runtime.webhook_store.insert(&endpoint).await {
        Ok(()) => (
            StatusCode::CREATED,
            Json(json!({ "id": endpoint.id.to_string() })),
        )
            .into_response(),
        Err(e) => (
            error_status(&e),
            Json(json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}
