//! Webhook endpoint registrations.

use crate::models::{OrgId, ProjectId, UserId};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A registered inbound webhook. The signing secret is stored encrypted
/// and only decrypted at verification time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEndpoint {
    pub id: Uuid,
    pub org_id: OrgId,
    pub project_id: ProjectId,
    pub name: String,
    pub secret_ciphertext: String,
    /// Instruction template framed around the delivered payload.
    pub instruction: String,
    pub enabled: bool,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait WebhookStore: Send + Sync {
    async fn insert(&self, endpoint: &WebhookEndpoint) -> Result<()>;

    /// Lookup by endpoint id alone: the receiver does not yet know the
    /// organization when a delivery arrives.
    async fn get(&self, id: Uuid) -> Result<Option<WebhookEndpoint>>;

    async fn list(&self, org_id: OrgId) -> Result<Vec<WebhookEndpoint>>;

    async fn set_enabled(&self, org_id: OrgId, id: Uuid, enabled: bool) -> Result<bool>;

    async fn delete(&self, org_id: OrgId, id: Uuid) -> Result<bool>;
}
