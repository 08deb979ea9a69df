use crate::error::{Result, ToolError};
use bd_core::authz::AccessChecker;
use bd_core::models::{AccessLevel, ActionContext};
use std::sync::Arc;

/// Fail-closed permission check wrapping the external authorization
/// lookup. Pure: no mutation, no caching.
///
/// A lookup error is indistinguishable from a denial on purpose — an
/// authorization service outage must never widen access.
#[derive(Clone)]
pub struct PermissionGate {
    checker: Arc<dyn AccessChecker>,
}

impl PermissionGate {
    pub fn new(checker: Arc<dyn AccessChecker>) -> Self {
        Self { checker }
    }

    pub async fn check(
        &self,
        context: &ActionContext,
        resource_type: &str,
        resource_id: &str,
        level: AccessLevel,
    ) -> bool {
        match self
            .checker
            .check(context, resource_type, resource_id, level)
            .await
        {
            Ok(allowed) => allowed,
            Err(e) => {
                tracing::warn!(
                    user_id = %context.user_id,
                    resource_type,
                    resource_id,
                    level = level.as_str(),
                    error = %e,
                    "authorization lookup failed; denying"
                );
                false
            }
        }
    }

    pub async fn ensure(
        &self,
        context: &ActionContext,
        resource_type: &str,
        resource_id: &str,
        level: AccessLevel,
    ) -> Result<()> {
        if self.check(context, resource_type, resource_id, level).await {
            return Ok(());
        }
        Err(ToolError::PermissionDenied(format!(
            "user {} lacks {} access on {resource_type} {resource_id}",
            context.user_id,
            level.as_str()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bd_core::models::{OrgId, ProjectId, TriggerKind, UserId};
    use bd_core::{Error, Result as CoreResult};
    use uuid::Uuid;

    struct FailingChecker;

    #[async_trait]
    impl AccessChecker for FailingChecker {
        async fn check(
            &self,
            _context: &ActionContext,
            _resource_type: &str,
            _resource_id: &str,
            _level: AccessLevel,
        ) -> CoreResult<bool> {
            Err(Error::BackendMessage("authz service unreachable".into()))
        }
    }

    #[tokio::test]
    async fn lookup_errors_fail_closed() {
        let gate = PermissionGate::new(Arc::new(FailingChecker));
        let ctx = ActionContext::system(
            OrgId(Uuid::nil()),
            ProjectId(Uuid::nil()),
            UserId(Uuid::nil()),
            TriggerKind::Chat,
        );
        assert!(!gate.check(&ctx, "project", "p1", AccessLevel::Member).await);
        assert!(matches!(
            gate.ensure(&ctx, "project", "p1", AccessLevel::Member).await,
            Err(ToolError::PermissionDenied(_))
        ));
    }
}
