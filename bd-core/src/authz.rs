use crate::models::{AccessLevel, ActionContext, UserId};
use crate::Result;
use async_trait::async_trait;
use std::collections::HashMap;

/// External authorization lookup. May consult a remote service or a
/// relational store; implementations return `Ok(false)` for a clean
/// denial and `Err` for transport/lookup failures.
///
/// Callers must treat `Err` as denied (the permission gate fails
/// closed); implementations should not mask their own failures.
#[async_trait]
pub trait AccessChecker: Send + Sync {
    async fn check(
        &self,
        context: &ActionContext,
        resource_type: &str,
        resource_id: &str,
        level: AccessLevel,
    ) -> Result<bool>;
}

/// Fixed grant table for dev and tests: each user holds one level for
/// every resource in the org.
#[derive(Debug, Default)]
pub struct StaticAccessChecker {
    grants: HashMap<UserId, AccessLevel>,
}

impl StaticAccessChecker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(mut self, user: UserId, level: AccessLevel) -> Self {
        self.grants.insert(user, level);
        self
    }
}

#[async_trait]
impl AccessChecker for StaticAccessChecker {
    async fn check(
        &self,
        context: &ActionContext,
        _resource_type: &str,
        _resource_id: &str,
        level: AccessLevel,
    ) -> Result<bool> {
        Ok(self
            .grants
            .get(&context.user_id)
            .is_some_and(|held| *held >= level))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OrgId, ProjectId, TriggerKind};
    use uuid::Uuid;

    fn ctx(user: UserId) -> ActionContext {
        ActionContext::system(
            OrgId(Uuid::nil()),
            ProjectId(Uuid::nil()),
            user,
            TriggerKind::Chat,
        )
    }

    #[tokio::test]
    async fn held_level_must_meet_requested_minimum() {
        let editor = UserId(Uuid::new_v4());
        let stranger = UserId(Uuid::new_v4());
        let checker = StaticAccessChecker::new().grant(editor, AccessLevel::Editor);

        assert!(checker
            .check(&ctx(editor), "task", "t1", AccessLevel::Member)
            .await
            .unwrap());
        assert!(checker
            .check(&ctx(editor), "task", "t1", AccessLevel::Editor)
            .await
            .unwrap());
        assert!(!checker
            .check(&ctx(editor), "task", "t1", AccessLevel::Admin)
            .await
            .unwrap());
        assert!(!checker
            .check(&ctx(stranger), "task", "t1", AccessLevel::Member)
            .await
            .unwrap());
    }
}
