use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrgId(pub Uuid);

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(pub Uuid);

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub Uuid);

impl std::fmt::Display for OrgId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::fmt::Display for ProjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Minimum access level a caller can hold on a board resource.
///
/// Levels form a total order; callers requesting `Editor` are satisfied
/// by `Editor` or `Admin`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    Member,
    Editor,
    Admin,
}

impl AccessLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            AccessLevel::Member => "member",
            AccessLevel::Editor => "editor",
            AccessLevel::Admin => "admin",
        }
    }

    pub fn from_str(s: &str) -> Result<Self> {
        match s {
            "member" => Ok(AccessLevel::Member),
            "editor" => Ok(AccessLevel::Editor),
            "admin" => Ok(AccessLevel::Admin),
            other => Err(Error::InvalidInput(format!(
                "unknown access level: {other}"
            ))),
        }
    }
}

/// Identifies what admitted a dispatch into the system.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    Chat,
    Mention,
    Webhook,
    Schedule,
}

impl TriggerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TriggerKind::Chat => "chat",
            TriggerKind::Mention => "mention",
            TriggerKind::Webhook => "webhook",
            TriggerKind::Schedule => "schedule",
        }
    }
}

/// Value object carried through one tool dispatch. Immutable; cloned by
/// value through the call chain.
///
/// The trusted variant omits the credential and skips the permission
/// gate. Only system triggers (scheduler, webhook, mention) construct
/// it, via [`ActionContext::system`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionContext {
    pub org_id: OrgId,
    pub project_id: ProjectId,
    pub user_id: UserId,
    pub session_id: Uuid,
    pub trigger: TriggerKind,
    /// Opaque credential forwarded to the authorization lookup. Absent
    /// on trusted contexts.
    pub credential: Option<String>,
    trusted: bool,
}

impl ActionContext {
    pub fn for_user(
        org_id: OrgId,
        project_id: ProjectId,
        user_id: UserId,
        session_id: Uuid,
        credential: impl Into<String>,
    ) -> Self {
        Self {
            org_id,
            project_id,
            user_id,
            session_id,
            trigger: TriggerKind::Chat,
            credential: Some(credential.into()),
            trusted: false,
        }
    }

    /// Trusted context for system-originated triggers. The acting user
    /// is the owner of the trigger (schedule creator, webhook creator,
    /// mentioned-comment author) so the ledger still has an actor.
    pub fn system(
        org_id: OrgId,
        project_id: ProjectId,
        user_id: UserId,
        trigger: TriggerKind,
    ) -> Self {
        Self {
            org_id,
            project_id,
            user_id,
            session_id: Uuid::new_v4(),
            trigger,
            credential: None,
            trusted: true,
        }
    }

    pub fn is_trusted(&self) -> bool {
        self.trusted
    }
}

/// `ActionContext` plus the delegation chain state. Depth increments by
/// exactly one per hop; the delegation controller stops exposing the
/// delegation tool once the configured maximum is reached.
#[derive(Debug, Clone)]
pub struct DelegationContext {
    pub action: ActionContext,
    pub depth: u8,
    /// Display name of the persona that spawned this context, if any.
    pub parent_persona: Option<String>,
}

impl DelegationContext {
    pub fn root(action: ActionContext) -> Self {
        Self {
            action,
            depth: 0,
            parent_persona: None,
        }
    }

    pub fn child(&self, parent_persona: impl Into<String>) -> Self {
        Self {
            action: self.action.clone(),
            depth: self.depth.saturating_add(1),
            parent_persona: Some(parent_persona.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_levels_are_ordered() {
        assert!(AccessLevel::Member < AccessLevel::Editor);
        assert!(AccessLevel::Editor < AccessLevel::Admin);
        assert!(AccessLevel::Admin >= AccessLevel::Editor);
    }

    #[test]
    fn access_level_round_trips_through_str() {
        for level in [AccessLevel::Member, AccessLevel::Editor, AccessLevel::Admin] {
            assert_eq!(AccessLevel::from_str(level.as_str()).unwrap(), level);
        }
        assert!(AccessLevel::from_str("owner").is_err());
    }

    #[test]
    fn system_context_is_trusted_and_credential_free() {
        let ctx = ActionContext::system(
            OrgId(Uuid::nil()),
            ProjectId(Uuid::nil()),
            UserId(Uuid::nil()),
            TriggerKind::Schedule,
        );
        assert!(ctx.is_trusted());
        assert!(ctx.credential.is_none());
    }

    #[test]
    fn delegation_child_increments_depth() {
        let ctx = ActionContext::system(
            OrgId(Uuid::nil()),
            ProjectId(Uuid::nil()),
            UserId(Uuid::nil()),
            TriggerKind::Chat,
        );
        let root = DelegationContext::root(ctx);
        let child = root.child("triage");
        assert_eq!(root.depth, 0);
        assert_eq!(child.depth, 1);
        assert_eq!(child.parent_persona.as_deref(), Some("triage"));
    }
}
