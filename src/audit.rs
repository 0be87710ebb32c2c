use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::engine::Engine;
use crate::error::{EngineError, EngineResult};
use crate::models::{AuditLogEntry, NewAuditLogEntry, Role, TaskStatus};
use crate::permissions::{has_permission, Capability};

pub const ENTITY_TASK: &str = "task";
pub const ENTITY_MEMBER: &str = "member";

pub const ACTION_TASK_STATUS_CHANGED: &str = "task_status_changed";
pub const ACTION_MEMBER_ADDED: &str = "member_added";
pub const ACTION_MEMBER_REMOVED: &str = "member_removed";
pub const ACTION_MEMBER_ROLE_CHANGED: &str = "member_role_changed";
pub const ACTION_PM_DELEGATED: &str = "pm_delegated";
pub const ACTION_PM_DELEGATION_REVOKED: &str = "pm_delegation_revoked";

/// Typed before/after snapshot for one audited mutation, one variant per
/// entity kind. Serialized into the entry's `old_value`/`new_value` columns
/// so the log stays queryable by plain JSON shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum AuditChange {
    TaskStatusChange {
        old: TaskStatus,
        new: TaskStatus,
    },
    /// `None` on either side models a membership appearing or disappearing.
    MemberRoleChange {
        old: Option<Role>,
        new: Option<Role>,
    },
    DelegationChange {
        old: Option<NaiveDateTime>,
        new: Option<NaiveDateTime>,
    },
}

impl AuditChange {
    pub fn old_value(&self) -> Value {
        match self {
            AuditChange::TaskStatusChange { old, .. } => {
                json!({ "type": "task_status", "value": old })
            }
            AuditChange::MemberRoleChange { old, .. } => {
                json!({ "type": "member_role", "value": old })
            }
            AuditChange::DelegationChange { old, .. } => {
                json!({ "type": "delegated_pm_until", "value": old })
            }
        }
    }

    pub fn new_value(&self) -> Value {
        match self {
            AuditChange::TaskStatusChange { new, .. } => {
                json!({ "type": "task_status", "value": new })
            }
            AuditChange::MemberRoleChange { new, .. } => {
                json!({ "type": "member_role", "value": new })
            }
            AuditChange::DelegationChange { new, .. } => {
                json!({ "type": "delegated_pm_until", "value": new })
            }
        }
    }
}

impl Engine {
    /// Appends one audit entry for an already-committed mutation. Called
    /// exactly once per successful mutation, never for rejected ones. A
    /// write failure is an operator concern, not a caller concern: it is
    /// logged and the primary mutation stands.
    pub(crate) async fn record_audit(
        &self,
        project_id: Uuid,
        actor_id: Uuid,
        action: &str,
        entity_type: &str,
        entity_id: Uuid,
        change: &AuditChange,
    ) {
        let entry = NewAuditLogEntry {
            id: Uuid::new_v4(),
            project_id,
            actor_id,
            action: action.to_string(),
            entity_type: entity_type.to_string(),
            entity_id,
            old_value: change.old_value(),
            new_value: change.new_value(),
        };

        if let Err(err) = self.store.insert_audit(entry).await {
            tracing::warn!(%project_id, %actor_id, action, "failed to write audit entry: {err}");
        }
    }

    /// Reads a project's audit trail, newest first. Gated on the
    /// `view_audit_log` capability, which the matrix grants to Project
    /// Managers and Project Coordinators only.
    pub async fn list_audit_log(
        &self,
        project_id: Uuid,
        actor_id: Uuid,
        limit: i64,
    ) -> EngineResult<Vec<AuditLogEntry>> {
        self.require_known_user(actor_id).await?;
        let role = self
            .require_member_role(project_id, actor_id, Utc::now())
            .await?;
        if !has_permission(role, Capability::ViewAuditLog) {
            return Err(EngineError::permission_denied(format!(
                "role {} lacks the {} capability",
                role.label(),
                Capability::ViewAuditLog.as_str()
            )));
        }

        self.store.list_audit(project_id, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshots_carry_a_tagged_shape() {
        let change = AuditChange::TaskStatusChange {
            old: TaskStatus::Todo,
            new: TaskStatus::InProgress,
        };
        assert_eq!(
            change.old_value(),
            json!({ "type": "task_status", "value": "todo" })
        );
        assert_eq!(
            change.new_value(),
            json!({ "type": "task_status", "value": "in_progress" })
        );
    }

    #[test]
    fn membership_add_has_null_old_side() {
        let change = AuditChange::MemberRoleChange {
            old: None,
            new: Some(Role::TeamMember),
        };
        assert_eq!(
            change.old_value(),
            json!({ "type": "member_role", "value": null })
        );
        assert_eq!(
            change.new_value(),
            json!({ "type": "member_role", "value": "team_member" })
        );
    }
}
