use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::audit::{
    AuditChange, ACTION_MEMBER_ADDED, ACTION_MEMBER_REMOVED, ACTION_MEMBER_ROLE_CHANGED,
    ACTION_PM_DELEGATED, ACTION_PM_DELEGATION_REVOKED, ENTITY_MEMBER,
};
use crate::engine::{Engine, MutationOutcome};
use crate::error::{EngineError, EngineResult};
use crate::models::{NewProjectMembership, ProjectMembership, Role};
use crate::permissions::{has_permission, Capability};

/// Membership mutations. Every operation follows the same shape: resolve
/// the actor's effective role, run permission and structural checks, persist,
/// then audit and notify best-effort. Expected failures come back as
/// `MutationOutcome { success: false, .. }`; only infrastructure errors are
/// `Err`.
impl Engine {
    pub async fn add_member(
        &self,
        project_id: Uuid,
        actor_id: Uuid,
        target_user_id: Uuid,
        role: Role,
    ) -> EngineResult<MutationOutcome> {
        self.outcome(
            self.add_member_inner(project_id, actor_id, target_user_id, role)
                .await,
        )
    }

    async fn add_member_inner(
        &self,
        project_id: Uuid,
        actor_id: Uuid,
        target_user_id: Uuid,
        role: Role,
    ) -> EngineResult<String> {
        let now = Utc::now();
        self.require_known_user(actor_id).await?;
        let actor_role = self.require_member_role(project_id, actor_id, now).await?;
        self.require_capability(actor_role, Capability::InviteMembers)?;

        if actor_role == Role::ProjectCoordinator && role != Role::TeamMember {
            return Err(EngineError::permission_denied(
                "a Project Coordinator may only invite Team Members",
            ));
        }

        if !self.store.user_exists(target_user_id).await? {
            return Err(EngineError::not_found("user"));
        }

        let member = self
            .store
            .insert_membership(NewProjectMembership {
                project_id,
                user_id: target_user_id,
                role: role.as_str().to_string(),
                invited_by: Some(actor_id),
            })
            .await?;

        self.record_audit(
            project_id,
            actor_id,
            ACTION_MEMBER_ADDED,
            ENTITY_MEMBER,
            member.user_id,
            &AuditChange::MemberRoleChange {
                old: None,
                new: Some(role),
            },
        )
        .await;
        self.notify_member_added(project_id, target_user_id, role)
            .await;

        Ok(format!("member added as {}", role.label()))
    }

    pub async fn change_member_role(
        &self,
        project_id: Uuid,
        actor_id: Uuid,
        target_user_id: Uuid,
        new_role: Role,
    ) -> EngineResult<MutationOutcome> {
        self.outcome(
            self.change_member_role_inner(project_id, actor_id, target_user_id, new_role)
                .await,
        )
    }

    async fn change_member_role_inner(
        &self,
        project_id: Uuid,
        actor_id: Uuid,
        target_user_id: Uuid,
        new_role: Role,
    ) -> EngineResult<String> {
        let now = Utc::now();
        self.require_known_user(actor_id).await?;
        let actor_role = self.require_member_role(project_id, actor_id, now).await?;
        self.require_capability(actor_role, Capability::ChangeRoles)?;

        let membership = self.require_membership(project_id, target_user_id).await?;
        let old_role = membership.stored_role();

        if old_role == Some(new_role) {
            return Ok(format!("member already holds {}", new_role.label()));
        }

        // The last-PM check rides inside this write; the store rejects a
        // demotion that would leave the project without a Project Manager.
        self.store
            .update_member_role(project_id, target_user_id, new_role)
            .await?;

        self.record_audit(
            project_id,
            actor_id,
            ACTION_MEMBER_ROLE_CHANGED,
            ENTITY_MEMBER,
            target_user_id,
            &AuditChange::MemberRoleChange {
                old: old_role,
                new: Some(new_role),
            },
        )
        .await;
        self.notify_role_changed(project_id, target_user_id, new_role)
            .await;

        Ok(format!("member role changed to {}", new_role.label()))
    }

    pub async fn remove_member(
        &self,
        project_id: Uuid,
        actor_id: Uuid,
        target_user_id: Uuid,
    ) -> EngineResult<MutationOutcome> {
        self.outcome(
            self.remove_member_inner(project_id, actor_id, target_user_id)
                .await,
        )
    }

    async fn remove_member_inner(
        &self,
        project_id: Uuid,
        actor_id: Uuid,
        target_user_id: Uuid,
    ) -> EngineResult<String> {
        let now = Utc::now();
        self.require_known_user(actor_id).await?;

        let membership = self.require_membership(project_id, target_user_id).await?;

        // Leaving a project is always allowed; removing someone else needs
        // the capability, and a coordinator may only remove Team Members.
        if actor_id != target_user_id {
            let actor_role = self.require_member_role(project_id, actor_id, now).await?;
            self.require_capability(actor_role, Capability::RemoveMembers)?;

            if actor_role == Role::ProjectCoordinator
                && membership.stored_role() != Some(Role::TeamMember)
            {
                return Err(EngineError::permission_denied(
                    "a Project Coordinator may only remove Team Members",
                ));
            }
        }

        // Last-PM guard applies even to self-removal.
        self.store
            .delete_membership(project_id, target_user_id)
            .await?;

        self.record_audit(
            project_id,
            actor_id,
            ACTION_MEMBER_REMOVED,
            ENTITY_MEMBER,
            target_user_id,
            &AuditChange::MemberRoleChange {
                old: membership.stored_role(),
                new: None,
            },
        )
        .await;
        self.notify_member_removed(project_id, target_user_id).await;

        Ok("member removed".to_string())
    }

    pub async fn delegate_pm_rights(
        &self,
        project_id: Uuid,
        actor_id: Uuid,
        coordinator_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> EngineResult<MutationOutcome> {
        self.outcome(
            self.set_delegation(project_id, actor_id, coordinator_id, Some(expires_at))
                .await,
        )
    }

    pub async fn revoke_pm_delegation(
        &self,
        project_id: Uuid,
        actor_id: Uuid,
        coordinator_id: Uuid,
    ) -> EngineResult<MutationOutcome> {
        self.outcome(
            self.set_delegation(project_id, actor_id, coordinator_id, None)
                .await,
        )
    }

    async fn set_delegation(
        &self,
        project_id: Uuid,
        actor_id: Uuid,
        coordinator_id: Uuid,
        expires_at: Option<DateTime<Utc>>,
    ) -> EngineResult<String> {
        let now = Utc::now();
        self.require_known_user(actor_id).await?;
        let actor_role = self.require_member_role(project_id, actor_id, now).await?;
        self.require_capability(actor_role, Capability::DelegatePm)?;

        let membership = self.require_membership(project_id, coordinator_id).await?;
        if membership.stored_role() != Some(Role::ProjectCoordinator) {
            return Err(EngineError::permission_denied(
                "PM rights can only be delegated to a Project Coordinator",
            ));
        }

        // A past expiry is stored as-is; the resolver treats it as no
        // delegation, so there is nothing to validate here.
        let until = expires_at.map(|at| at.naive_utc());
        self.store
            .update_delegation(project_id, coordinator_id, until)
            .await?;

        let (action, granted, message) = match until {
            Some(at) => (
                ACTION_PM_DELEGATED,
                true,
                format!("PM rights delegated until {at}"),
            ),
            None => (
                ACTION_PM_DELEGATION_REVOKED,
                false,
                "PM delegation revoked".to_string(),
            ),
        };

        self.record_audit(
            project_id,
            actor_id,
            action,
            ENTITY_MEMBER,
            coordinator_id,
            &AuditChange::DelegationChange {
                old: membership.delegated_pm_until,
                new: until,
            },
        )
        .await;
        self.notify_delegation(project_id, coordinator_id, granted)
            .await;

        Ok(message)
    }

    fn outcome(&self, result: EngineResult<String>) -> EngineResult<MutationOutcome> {
        match result {
            Ok(message) => Ok(MutationOutcome::ok(message)),
            Err(err) if err.is_business() => Ok(MutationOutcome::rejected(&err)),
            Err(err) => Err(err),
        }
    }

    fn require_capability(&self, role: Role, capability: Capability) -> EngineResult<()> {
        if has_permission(role, capability) {
            Ok(())
        } else {
            Err(EngineError::permission_denied(format!(
                "role {} lacks the {} capability",
                role.label(),
                capability.as_str()
            )))
        }
    }

    async fn require_membership(
        &self,
        project_id: Uuid,
        user_id: Uuid,
    ) -> EngineResult<ProjectMembership> {
        self.store
            .find_membership(project_id, user_id)
            .await?
            .ok_or_else(|| EngineError::not_found("project member"))
    }
}
