use chrono::Utc;
use uuid::Uuid;

use crate::audit::{AuditChange, ACTION_TASK_STATUS_CHANGED, ENTITY_TASK};
use crate::engine::{Engine, TaskOutcome};
use crate::error::{EngineError, EngineResult};
use crate::models::{Role, Task, TaskStatus};
use crate::store::CompletionUpdate;

/// The task workflow, spelled out pair by pair. This table is the contract:
/// an absent `(from, to)` pair is an unknown transition no role may perform.
const TRANSITIONS: &[(TaskStatus, TaskStatus, &[Role])] = &[
    (
        TaskStatus::Todo,
        TaskStatus::InProgress,
        &[Role::ProjectManager, Role::ProjectCoordinator, Role::TeamMember],
    ),
    (
        TaskStatus::InProgress,
        TaskStatus::PendingReview,
        &[Role::ProjectManager, Role::ProjectCoordinator, Role::TeamMember],
    ),
    (
        TaskStatus::InProgress,
        TaskStatus::Todo,
        &[Role::ProjectManager, Role::ProjectCoordinator],
    ),
    (
        TaskStatus::PendingReview,
        TaskStatus::Done,
        &[Role::ProjectManager, Role::ProjectCoordinator],
    ),
    (
        TaskStatus::PendingReview,
        TaskStatus::InProgress,
        &[Role::ProjectManager, Role::ProjectCoordinator],
    ),
    (
        TaskStatus::Done,
        TaskStatus::InProgress,
        &[Role::ProjectManager],
    ),
    (
        TaskStatus::Blocked,
        TaskStatus::Todo,
        &[Role::ProjectManager, Role::ProjectCoordinator],
    ),
    (
        TaskStatus::Blocked,
        TaskStatus::InProgress,
        &[Role::ProjectManager, Role::ProjectCoordinator],
    ),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionCheck {
    pub allowed: bool,
    pub reason: Option<String>,
}

impl TransitionCheck {
    fn allowed() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    fn denied(reason: String) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
        }
    }
}

/// Checks one status change against the transition table for the given
/// effective role. Denials carry an actionable reason: either the pair is
/// unknown, or the reason names the roles that would be permitted.
pub fn validate_transition(from: TaskStatus, to: TaskStatus, role: Role) -> TransitionCheck {
    let entry = TRANSITIONS
        .iter()
        .find(|(table_from, table_to, _)| *table_from == from && *table_to == to);

    match entry {
        None => TransitionCheck::denied(format!("unknown transition: {from} -> {to}")),
        Some((_, _, roles)) if roles.contains(&role) => TransitionCheck::allowed(),
        Some((_, _, roles)) => {
            let permitted = roles
                .iter()
                .map(|role| role.label())
                .collect::<Vec<_>>()
                .join(", ");
            TransitionCheck::denied(format!(
                "moving a task from {from} to {to} requires one of: {permitted}"
            ))
        }
    }
}

/// What checking a task's completion box means for a role: Team Members
/// submit for approval, managers and coordinators mark done directly.
/// Pure policy; the result still has to pass `validate_transition`.
pub fn checkbox_action(role: Role) -> TaskStatus {
    match role {
        Role::TeamMember => TaskStatus::PendingReview,
        Role::ProjectManager | Role::ProjectCoordinator => TaskStatus::Done,
    }
}

impl Engine {
    /// Moves a task to a new status on behalf of an actor. On success the
    /// change is audited and fanned out as notifications; both side effects
    /// are best-effort and never fail the status change itself.
    pub async fn update_task_status(
        &self,
        task_id: Uuid,
        project_id: Uuid,
        actor_id: Uuid,
        new_status: TaskStatus,
    ) -> EngineResult<TaskOutcome> {
        match self
            .update_task_status_inner(task_id, project_id, actor_id, new_status)
            .await
        {
            Ok((message, task)) => Ok(TaskOutcome {
                success: true,
                message,
                task: Some(task),
            }),
            Err(err) if err.is_business() => Ok(TaskOutcome {
                success: false,
                message: err.to_string(),
                task: None,
            }),
            Err(err) => Err(err),
        }
    }

    async fn update_task_status_inner(
        &self,
        task_id: Uuid,
        project_id: Uuid,
        actor_id: Uuid,
        new_status: TaskStatus,
    ) -> EngineResult<(String, Task)> {
        let now = Utc::now();
        self.require_known_user(actor_id).await?;

        let task = self
            .store
            .find_task(task_id)
            .await?
            .filter(|task| task.project_id == project_id)
            .ok_or_else(|| EngineError::not_found("task"))?;

        let role = self.require_member_role(project_id, actor_id, now).await?;

        let from = TaskStatus::parse(&task.status).ok_or_else(|| {
            EngineError::infrastructure(format!(
                "task {task_id} has unrecognized status {:?}",
                task.status
            ))
        })?;

        let check = validate_transition(from, new_status, role);
        if !check.allowed {
            let reason = check
                .reason
                .unwrap_or_else(|| format!("transition {from} -> {new_status} is not permitted"));
            return Err(EngineError::InvalidTransition(reason));
        }

        let completion = if new_status == TaskStatus::Done {
            CompletionUpdate::Stamp {
                at: now.naive_utc(),
                by: actor_id,
            }
        } else if from == TaskStatus::Done {
            CompletionUpdate::Clear
        } else {
            CompletionUpdate::Keep
        };

        let updated = self
            .store
            .update_task_status(task_id, new_status, completion)
            .await?;

        self.record_audit(
            project_id,
            actor_id,
            ACTION_TASK_STATUS_CHANGED,
            ENTITY_TASK,
            task_id,
            &AuditChange::TaskStatusChange {
                old: from,
                new: new_status,
            },
        )
        .await;
        self.notify_task_transition(&updated, from, new_status).await;

        Ok((format!("task moved to {new_status}"), updated))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_matches_the_contract_exactly() {
        use Role::*;
        use TaskStatus::*;

        // Expected allowed set written out independently of TRANSITIONS.
        let allowed: &[(TaskStatus, TaskStatus, Role)] = &[
            (Todo, InProgress, ProjectManager),
            (Todo, InProgress, ProjectCoordinator),
            (Todo, InProgress, TeamMember),
            (InProgress, PendingReview, ProjectManager),
            (InProgress, PendingReview, ProjectCoordinator),
            (InProgress, PendingReview, TeamMember),
            (InProgress, Todo, ProjectManager),
            (InProgress, Todo, ProjectCoordinator),
            (PendingReview, Done, ProjectManager),
            (PendingReview, Done, ProjectCoordinator),
            (PendingReview, InProgress, ProjectManager),
            (PendingReview, InProgress, ProjectCoordinator),
            (Done, InProgress, ProjectManager),
            (Blocked, Todo, ProjectManager),
            (Blocked, Todo, ProjectCoordinator),
            (Blocked, InProgress, ProjectManager),
            (Blocked, InProgress, ProjectCoordinator),
        ];

        for from in TaskStatus::ALL {
            for to in TaskStatus::ALL {
                for role in Role::ALL {
                    let expected = allowed.contains(&(from, to, role));
                    let check = validate_transition(from, to, role);
                    assert_eq!(
                        check.allowed, expected,
                        "({from}, {to}, {role}) expected allowed={expected}"
                    );
                    if expected {
                        assert!(check.reason.is_none());
                    } else {
                        assert!(check.reason.is_some());
                    }
                }
            }
        }
    }

    #[test]
    fn unknown_pairs_say_so() {
        let check = validate_transition(TaskStatus::Todo, TaskStatus::Done, Role::ProjectManager);
        assert!(!check.allowed);
        assert!(check.reason.unwrap().contains("unknown transition"));
    }

    #[test]
    fn denial_reason_names_permitted_roles() {
        let check =
            validate_transition(TaskStatus::PendingReview, TaskStatus::Done, Role::TeamMember);
        assert!(!check.allowed);
        let reason = check.reason.unwrap();
        assert!(reason.contains("Project Manager"));
        assert!(reason.contains("Project Coordinator"));
    }

    #[test]
    fn checkbox_action_per_role() {
        assert_eq!(checkbox_action(Role::TeamMember), TaskStatus::PendingReview);
        assert_eq!(checkbox_action(Role::ProjectManager), TaskStatus::Done);
        assert_eq!(checkbox_action(Role::ProjectCoordinator), TaskStatus::Done);
    }
}
