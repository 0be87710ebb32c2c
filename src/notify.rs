use uuid::Uuid;

use crate::audit::{ENTITY_MEMBER, ENTITY_TASK};
use crate::engine::Engine;
use crate::error::EngineResult;
use crate::models::{NewNotification, Role, Task, TaskStatus};
use crate::permissions::is_pm_or_pc;

pub const KIND_TASK_PENDING_REVIEW: &str = "task_pending_review";
pub const KIND_TASK_APPROVED: &str = "task_approved";
pub const KIND_TASK_SENT_BACK: &str = "task_sent_back";
pub const KIND_MEMBER_ADDED: &str = "member_added";
pub const KIND_MEMBER_REMOVED: &str = "member_removed";
pub const KIND_MEMBER_ROLE_CHANGED: &str = "member_role_changed";
pub const KIND_PM_DELEGATED: &str = "pm_delegated";
pub const KIND_PM_DELEGATION_REVOKED: &str = "pm_delegation_revoked";

fn event(
    user_id: Uuid,
    project_id: Uuid,
    kind: &str,
    title: impl Into<String>,
    message: impl Into<String>,
    entity_type: &str,
    entity_id: Uuid,
) -> NewNotification {
    NewNotification {
        id: Uuid::new_v4(),
        user_id,
        project_id: Some(project_id),
        kind: kind.to_string(),
        title: title.into(),
        message: message.into(),
        entity_type: Some(entity_type.to_string()),
        entity_id: Some(entity_id),
    }
}

impl Engine {
    /// Fans out notifications for a committed task transition. Best-effort
    /// throughout: a failure to assemble or deliver the batch is logged and
    /// otherwise dropped, and never reaches the caller of the mutation.
    pub(crate) async fn notify_task_transition(
        &self,
        task: &Task,
        from: TaskStatus,
        to: TaskStatus,
    ) {
        match self.task_transition_batch(task, from, to).await {
            Ok(batch) => self.deliver(batch).await,
            Err(err) => {
                tracing::warn!(task_id = %task.id, "skipping task notification fan-out: {err}");
            }
        }
    }

    async fn task_transition_batch(
        &self,
        task: &Task,
        from: TaskStatus,
        to: TaskStatus,
    ) -> EngineResult<Vec<NewNotification>> {
        let batch = match (from, to) {
            // A review request goes to everyone who could approve it.
            (_, TaskStatus::PendingReview) => {
                let members = self.store.list_memberships(task.project_id).await?;
                members
                    .iter()
                    .filter(|member| member.stored_role().is_some_and(is_pm_or_pc))
                    .map(|member| {
                        event(
                            member.user_id,
                            task.project_id,
                            KIND_TASK_PENDING_REVIEW,
                            "Task awaiting review",
                            format!("\"{}\" was submitted for review", task.title),
                            ENTITY_TASK,
                            task.id,
                        )
                    })
                    .collect()
            }
            (TaskStatus::PendingReview, TaskStatus::Done) => assignee_events(
                task,
                KIND_TASK_APPROVED,
                "Task approved",
                format!("\"{}\" was approved and marked done", task.title),
            ),
            (TaskStatus::PendingReview, TaskStatus::InProgress) => assignee_events(
                task,
                KIND_TASK_SENT_BACK,
                "Task sent back",
                format!("\"{}\" was sent back for more work", task.title),
            ),
            _ => Vec::new(),
        };

        Ok(batch)
    }

    pub(crate) async fn notify_member_added(&self, project_id: Uuid, user_id: Uuid, role: Role) {
        let project = self.project_name(project_id).await;
        self.deliver(vec![event(
            user_id,
            project_id,
            KIND_MEMBER_ADDED,
            "Added to project",
            format!("you joined {project} as {}", role.label()),
            ENTITY_MEMBER,
            user_id,
        )])
        .await;
    }

    pub(crate) async fn notify_member_removed(&self, project_id: Uuid, user_id: Uuid) {
        let project = self.project_name(project_id).await;
        self.deliver(vec![event(
            user_id,
            project_id,
            KIND_MEMBER_REMOVED,
            "Removed from project",
            format!("you are no longer a member of {project}"),
            ENTITY_MEMBER,
            user_id,
        )])
        .await;
    }

    pub(crate) async fn notify_role_changed(&self, project_id: Uuid, user_id: Uuid, role: Role) {
        let project = self.project_name(project_id).await;
        self.deliver(vec![event(
            user_id,
            project_id,
            KIND_MEMBER_ROLE_CHANGED,
            "Project role changed",
            format!("your role in {project} is now {}", role.label()),
            ENTITY_MEMBER,
            user_id,
        )])
        .await;
    }

    pub(crate) async fn notify_delegation(
        &self,
        project_id: Uuid,
        user_id: Uuid,
        granted: bool,
    ) {
        let project = self.project_name(project_id).await;
        let (kind, title, message) = if granted {
            (
                KIND_PM_DELEGATED,
                "PM rights delegated",
                format!("you temporarily hold Project Manager rights in {project}"),
            )
        } else {
            (
                KIND_PM_DELEGATION_REVOKED,
                "PM delegation revoked",
                format!("your delegated Project Manager rights in {project} were revoked"),
            )
        };
        self.deliver(vec![event(
            user_id, project_id, kind, title, message, ENTITY_MEMBER, user_id,
        )])
        .await;
    }

    async fn project_name(&self, project_id: Uuid) -> String {
        match self.store.find_project(project_id).await {
            Ok(Some(project)) => project.name,
            _ => "the project".to_string(),
        }
    }

    async fn deliver(&self, batch: Vec<NewNotification>) {
        if batch.is_empty() {
            return;
        }
        let count = batch.len();
        if let Err(err) = self.notifier.deliver(batch).await {
            tracing::warn!(count, "notification delivery failed: {err}");
        }
    }
}

fn assignee_events(
    task: &Task,
    kind: &str,
    title: &str,
    message: String,
) -> Vec<NewNotification> {
    match task.assignee_id {
        Some(assignee) => vec![event(
            assignee,
            task.project_id,
            kind,
            title,
            message,
            ENTITY_TASK,
            task.id,
        )],
        None => Vec::new(),
    }
}
