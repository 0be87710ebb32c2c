use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::models::{
    AuditLogEntry, NewAuditLogEntry, NewNotification, NewProjectMembership, Notification, Project,
    ProjectMembership, Role, Task, TaskStatus, User,
};
use crate::store::{CompletionUpdate, NotificationSink, ProjectStore};

/// In-memory backend. One mutex guards all state, so the last-PM check and
/// the membership write it protects are trivially linearizable per store.
/// Used by the integration tests and by embedders who want the engine
/// without Postgres.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    users: HashMap<Uuid, User>,
    projects: HashMap<Uuid, Project>,
    memberships: HashMap<(Uuid, Uuid), ProjectMembership>,
    tasks: HashMap<Uuid, Task>,
    audit: Vec<AuditLogEntry>,
    notifications: Vec<Notification>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed_user(&self, username: &str) -> Uuid {
        let id = Uuid::new_v4();
        let mut inner = self.inner.lock().await;
        inner.users.insert(
            id,
            User {
                id,
                username: username.to_string(),
                created_at: Utc::now().naive_utc(),
            },
        );
        id
    }

    pub async fn seed_project(&self, name: &str, created_by: Uuid) -> Uuid {
        let id = Uuid::new_v4();
        let mut inner = self.inner.lock().await;
        inner.projects.insert(
            id,
            Project {
                id,
                name: name.to_string(),
                created_by,
                created_at: Utc::now().naive_utc(),
            },
        );
        id
    }

    pub async fn seed_membership(&self, project_id: Uuid, user_id: Uuid, role: Role) {
        self.seed_membership_with_delegation(project_id, user_id, role, None)
            .await;
    }

    pub async fn seed_membership_with_delegation(
        &self,
        project_id: Uuid,
        user_id: Uuid,
        role: Role,
        delegated_pm_until: Option<NaiveDateTime>,
    ) {
        let mut inner = self.inner.lock().await;
        inner.memberships.insert(
            (project_id, user_id),
            ProjectMembership {
                project_id,
                user_id,
                role: role.as_str().to_string(),
                delegated_pm_until,
                invited_by: None,
                joined_at: Utc::now().naive_utc(),
            },
        );
    }

    pub async fn seed_task(
        &self,
        project_id: Uuid,
        title: &str,
        status: TaskStatus,
        assignee_id: Option<Uuid>,
    ) -> Uuid {
        let id = Uuid::new_v4();
        let now = Utc::now().naive_utc();
        let mut inner = self.inner.lock().await;
        inner.tasks.insert(
            id,
            Task {
                id,
                project_id,
                title: title.to_string(),
                status: status.as_str().to_string(),
                assignee_id,
                completed_at: None,
                completed_by: None,
                created_at: now,
                updated_at: now,
            },
        );
        id
    }

    pub async fn notifications(&self) -> Vec<Notification> {
        self.inner.lock().await.notifications.clone()
    }

    pub async fn audit_entries(&self, project_id: Uuid) -> Vec<AuditLogEntry> {
        self.inner
            .lock()
            .await
            .audit
            .iter()
            .filter(|entry| entry.project_id == project_id)
            .cloned()
            .collect()
    }
}

impl MemoryInner {
    fn pm_count(&self, project_id: Uuid) -> usize {
        self.memberships
            .values()
            .filter(|member| {
                member.project_id == project_id
                    && member.stored_role() == Some(Role::ProjectManager)
            })
            .count()
    }
}

#[async_trait]
impl ProjectStore for MemoryStore {
    async fn user_exists(&self, user_id: Uuid) -> EngineResult<bool> {
        Ok(self.inner.lock().await.users.contains_key(&user_id))
    }

    async fn find_project(&self, project_id: Uuid) -> EngineResult<Option<Project>> {
        Ok(self.inner.lock().await.projects.get(&project_id).cloned())
    }

    async fn find_membership(
        &self,
        project_id: Uuid,
        user_id: Uuid,
    ) -> EngineResult<Option<ProjectMembership>> {
        Ok(self
            .inner
            .lock()
            .await
            .memberships
            .get(&(project_id, user_id))
            .cloned())
    }

    async fn list_memberships(&self, project_id: Uuid) -> EngineResult<Vec<ProjectMembership>> {
        Ok(self
            .inner
            .lock()
            .await
            .memberships
            .values()
            .filter(|member| member.project_id == project_id)
            .cloned()
            .collect())
    }

    async fn insert_membership(
        &self,
        member: NewProjectMembership,
    ) -> EngineResult<ProjectMembership> {
        let mut inner = self.inner.lock().await;
        let key = (member.project_id, member.user_id);
        if inner.memberships.contains_key(&key) {
            return Err(EngineError::already_exists(
                "user is already a member of this project",
            ));
        }
        let row = ProjectMembership {
            project_id: member.project_id,
            user_id: member.user_id,
            role: member.role,
            delegated_pm_until: None,
            invited_by: member.invited_by,
            joined_at: Utc::now().naive_utc(),
        };
        inner.memberships.insert(key, row.clone());
        Ok(row)
    }

    async fn update_member_role(
        &self,
        project_id: Uuid,
        user_id: Uuid,
        new_role: Role,
    ) -> EngineResult<ProjectMembership> {
        let mut inner = self.inner.lock().await;
        let pm_total = inner.pm_count(project_id);

        let row = inner
            .memberships
            .get_mut(&(project_id, user_id))
            .ok_or_else(|| EngineError::not_found("project member"))?;

        // Check and write happen under the same lock.
        if Role::parse(&row.role) == Some(Role::ProjectManager)
            && new_role != Role::ProjectManager
            && pm_total < 2
        {
            return Err(EngineError::invariant(
                "the project must have at least one Project Manager",
            ));
        }

        row.role = new_role.as_str().to_string();
        Ok(row.clone())
    }

    async fn update_delegation(
        &self,
        project_id: Uuid,
        user_id: Uuid,
        delegated_pm_until: Option<NaiveDateTime>,
    ) -> EngineResult<ProjectMembership> {
        let mut inner = self.inner.lock().await;
        let row = inner
            .memberships
            .get_mut(&(project_id, user_id))
            .ok_or_else(|| EngineError::not_found("project member"))?;
        row.delegated_pm_until = delegated_pm_until;
        Ok(row.clone())
    }

    async fn delete_membership(&self, project_id: Uuid, user_id: Uuid) -> EngineResult<()> {
        let mut inner = self.inner.lock().await;

        let current = inner
            .memberships
            .get(&(project_id, user_id))
            .cloned()
            .ok_or_else(|| EngineError::not_found("project member"))?;

        if current.stored_role() == Some(Role::ProjectManager) && inner.pm_count(project_id) < 2 {
            return Err(EngineError::invariant(
                "the project must have at least one Project Manager",
            ));
        }

        inner.memberships.remove(&(project_id, user_id));
        Ok(())
    }

    async fn count_role(&self, project_id: Uuid, role: Role) -> EngineResult<i64> {
        let inner = self.inner.lock().await;
        Ok(inner
            .memberships
            .values()
            .filter(|member| member.project_id == project_id && member.stored_role() == Some(role))
            .count() as i64)
    }

    async fn find_task(&self, task_id: Uuid) -> EngineResult<Option<Task>> {
        Ok(self.inner.lock().await.tasks.get(&task_id).cloned())
    }

    async fn update_task_status(
        &self,
        task_id: Uuid,
        new_status: TaskStatus,
        completion: CompletionUpdate,
    ) -> EngineResult<Task> {
        let mut inner = self.inner.lock().await;
        let task = inner
            .tasks
            .get_mut(&task_id)
            .ok_or_else(|| EngineError::not_found("task"))?;

        task.status = new_status.as_str().to_string();
        task.updated_at = Utc::now().naive_utc();
        match completion {
            CompletionUpdate::Stamp { at, by } => {
                task.completed_at = Some(at);
                task.completed_by = Some(by);
            }
            CompletionUpdate::Clear => {
                task.completed_at = None;
                task.completed_by = None;
            }
            CompletionUpdate::Keep => {}
        }

        Ok(task.clone())
    }

    async fn insert_audit(&self, entry: NewAuditLogEntry) -> EngineResult<()> {
        let mut inner = self.inner.lock().await;
        inner.audit.push(AuditLogEntry {
            id: entry.id,
            project_id: entry.project_id,
            actor_id: entry.actor_id,
            action: entry.action,
            entity_type: entry.entity_type,
            entity_id: entry.entity_id,
            old_value: entry.old_value,
            new_value: entry.new_value,
            created_at: Utc::now().naive_utc(),
        });
        Ok(())
    }

    async fn list_audit(&self, project_id: Uuid, limit: i64) -> EngineResult<Vec<AuditLogEntry>> {
        let inner = self.inner.lock().await;
        let mut entries: Vec<AuditLogEntry> = inner
            .audit
            .iter()
            .filter(|entry| entry.project_id == project_id)
            .cloned()
            .collect();
        // Insertion order is chronological; newest first for callers.
        entries.reverse();
        entries.truncate(limit.max(0) as usize);
        Ok(entries)
    }
}

#[async_trait]
impl NotificationSink for MemoryStore {
    async fn deliver(&self, batch: Vec<NewNotification>) -> EngineResult<()> {
        let mut inner = self.inner.lock().await;
        let now = Utc::now().naive_utc();
        for event in batch {
            inner.notifications.push(Notification {
                id: event.id,
                user_id: event.user_id,
                project_id: event.project_id,
                kind: event.kind,
                title: event.title,
                message: event.message,
                entity_type: event.entity_type,
                entity_id: event.entity_id,
                read: false,
                created_at: now,
            });
        }
        Ok(())
    }
}
