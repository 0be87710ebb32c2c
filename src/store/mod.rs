use async_trait::async_trait;
use chrono::NaiveDateTime;
use uuid::Uuid;

use crate::error::EngineResult;
use crate::models::{
    AuditLogEntry, NewAuditLogEntry, NewNotification, NewProjectMembership, Project,
    ProjectMembership, Role, Task, TaskStatus,
};

pub mod memory;
pub mod pg;

pub use memory::MemoryStore;
pub use pg::PgStore;

/// Completion bookkeeping applied alongside a status write: entering `done`
/// stamps provenance, leaving `done` clears it.
#[derive(Debug, Clone, Copy)]
pub enum CompletionUpdate {
    Stamp { at: NaiveDateTime, by: Uuid },
    Clear,
    Keep,
}

/// Narrow persistence interface the engine talks through. Backends must make
/// `update_member_role` and `delete_membership` enforce the last-PM invariant
/// atomically with the write itself (row locks or a serializable
/// transaction), never as a separate count query the caller runs first.
#[async_trait]
pub trait ProjectStore: Send + Sync + 'static {
    async fn user_exists(&self, user_id: Uuid) -> EngineResult<bool>;

    async fn find_project(&self, project_id: Uuid) -> EngineResult<Option<Project>>;

    async fn find_membership(
        &self,
        project_id: Uuid,
        user_id: Uuid,
    ) -> EngineResult<Option<ProjectMembership>>;

    async fn list_memberships(&self, project_id: Uuid) -> EngineResult<Vec<ProjectMembership>>;

    /// Inserts a membership row; a duplicate (project, user) pair is an
    /// `AlreadyExists` failure, not a silent upsert.
    async fn insert_membership(
        &self,
        member: NewProjectMembership,
    ) -> EngineResult<ProjectMembership>;

    /// Rewrites a member's stored role. Fails with `InvariantViolation` when
    /// the write would leave the project without a Project Manager.
    async fn update_member_role(
        &self,
        project_id: Uuid,
        user_id: Uuid,
        new_role: Role,
    ) -> EngineResult<ProjectMembership>;

    async fn update_delegation(
        &self,
        project_id: Uuid,
        user_id: Uuid,
        delegated_pm_until: Option<NaiveDateTime>,
    ) -> EngineResult<ProjectMembership>;

    /// Deletes a membership row, guarded by the same last-PM invariant as
    /// `update_member_role`.
    async fn delete_membership(&self, project_id: Uuid, user_id: Uuid) -> EngineResult<()>;

    async fn count_role(&self, project_id: Uuid, role: Role) -> EngineResult<i64>;

    async fn find_task(&self, task_id: Uuid) -> EngineResult<Option<Task>>;

    async fn update_task_status(
        &self,
        task_id: Uuid,
        new_status: TaskStatus,
        completion: CompletionUpdate,
    ) -> EngineResult<Task>;

    async fn insert_audit(&self, entry: NewAuditLogEntry) -> EngineResult<()>;

    /// Audit rows for a project, newest first.
    async fn list_audit(&self, project_id: Uuid, limit: i64) -> EngineResult<Vec<AuditLogEntry>>;
}

/// Delivery collaborator for notification fan-out. Row-writing stores,
/// real-time push and no-op backends are all valid implementations; the
/// engine only hands over a batch and forgets about it.
#[async_trait]
pub trait NotificationSink: Send + Sync + 'static {
    async fn deliver(&self, batch: Vec<NewNotification>) -> EngineResult<()>;
}
