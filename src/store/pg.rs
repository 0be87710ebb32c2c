use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use diesel::dsl::exists;
use diesel::prelude::*;
use diesel::PgConnection;
use uuid::Uuid;

use crate::db::{PgPool, PgPooledConnection};
use crate::error::{EngineError, EngineResult};
use crate::models::{
    AuditLogEntry, NewAuditLogEntry, NewNotification, NewProjectMembership, Project,
    ProjectMembership, Role, Task, TaskStatus,
};
use crate::schema::{audit_log, notifications, project_members, projects, tasks, users};
use crate::store::{CompletionUpdate, NotificationSink, ProjectStore};

/// Postgres backend. The role-mutating writes take `FOR UPDATE` locks on the
/// project's membership rows inside one transaction, so the last-PM count
/// and the write it guards are linearizable per project.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> EngineResult<PgPooledConnection> {
        self.pool
            .get()
            .map_err(|err| EngineError::infrastructure(format!("database pool error: {err}")))
    }
}

fn lock_project_members(
    conn: &mut PgConnection,
    project_id: Uuid,
) -> Result<Vec<ProjectMembership>, diesel::result::Error> {
    project_members::table
        .filter(project_members::project_id.eq(project_id))
        .for_update()
        .load(conn)
}

fn pm_count(members: &[ProjectMembership]) -> usize {
    members
        .iter()
        .filter(|member| member.stored_role() == Some(Role::ProjectManager))
        .count()
}

#[async_trait]
impl ProjectStore for PgStore {
    async fn user_exists(&self, user_id: Uuid) -> EngineResult<bool> {
        let mut conn = self.conn()?;
        let present: bool =
            diesel::select(exists(users::table.find(user_id))).get_result(&mut conn)?;
        Ok(present)
    }

    async fn find_project(&self, project_id: Uuid) -> EngineResult<Option<Project>> {
        let mut conn = self.conn()?;
        let project = projects::table
            .find(project_id)
            .first::<Project>(&mut conn)
            .optional()?;
        Ok(project)
    }

    async fn find_membership(
        &self,
        project_id: Uuid,
        user_id: Uuid,
    ) -> EngineResult<Option<ProjectMembership>> {
        let mut conn = self.conn()?;
        let membership = project_members::table
            .find((project_id, user_id))
            .first::<ProjectMembership>(&mut conn)
            .optional()?;
        Ok(membership)
    }

    async fn list_memberships(&self, project_id: Uuid) -> EngineResult<Vec<ProjectMembership>> {
        let mut conn = self.conn()?;
        let members = project_members::table
            .filter(project_members::project_id.eq(project_id))
            .order(project_members::joined_at.asc())
            .load(&mut conn)?;
        Ok(members)
    }

    async fn insert_membership(
        &self,
        member: NewProjectMembership,
    ) -> EngineResult<ProjectMembership> {
        let mut conn = self.conn()?;
        let key = (member.project_id, member.user_id);

        diesel::insert_into(project_members::table)
            .values(&member)
            .execute(&mut conn)
            .map_err(|err| match err {
                diesel::result::Error::DatabaseError(
                    diesel::result::DatabaseErrorKind::UniqueViolation,
                    _,
                ) => EngineError::already_exists("user is already a member of this project"),
                other => EngineError::from(other),
            })?;

        let row = project_members::table.find(key).first(&mut conn)?;
        Ok(row)
    }

    async fn update_member_role(
        &self,
        project_id: Uuid,
        user_id: Uuid,
        new_role: Role,
    ) -> EngineResult<ProjectMembership> {
        let mut conn = self.conn()?;

        conn.transaction::<ProjectMembership, EngineError, _>(|conn| {
            let members = lock_project_members(conn, project_id)?;
            let current = members
                .iter()
                .find(|member| member.user_id == user_id)
                .ok_or_else(|| EngineError::not_found("project member"))?;

            if current.stored_role() == Some(Role::ProjectManager)
                && new_role != Role::ProjectManager
                && pm_count(&members) < 2
            {
                return Err(EngineError::invariant(
                    "the project must have at least one Project Manager",
                ));
            }

            diesel::update(project_members::table.find((project_id, user_id)))
                .set(project_members::role.eq(new_role.as_str()))
                .execute(conn)?;

            let row = project_members::table
                .find((project_id, user_id))
                .first(conn)?;
            Ok(row)
        })
    }

    async fn update_delegation(
        &self,
        project_id: Uuid,
        user_id: Uuid,
        delegated_pm_until: Option<NaiveDateTime>,
    ) -> EngineResult<ProjectMembership> {
        let mut conn = self.conn()?;

        let affected = diesel::update(project_members::table.find((project_id, user_id)))
            .set(project_members::delegated_pm_until.eq(delegated_pm_until))
            .execute(&mut conn)?;
        if affected == 0 {
            return Err(EngineError::not_found("project member"));
        }

        let row = project_members::table
            .find((project_id, user_id))
            .first(&mut conn)?;
        Ok(row)
    }

    async fn delete_membership(&self, project_id: Uuid, user_id: Uuid) -> EngineResult<()> {
        let mut conn = self.conn()?;

        conn.transaction::<(), EngineError, _>(|conn| {
            let members = lock_project_members(conn, project_id)?;
            let current = members
                .iter()
                .find(|member| member.user_id == user_id)
                .ok_or_else(|| EngineError::not_found("project member"))?;

            if current.stored_role() == Some(Role::ProjectManager) && pm_count(&members) < 2 {
                return Err(EngineError::invariant(
                    "the project must have at least one Project Manager",
                ));
            }

            diesel::delete(project_members::table.find((project_id, user_id))).execute(conn)?;
            Ok(())
        })
    }

    async fn count_role(&self, project_id: Uuid, role: Role) -> EngineResult<i64> {
        let mut conn = self.conn()?;
        let count = project_members::table
            .filter(project_members::project_id.eq(project_id))
            .filter(project_members::role.eq(role.as_str()))
            .count()
            .get_result(&mut conn)?;
        Ok(count)
    }

    async fn find_task(&self, task_id: Uuid) -> EngineResult<Option<Task>> {
        let mut conn = self.conn()?;
        let task = tasks::table
            .find(task_id)
            .first::<Task>(&mut conn)
            .optional()?;
        Ok(task)
    }

    async fn update_task_status(
        &self,
        task_id: Uuid,
        new_status: TaskStatus,
        completion: CompletionUpdate,
    ) -> EngineResult<Task> {
        let mut conn = self.conn()?;
        let now = Utc::now().naive_utc();
        let target = tasks::table.find(task_id);

        let affected = match completion {
            CompletionUpdate::Stamp { at, by } => diesel::update(target)
                .set((
                    tasks::status.eq(new_status.as_str()),
                    tasks::completed_at.eq(Some(at)),
                    tasks::completed_by.eq(Some(by)),
                    tasks::updated_at.eq(now),
                ))
                .execute(&mut conn)?,
            CompletionUpdate::Clear => diesel::update(target)
                .set((
                    tasks::status.eq(new_status.as_str()),
                    tasks::completed_at.eq::<Option<NaiveDateTime>>(None),
                    tasks::completed_by.eq::<Option<Uuid>>(None),
                    tasks::updated_at.eq(now),
                ))
                .execute(&mut conn)?,
            CompletionUpdate::Keep => diesel::update(target)
                .set((
                    tasks::status.eq(new_status.as_str()),
                    tasks::updated_at.eq(now),
                ))
                .execute(&mut conn)?,
        };
        if affected == 0 {
            return Err(EngineError::not_found("task"));
        }

        let task = tasks::table.find(task_id).first(&mut conn)?;
        Ok(task)
    }

    async fn insert_audit(&self, entry: NewAuditLogEntry) -> EngineResult<()> {
        let mut conn = self.conn()?;
        diesel::insert_into(audit_log::table)
            .values(&entry)
            .execute(&mut conn)?;
        Ok(())
    }

    async fn list_audit(&self, project_id: Uuid, limit: i64) -> EngineResult<Vec<AuditLogEntry>> {
        let mut conn = self.conn()?;
        let entries = audit_log::table
            .filter(audit_log::project_id.eq(project_id))
            .order(audit_log::created_at.desc())
            .limit(limit.max(0))
            .load(&mut conn)?;
        Ok(entries)
    }
}

#[async_trait]
impl NotificationSink for PgStore {
    async fn deliver(&self, batch: Vec<NewNotification>) -> EngineResult<()> {
        let mut conn = self.conn()?;
        diesel::insert_into(notifications::table)
            .values(&batch)
            .execute(&mut conn)?;
        Ok(())
    }
}
