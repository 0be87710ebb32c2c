use crate::models::Role;

/// Capabilities granted by the permission matrix. Role restrictions that
/// depend on the *target* of an operation (a coordinator may only invite
/// Team Members, for example) live in the membership engine, not here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    InviteMembers,
    RemoveMembers,
    ChangeRoles,
    CreateTasks,
    DeleteTasks,
    CompleteTasks,
    SubmitForReview,
    ReopenTasks,
    DelegatePm,
    ViewAuditLog,
    AddComments,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::InviteMembers => "invite_members",
            Capability::RemoveMembers => "remove_members",
            Capability::ChangeRoles => "change_roles",
            Capability::CreateTasks => "create_tasks",
            Capability::DeleteTasks => "delete_tasks",
            Capability::CompleteTasks => "complete_tasks",
            Capability::SubmitForReview => "submit_for_review",
            Capability::ReopenTasks => "reopen_tasks",
            Capability::DelegatePm => "delegate_pm",
            Capability::ViewAuditLog => "view_audit_log",
            Capability::AddComments => "add_comments",
        }
    }
}

/// Static role/capability matrix. Pure lookup: deterministic, no I/O, and
/// independent of time. Delegation is resolved *before* this is consulted,
/// so a delegated coordinator shows up here as a Project Manager.
pub fn has_permission(role: Role, capability: Capability) -> bool {
    use Capability::*;

    match role {
        Role::ProjectManager => true,
        Role::ProjectCoordinator => matches!(
            capability,
            InviteMembers
                | RemoveMembers
                | CreateTasks
                | DeleteTasks
                | CompleteTasks
                | SubmitForReview
                | ViewAuditLog
                | AddComments
        ),
        Role::TeamMember => matches!(capability, CreateTasks | SubmitForReview | AddComments),
    }
}

pub fn is_pm_or_pc(role: Role) -> bool {
    matches!(role, Role::ProjectManager | Role::ProjectCoordinator)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn managers_hold_every_capability() {
        let all = [
            Capability::InviteMembers,
            Capability::RemoveMembers,
            Capability::ChangeRoles,
            Capability::CreateTasks,
            Capability::DeleteTasks,
            Capability::CompleteTasks,
            Capability::SubmitForReview,
            Capability::ReopenTasks,
            Capability::DelegatePm,
            Capability::ViewAuditLog,
            Capability::AddComments,
        ];
        for capability in all {
            assert!(has_permission(Role::ProjectManager, capability));
        }
    }

    #[test]
    fn coordinators_cannot_change_roles_or_delegate() {
        assert!(!has_permission(Role::ProjectCoordinator, Capability::ChangeRoles));
        assert!(!has_permission(Role::ProjectCoordinator, Capability::DelegatePm));
        assert!(!has_permission(Role::ProjectCoordinator, Capability::ReopenTasks));
        assert!(has_permission(Role::ProjectCoordinator, Capability::InviteMembers));
        assert!(has_permission(Role::ProjectCoordinator, Capability::ViewAuditLog));
    }

    #[test]
    fn team_members_have_the_narrow_set() {
        assert!(has_permission(Role::TeamMember, Capability::SubmitForReview));
        assert!(has_permission(Role::TeamMember, Capability::CreateTasks));
        assert!(has_permission(Role::TeamMember, Capability::AddComments));
        assert!(!has_permission(Role::TeamMember, Capability::CompleteTasks));
        assert!(!has_permission(Role::TeamMember, Capability::InviteMembers));
        assert!(!has_permission(Role::TeamMember, Capability::ViewAuditLog));
    }

    #[test]
    fn pm_or_pc_predicate() {
        assert!(is_pm_or_pc(Role::ProjectManager));
        assert!(is_pm_or_pc(Role::ProjectCoordinator));
        assert!(!is_pm_or_pc(Role::TeamMember));
    }
}
