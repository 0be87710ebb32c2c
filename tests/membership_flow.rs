mod common;

use common::project_with_manager;
use crewline::audit::{ACTION_MEMBER_ADDED, ACTION_MEMBER_REMOVED};
use crewline::models::Role;
use crewline::notify::{KIND_MEMBER_ADDED, KIND_MEMBER_REMOVED, KIND_MEMBER_ROLE_CHANGED};
use crewline::store::ProjectStore;
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn manager_adds_member_with_audit_and_notification() {
    let project = project_with_manager().await;
    let newcomer = project.user("newcomer").await;

    let outcome = project
        .engine
        .add_member(
            project.project_id,
            project.manager_id,
            newcomer,
            Role::TeamMember,
        )
        .await
        .unwrap();
    assert!(outcome.success, "{}", outcome.message);

    let membership = project
        .store
        .find_membership(project.project_id, newcomer)
        .await
        .unwrap()
        .expect("membership row");
    assert_eq!(membership.stored_role(), Some(Role::TeamMember));
    assert_eq!(membership.invited_by, Some(project.manager_id));

    let audit = project.store.audit_entries(project.project_id).await;
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].action, ACTION_MEMBER_ADDED);
    assert_eq!(audit[0].actor_id, project.manager_id);
    assert_eq!(
        audit[0].old_value,
        json!({ "type": "member_role", "value": null })
    );
    assert_eq!(
        audit[0].new_value,
        json!({ "type": "member_role", "value": "team_member" })
    );

    let notifications = project.store.notifications().await;
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].user_id, newcomer);
    assert_eq!(notifications[0].kind, KIND_MEMBER_ADDED);
    assert!(!notifications[0].read);
}

#[tokio::test]
async fn duplicate_membership_is_a_distinct_failure() {
    let project = project_with_manager().await;
    let newcomer = project.user("newcomer").await;

    let first = project
        .engine
        .add_member(
            project.project_id,
            project.manager_id,
            newcomer,
            Role::TeamMember,
        )
        .await
        .unwrap();
    assert!(first.success);

    let second = project
        .engine
        .add_member(
            project.project_id,
            project.manager_id,
            newcomer,
            Role::TeamMember,
        )
        .await
        .unwrap();
    assert!(!second.success);
    assert!(second.message.contains("already a member"));

    // Rejected attempt left no audit trail behind.
    assert_eq!(project.store.audit_entries(project.project_id).await.len(), 1);
}

#[tokio::test]
async fn missing_target_user_is_not_found() {
    let project = project_with_manager().await;

    let outcome = project
        .engine
        .add_member(
            project.project_id,
            project.manager_id,
            Uuid::new_v4(),
            Role::TeamMember,
        )
        .await
        .unwrap();
    assert!(!outcome.success);
    assert!(outcome.message.contains("user not found"));
}

#[tokio::test]
async fn unknown_actor_is_unauthenticated() {
    let project = project_with_manager().await;
    let newcomer = project.user("newcomer").await;

    let outcome = project
        .engine
        .add_member(project.project_id, Uuid::new_v4(), newcomer, Role::TeamMember)
        .await
        .unwrap();
    assert!(!outcome.success);
    assert!(outcome.message.contains("no resolvable acting user"));
}

#[tokio::test]
async fn coordinator_invites_are_limited_to_team_members() {
    let project = project_with_manager().await;
    let coordinator = project.member("coordinator", Role::ProjectCoordinator).await;

    for blocked in [Role::ProjectManager, Role::ProjectCoordinator] {
        let target = project.user(&format!("target-{blocked}")).await;
        let outcome = project
            .engine
            .add_member(project.project_id, coordinator, target, blocked)
            .await
            .unwrap();
        assert!(!outcome.success);
        assert!(outcome.message.contains("only invite Team Members"));
    }

    let target = project.user("target-tm").await;
    let outcome = project
        .engine
        .add_member(project.project_id, coordinator, target, Role::TeamMember)
        .await
        .unwrap();
    assert!(outcome.success, "{}", outcome.message);
}

#[tokio::test]
async fn team_member_cannot_invite() {
    let project = project_with_manager().await;
    let member = project.member("worker", Role::TeamMember).await;
    let target = project.user("target").await;

    let outcome = project
        .engine
        .add_member(project.project_id, member, target, Role::TeamMember)
        .await
        .unwrap();
    assert!(!outcome.success);
    assert!(outcome.message.contains("invite_members"));
}

#[tokio::test]
async fn project_creator_without_row_acts_as_manager() {
    let project = project_with_manager().await;
    let store = &project.store;

    let creator = store.seed_user("founder").await;
    let side_project = store.seed_project("Skunkworks", creator).await;
    let target = project.user("hire").await;

    let outcome = project
        .engine
        .add_member(side_project, creator, target, Role::ProjectCoordinator)
        .await
        .unwrap();
    assert!(outcome.success, "{}", outcome.message);
}

#[tokio::test]
async fn role_change_requires_the_change_roles_capability() {
    let project = project_with_manager().await;
    let coordinator = project.member("coordinator", Role::ProjectCoordinator).await;
    let member = project.member("worker", Role::TeamMember).await;

    let outcome = project
        .engine
        .change_member_role(project.project_id, coordinator, member, Role::ProjectCoordinator)
        .await
        .unwrap();
    assert!(!outcome.success);
    assert!(outcome.message.contains("change_roles"));
}

#[tokio::test]
async fn manager_promotes_member_and_target_is_notified() {
    let project = project_with_manager().await;
    let member = project.member("worker", Role::TeamMember).await;

    let outcome = project
        .engine
        .change_member_role(
            project.project_id,
            project.manager_id,
            member,
            Role::ProjectCoordinator,
        )
        .await
        .unwrap();
    assert!(outcome.success, "{}", outcome.message);

    let membership = project
        .store
        .find_membership(project.project_id, member)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(membership.stored_role(), Some(Role::ProjectCoordinator));

    let notifications = project.store.notifications().await;
    assert!(notifications
        .iter()
        .any(|n| n.user_id == member && n.kind == KIND_MEMBER_ROLE_CHANGED));
}

#[tokio::test]
async fn demoting_the_sole_manager_fails_even_for_the_manager() {
    let project = project_with_manager().await;

    let outcome = project
        .engine
        .change_member_role(
            project.project_id,
            project.manager_id,
            project.manager_id,
            Role::TeamMember,
        )
        .await
        .unwrap();
    assert!(!outcome.success);
    assert!(outcome.message.contains("at least one Project Manager"));

    // Nothing was written.
    let membership = project
        .store
        .find_membership(project.project_id, project.manager_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(membership.stored_role(), Some(Role::ProjectManager));
    assert!(project.store.audit_entries(project.project_id).await.is_empty());
}

#[tokio::test]
async fn demotion_succeeds_when_a_second_manager_exists() {
    let project = project_with_manager().await;
    let second = project.member("deputy", Role::ProjectManager).await;

    let outcome = project
        .engine
        .change_member_role(project.project_id, project.manager_id, second, Role::TeamMember)
        .await
        .unwrap();
    assert!(outcome.success, "{}", outcome.message);
    assert_eq!(
        project
            .store
            .count_role(project.project_id, Role::ProjectManager)
            .await
            .unwrap(),
        1
    );
}

#[tokio::test]
async fn concurrent_demotions_never_drop_the_last_manager() {
    let project = project_with_manager().await;
    let second = project.member("deputy", Role::ProjectManager).await;

    let (left, right) = tokio::join!(
        project.engine.change_member_role(
            project.project_id,
            project.manager_id,
            second,
            Role::TeamMember,
        ),
        project.engine.change_member_role(
            project.project_id,
            second,
            project.manager_id,
            Role::TeamMember,
        ),
    );

    let left = left.unwrap();
    let right = right.unwrap();
    assert!(
        !(left.success && right.success),
        "both demotions succeeded: {} / {}",
        left.message,
        right.message
    );
    let remaining = project
        .store
        .count_role(project.project_id, Role::ProjectManager)
        .await
        .unwrap();
    assert!(remaining >= 1, "project ended with {remaining} managers");
}

#[tokio::test]
async fn members_may_remove_themselves() {
    let project = project_with_manager().await;
    let member = project.member("worker", Role::TeamMember).await;

    let outcome = project
        .engine
        .remove_member(project.project_id, member, member)
        .await
        .unwrap();
    assert!(outcome.success, "{}", outcome.message);
    assert!(project
        .store
        .find_membership(project.project_id, member)
        .await
        .unwrap()
        .is_none());

    let audit = project.store.audit_entries(project.project_id).await;
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].action, ACTION_MEMBER_REMOVED);

    let notifications = project.store.notifications().await;
    assert!(notifications
        .iter()
        .any(|n| n.user_id == member && n.kind == KIND_MEMBER_REMOVED));
}

#[tokio::test]
async fn coordinator_removes_only_team_members() {
    let project = project_with_manager().await;
    let coordinator = project.member("coordinator", Role::ProjectCoordinator).await;
    let other_pc = project.member("other-pc", Role::ProjectCoordinator).await;
    let worker = project.member("worker", Role::TeamMember).await;

    let blocked = project
        .engine
        .remove_member(project.project_id, coordinator, other_pc)
        .await
        .unwrap();
    assert!(!blocked.success);
    assert!(blocked.message.contains("only remove Team Members"));

    let blocked = project
        .engine
        .remove_member(project.project_id, coordinator, project.manager_id)
        .await
        .unwrap();
    assert!(!blocked.success);

    let allowed = project
        .engine
        .remove_member(project.project_id, coordinator, worker)
        .await
        .unwrap();
    assert!(allowed.success, "{}", allowed.message);
}

#[tokio::test]
async fn removing_the_last_manager_fails() {
    let project = project_with_manager().await;

    let outcome = project
        .engine
        .remove_member(project.project_id, project.manager_id, project.manager_id)
        .await
        .unwrap();
    assert!(!outcome.success);
    assert!(outcome.message.contains("at least one Project Manager"));

    let outcome = project
        .engine
        .remove_member(project.project_id, project.manager_id, Uuid::new_v4())
        .await
        .unwrap();
    assert!(!outcome.success);
    assert!(outcome.message.contains("not found"));
}
