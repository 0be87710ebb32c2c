use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::EngineResult;
use crate::models::Role;
use crate::store::ProjectStore;

/// Resolves the role a user holds in a project *right now*, which is the
/// only role authorization decisions may use. `None` means not a member.
///
/// Two wrinkles over a plain row lookup:
/// - a project's creator is an implicit Project Manager even without a
///   membership row (ownership fallback);
/// - a Project Coordinator with `delegated_pm_until` strictly in the future
///   acts as a Project Manager for the duration of the window. Expiry is
///   evaluated lazily here; nothing ever sweeps stale delegations.
///
/// Every component calls this instead of re-deriving role state, and nothing
/// caches the answer across operations.
pub async fn resolve_effective_role(
    store: &dyn ProjectStore,
    project_id: Uuid,
    user_id: Uuid,
    now: DateTime<Utc>,
) -> EngineResult<Option<Role>> {
    if let Some(membership) = store.find_membership(project_id, user_id).await? {
        let stored = membership.stored_role();
        if stored == Some(Role::ProjectCoordinator) {
            if let Some(until) = membership.delegated_pm_until {
                if until > now.naive_utc() {
                    return Ok(Some(Role::ProjectManager));
                }
            }
        }
        return Ok(stored);
    }

    let owner = store
        .find_project(project_id)
        .await?
        .map(|project| project.created_by);
    match owner {
        Some(creator) if creator == user_id => Ok(Some(Role::ProjectManager)),
        _ => Ok(None),
    }
}
