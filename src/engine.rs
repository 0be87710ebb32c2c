use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::models::{Role, Task};
use crate::roles::resolve_effective_role;
use crate::store::{NotificationSink, ProjectStore};

/// Handle bundling the persistence and notification collaborators. Holds no
/// mutable state of its own; every operation re-reads whatever it needs.
#[derive(Clone)]
pub struct Engine {
    pub(crate) store: Arc<dyn ProjectStore>,
    pub(crate) notifier: Arc<dyn NotificationSink>,
}

/// Result of a membership mutation. Expected failures (permission denial,
/// invariant violation, not-found, duplicates) come back here with
/// `success: false`; only infrastructure failures surface as `Err`.
#[derive(Debug, Clone, Serialize)]
pub struct MutationOutcome {
    pub success: bool,
    pub message: String,
}

impl MutationOutcome {
    pub(crate) fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub(crate) fn rejected(error: &EngineError) -> Self {
        Self {
            success: false,
            message: error.to_string(),
        }
    }
}

/// Result of a task status change; carries the updated row on success.
#[derive(Debug, Clone, Serialize)]
pub struct TaskOutcome {
    pub success: bool,
    pub message: String,
    pub task: Option<Task>,
}

impl Engine {
    pub fn new(store: Arc<dyn ProjectStore>, notifier: Arc<dyn NotificationSink>) -> Self {
        Self { store, notifier }
    }

    pub fn store(&self) -> &dyn ProjectStore {
        self.store.as_ref()
    }

    /// An actor that does not exist at all is unauthenticated, as opposed to
    /// an existing user who merely lacks membership or capability.
    pub(crate) async fn require_known_user(&self, user_id: Uuid) -> EngineResult<()> {
        if self.store.user_exists(user_id).await? {
            Ok(())
        } else {
            Err(EngineError::Unauthenticated(user_id))
        }
    }

    pub(crate) async fn require_member_role(
        &self,
        project_id: Uuid,
        actor_id: Uuid,
        now: DateTime<Utc>,
    ) -> EngineResult<Role> {
        resolve_effective_role(self.store.as_ref(), project_id, actor_id, now)
            .await?
            .ok_or_else(|| {
                EngineError::permission_denied("you are not a member of this project")
            })
    }
}
