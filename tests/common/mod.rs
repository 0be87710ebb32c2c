use std::sync::Arc;

use crewline::models::Role;
use crewline::store::MemoryStore;
use crewline::Engine;
use once_cell::sync::Lazy;
use uuid::Uuid;

static TRACING: Lazy<()> = Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
});

/// One project with a seeded Project Manager, wired to an in-memory store
/// that doubles as the notification sink.
pub struct TestProject {
    pub engine: Engine,
    pub store: Arc<MemoryStore>,
    pub project_id: Uuid,
    pub manager_id: Uuid,
}

pub async fn project_with_manager() -> TestProject {
    Lazy::force(&TRACING);
    let store = Arc::new(MemoryStore::new());
    let engine = Engine::new(store.clone(), store.clone());

    let manager_id = store.seed_user("manager").await;
    let project_id = store.seed_project("Apollo", manager_id).await;
    store
        .seed_membership(project_id, manager_id, Role::ProjectManager)
        .await;

    TestProject {
        engine,
        store,
        project_id,
        manager_id,
    }
}

impl TestProject {
    /// Seeds a user without any membership.
    #[allow(dead_code)]
    pub async fn user(&self, username: &str) -> Uuid {
        self.store.seed_user(username).await
    }

    /// Seeds a user and a membership row in the test project.
    #[allow(dead_code)]
    pub async fn member(&self, username: &str, role: Role) -> Uuid {
        let id = self.store.seed_user(username).await;
        self.store
            .seed_membership(self.project_id, id, role)
            .await;
        id
    }
}
