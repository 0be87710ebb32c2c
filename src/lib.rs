//! Project role authorization and task workflow engine.
//!
//! The engine decides, for every project-scoped mutation — task status
//! change, membership add/remove, role change, PM delegation — whether the
//! acting user may perform it, applies the change through a narrow
//! persistence interface, and fires audit and notification side effects
//! best-effort. It owns no UI and no wire protocol; callers hand it actor
//! and target identifiers and get structured outcomes back.

pub mod audit;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod members;
pub mod models;
pub mod notify;
pub mod permissions;
pub mod roles;
pub mod schema;
pub mod store;
pub mod workflow;

pub use engine::{Engine, MutationOutcome, TaskOutcome};
pub use error::{EngineError, EngineResult};
pub use models::{Role, TaskStatus};
pub use permissions::{has_permission, is_pm_or_pc, Capability};
pub use roles::resolve_effective_role;
pub use workflow::{checkbox_action, validate_transition, TransitionCheck};
