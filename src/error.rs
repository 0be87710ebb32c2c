use std::fmt::Display;

use thiserror::Error;
use uuid::Uuid;

pub type EngineResult<T> = Result<T, EngineError>;

/// Failure taxonomy for every engine operation.
///
/// Everything except `Infrastructure` is an expected business outcome: the
/// engine folds those into a `{success: false, message}` result instead of
/// letting them escape as errors. `Infrastructure` covers collaborator
/// failures (database, notification backend) and only propagates when it
/// hits the primary write.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{0}")]
    PermissionDenied(String),
    #[error("{0}")]
    InvalidTransition(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    InvariantViolation(String),
    #[error("{0}")]
    AlreadyExists(String),
    #[error("no resolvable acting user: {0}")]
    Unauthenticated(Uuid),
    #[error("infrastructure failure: {0}")]
    Infrastructure(String),
}

impl EngineError {
    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::PermissionDenied(message.into())
    }

    pub fn not_found(entity: &str) -> Self {
        Self::NotFound(format!("{entity} not found"))
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        Self::InvariantViolation(message.into())
    }

    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::AlreadyExists(message.into())
    }

    pub fn infrastructure<E: Display>(error: E) -> Self {
        Self::Infrastructure(error.to_string())
    }

    pub fn is_business(&self) -> bool {
        !matches!(self, Self::Infrastructure(_))
    }
}

impl From<diesel::result::Error> for EngineError {
    fn from(value: diesel::result::Error) -> Self {
        match value {
            diesel::result::Error::NotFound => EngineError::not_found("resource"),
            diesel::result::Error::DatabaseError(
                diesel::result::DatabaseErrorKind::UniqueViolation,
                info,
            ) => EngineError::already_exists(info.message().to_string()),
            other => EngineError::infrastructure(other),
        }
    }
}

impl From<anyhow::Error> for EngineError {
    fn from(value: anyhow::Error) -> Self {
        EngineError::infrastructure(value)
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(value: serde_json::Error) -> Self {
        EngineError::infrastructure(value)
    }
}
