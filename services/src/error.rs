use sea_orm::{DbErr, SqlErr};
use thiserror::Error;

/// Failures surfaced by the orchestrator services.
///
/// Every variant except `Backend` means nothing was written. A failed
/// lifecycle command or build submission returns `Backend` after moving the
/// entity to its failure status (`error` for endpoints, `build_failed` for
/// versions). A failed scale returns it with replicas and status untouched.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Invalid transition for {entity}: {from} -> {to}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("Already exists: {0}")]
    UniqueConstraintViolation(String),

    #[error("Concurrent modification: {0}")]
    Conflict(String),

    #[error("Ingest buffer full ({capacity} samples), sample rejected")]
    Backpressure { capacity: usize },

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Database error: {0}")]
    Database(#[from] DbErr),
}

pub type Result<T> = std::result::Result<T, ServiceError>;

impl ServiceError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn invalid_transition(entity: &'static str, from: &str, to: &str) -> Self {
        Self::InvalidTransition {
            entity,
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Stable machine-readable name used in HTTP bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::Validation(_) => "validation_error",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::PreconditionFailed(_) => "precondition_failed",
            Self::UniqueConstraintViolation(_) => "unique_constraint_violation",
            Self::Conflict(_) => "conflict",
            Self::Backpressure { .. } => "backpressure",
            Self::Backend(_) => "backend_error",
            Self::Database(_) => "database_error",
        }
    }
}

/// True when the store rejected a write because of a unique index.
pub(crate) fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names() {
        assert_eq!(ServiceError::not_found("endpoint", 1).kind(), "not_found");
        assert_eq!(
            ServiceError::invalid_transition("alert", "resolved", "resolved").kind(),
            "invalid_transition"
        );
        assert_eq!(
            ServiceError::Backpressure { capacity: 1 }.kind(),
            "backpressure"
        );
    }

    #[test]
    fn test_messages_name_the_entity() {
        let err = ServiceError::not_found("application", "abc");
        assert_eq!(err.to_string(), "application not found: abc");

        let err = ServiceError::invalid_transition("application", "draft", "published");
        assert_eq!(
            err.to_string(),
            "Invalid transition for application: draft -> published"
        );
    }
}
