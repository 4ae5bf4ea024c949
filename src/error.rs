//! Error taxonomy shared by every service operation.
//!
//! Each variant maps to one failure class the HTTP collaborator can translate
//! into a status code. All of them are detected before any write where
//! possible, so a failed operation always means "nothing happened" — the one
//! documented exception is the bulk-update path, which skips unknown task ids
//! instead of aborting the batch.

use thiserror::Error;

use crate::policy::capability::{Action, Module};

pub type OpsResult<T> = Result<T, OpsError>;

#[derive(Debug, Error)]
pub enum OpsError {
    /// Actor could not be resolved, or the account is disabled.
    /// Distinct from a permission denial — raised before the capability
    /// matrix is ever consulted.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Actor resolved but the capability matrix denies (module, action).
    #[error("permission denied: {module}:{action}")]
    PermissionDenied { module: Module, action: Action },

    /// Identity-based denial that is not capability-shaped — e.g. a
    /// non-assignee submitting a task, or an actor changing their own role.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Referenced entity missing, enum value outside its closed set, or a
    /// required field empty.
    #[error("validation failed on {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    /// Operation is not legal for the entity's current state.
    #[error("state conflict: {0}")]
    StateConflict(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Unclassified failure — never absorbed, always propagated as-is.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl OpsError {
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn conflict(reason: impl Into<String>) -> Self {
        Self::StateConflict(reason.into())
    }
}

impl From<sqlx::Error> for OpsError {
    fn from(err: sqlx::Error) -> Self {
        Self::Internal(err.into())
    }
}
