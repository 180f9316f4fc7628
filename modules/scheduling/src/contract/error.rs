use thiserror::Error;

/// Errors that are safe to expose to callers.
///
/// `Conflict` and `Validation` messages may be shown to end users verbatim.
/// `Persistence` carries no detail; the cause is logged where it happened.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulingError {
    #[error("{message}")]
    Conflict { message: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Persistence failure")]
    Persistence,
}

impl SchedulingError {
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn persistence() -> Self {
        Self::Persistence
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

impl From<crate::domain::error::DomainError> for SchedulingError {
    fn from(domain_error: crate::domain::error::DomainError) -> Self {
        use crate::domain::error::DomainError::*;
        match domain_error {
            e @ SlotUnavailable { .. } => Self::conflict(e.to_string()),
            e @ UsernameTaken { .. } => Self::conflict(e.to_string()),
            e @ UnknownParty { .. } => Self::validation(e.to_string()),
            Validation { field, message } => Self::validation(format!("{field}: {message}")),
            Persistence { .. } => Self::persistence(),
        }
    }
}
