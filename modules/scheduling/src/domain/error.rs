use chrono::NaiveDateTime;
use thiserror::Error;

use crate::contract::model::{PartyId, PartyRole};

/// Domain-specific errors using thiserror
#[derive(Error, Debug)]
pub enum DomainError {
    #[error("provider already booked at the selected time")]
    SlotUnavailable { provider_id: PartyId, at: NaiveDateTime },

    #[error("Validation failed: {field}: {message}")]
    Validation { field: String, message: String },

    #[error("no registered {role} with id {id}")]
    UnknownParty { id: PartyId, role: PartyRole },

    #[error("username '{username}' is already taken")]
    UsernameTaken { username: String },

    #[error("Persistence error: {message}")]
    Persistence { message: String },
}

impl DomainError {
    pub fn slot_unavailable(provider_id: PartyId, at: NaiveDateTime) -> Self {
        Self::SlotUnavailable { provider_id, at }
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn unknown_party(id: PartyId, role: PartyRole) -> Self {
        Self::UnknownParty { id, role }
    }

    pub fn username_taken(username: impl Into<String>) -> Self {
        Self::UsernameTaken {
            username: username.into(),
        }
    }

    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence {
            message: message.into(),
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::SlotUnavailable { .. } | Self::UsernameTaken { .. })
    }
}
