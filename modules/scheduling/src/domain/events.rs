use chrono::NaiveDateTime;

use crate::contract::model::{AppointmentId, PartyId};

/// Transport-agnostic domain event, published only after the change is committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppointmentEvent {
    Booked {
        id: AppointmentId,
        provider_id: PartyId,
        requester_id: PartyId,
        scheduled_at: NaiveDateTime,
    },
    Cancelled {
        id: AppointmentId,
    },
    Completed {
        id: AppointmentId,
    },
    Rescheduled {
        id: AppointmentId,
        provider_id: PartyId,
        scheduled_at: NaiveDateTime,
    },
}

impl AppointmentEvent {
    pub fn appointment_id(&self) -> AppointmentId {
        match self {
            Self::Booked { id, .. }
            | Self::Cancelled { id }
            | Self::Completed { id }
            | Self::Rescheduled { id, .. } => *id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Booked { .. } => "booked",
            Self::Cancelled { .. } => "cancelled",
            Self::Completed { .. } => "completed",
            Self::Rescheduled { .. } => "rescheduled",
        }
    }
}
