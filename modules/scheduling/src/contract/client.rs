use async_trait::async_trait;
use chrono::NaiveDateTime;

use crate::contract::{
    error::SchedulingError,
    model::{Appointment, AppointmentId, NewAppointment, NewParty, Party, PartyId, PartyRole},
};

/// Public API of the scheduling module for in-process callers (CLI, other modules).
#[async_trait]
pub trait SchedulingApi: Send + Sync {
    /// Book a slot; fails with `Conflict` when the provider is busy within the buffer window.
    async fn book(&self, new: NewAppointment) -> Result<AppointmentId, SchedulingError>;

    /// `BOOKED` → `CANCELLED`. `false` when the appointment is missing or not booked.
    async fn cancel(&self, id: AppointmentId) -> Result<bool, SchedulingError>;

    /// `BOOKED` → `COMPLETED`. `false` when the appointment is missing or not booked.
    async fn complete(&self, id: AppointmentId) -> Result<bool, SchedulingError>;

    /// Move to `new_time` and reset to `BOOKED`. `false` when the appointment is missing.
    async fn reschedule(
        &self,
        id: AppointmentId,
        new_time: NaiveDateTime,
    ) -> Result<bool, SchedulingError>;

    /// Preview only; a later `book` may still conflict.
    async fn check_availability(
        &self,
        provider_id: PartyId,
        at: NaiveDateTime,
    ) -> Result<bool, SchedulingError>;

    async fn get_appointment(
        &self,
        id: AppointmentId,
    ) -> Result<Option<Appointment>, SchedulingError>;

    /// Newest first.
    async fn list_for_requester(
        &self,
        requester_id: PartyId,
    ) -> Result<Vec<Appointment>, SchedulingError>;

    /// Oldest first.
    async fn list_for_provider(
        &self,
        provider_id: PartyId,
    ) -> Result<Vec<Appointment>, SchedulingError>;

    async fn register_party(&self, new: NewParty) -> Result<Party, SchedulingError>;

    async fn get_party(&self, id: PartyId) -> Result<Option<Party>, SchedulingError>;

    async fn list_parties(&self, role: Option<PartyRole>) -> Result<Vec<Party>, SchedulingError>;
}
