use async_trait::async_trait;
use chrono::NaiveDateTime;

use crate::contract::model::{
    Appointment, AppointmentId, AppointmentStatus, NewAppointment, NewParty, Party, PartyId,
    PartyRole,
};

/// Unit of work over the appointment store.
///
/// Implementations roll back when dropped without `commit`. A unit of work
/// must be able to write after reading without failing on a concurrent
/// commit by another unit of work.
#[async_trait]
pub trait AppointmentsTx: Send {
    /// Persist a new `BOOKED` appointment and return the generated id.
    async fn insert(&mut self, new: &NewAppointment) -> anyhow::Result<AppointmentId>;

    async fn find_by_id(&mut self, id: AppointmentId) -> anyhow::Result<Option<Appointment>>;

    /// Unconditional status write; `false` when the id does not exist.
    async fn update_status(
        &mut self,
        id: AppointmentId,
        status: AppointmentStatus,
    ) -> anyhow::Result<bool>;

    /// Write `status` only if the row currently has `expected`.
    async fn update_status_from(
        &mut self,
        id: AppointmentId,
        expected: AppointmentStatus,
        status: AppointmentStatus,
    ) -> anyhow::Result<bool>;

    /// Time and status in one statement.
    async fn update_schedule(
        &mut self,
        id: AppointmentId,
        scheduled_at: NaiveDateTime,
        status: AppointmentStatus,
    ) -> anyhow::Result<bool>;

    /// `BOOKED` appointments of `provider_id` with `scheduled_at` in
    /// `[window_start, window_end]`, optionally ignoring one id.
    async fn count_active_in_window(
        &mut self,
        provider_id: PartyId,
        window_start: NaiveDateTime,
        window_end: NaiveDateTime,
        exclude: Option<AppointmentId>,
    ) -> anyhow::Result<i64>;

    async fn commit(self: Box<Self>) -> anyhow::Result<()>;

    async fn rollback(self: Box<Self>) -> anyhow::Result<()>;
}

/// Port for the appointment store. Reads outside a unit of work go straight here.
#[async_trait]
pub trait AppointmentsRepository: Send + Sync {
    async fn begin(&self) -> anyhow::Result<Box<dyn AppointmentsTx>>;

    async fn find_by_id(&self, id: AppointmentId) -> anyhow::Result<Option<Appointment>>;

    /// Descending by `scheduled_at`, ties by id.
    async fn list_by_requester(&self, requester_id: PartyId) -> anyhow::Result<Vec<Appointment>>;

    /// Ascending by `scheduled_at`, ties by id.
    async fn list_by_provider(&self, provider_id: PartyId) -> anyhow::Result<Vec<Appointment>>;
}

/// Raised by `PartiesRepository::insert` when the username already exists.
#[derive(Debug, thiserror::Error)]
#[error("duplicate username")]
pub struct DuplicateUsername;

#[async_trait]
pub trait PartiesRepository: Send + Sync {
    /// Insert party and profile atomically. Fails with [`DuplicateUsername`]
    /// in the error chain when the username is taken.
    async fn insert(&self, new: &NewParty) -> anyhow::Result<Party>;

    async fn find_by_id(&self, id: PartyId) -> anyhow::Result<Option<Party>>;

    async fn username_exists(&self, username: &str) -> anyhow::Result<bool>;

    /// Ordered by id.
    async fn list(&self, role: Option<PartyRole>) -> anyhow::Result<Vec<Party>>;
}
