use std::sync::Arc;
use std::time::Duration;

use chrono::{Datelike, NaiveDateTime, Timelike};
use tracing::{debug, error, info, instrument, warn};

use crate::config::SchedulingConfig;
use crate::contract::model::{
    Appointment, AppointmentId, AppointmentStatus, NewAppointment, NewParty, Party, PartyId,
    PartyKind, PartyRole,
};
use crate::domain::availability::{AvailabilityChecker, STORABLE_YEARS};
use crate::domain::error::DomainError;
use crate::domain::events::AppointmentEvent;
use crate::domain::ports::{Clock, EventPublisher, ProviderLease, ProviderLocks};
use crate::domain::repo::{
    AppointmentsRepository, AppointmentsTx, DuplicateUsername, PartiesRepository,
};

const MAX_USERNAME_LEN: usize = 64;
const MAX_DISPLAY_NAME_LEN: usize = 120;

/// Domain service: the only place where appointment state changes.
/// Depends on ports only, never on infra types.
#[derive(Clone)]
pub struct Service {
    appointments: Arc<dyn AppointmentsRepository>,
    parties: Arc<dyn PartiesRepository>,
    locks: Arc<dyn ProviderLocks>,
    clock: Arc<dyn Clock>,
    events: Arc<dyn EventPublisher<AppointmentEvent>>,
    availability: AvailabilityChecker,
    config: ServiceConfig,
}

/// Configuration for the domain service
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub buffer_minutes: u32,
    pub lock_timeout: Duration,
    pub reject_past_slots: bool,
    pub require_registered_parties: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::from(&SchedulingConfig::default())
    }
}

impl From<&SchedulingConfig> for ServiceConfig {
    fn from(cfg: &SchedulingConfig) -> Self {
        Self {
            buffer_minutes: cfg.buffer_minutes,
            lock_timeout: cfg.lock_timeout,
            reject_past_slots: cfg.reject_past_slots,
            require_registered_parties: cfg.require_registered_parties,
        }
    }
}

/// Log a storage failure and turn it into the domain's persistence error.
fn persistence(op: &'static str, err: anyhow::Error) -> DomainError {
    error!(op, error = %format!("{err:#}"), "persistence failure");
    DomainError::persistence(format!("{op}: {err:#}"))
}

/// Whole-second precision; sub-second parts are dropped.
fn truncate_to_seconds(at: NaiveDateTime) -> NaiveDateTime {
    at.with_nanosecond(0).unwrap_or(at)
}

fn clean_optional(notes: Option<String>) -> Option<String> {
    notes
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
}

impl Service {
    /// Create a service with dependencies.
    pub fn new(
        appointments: Arc<dyn AppointmentsRepository>,
        parties: Arc<dyn PartiesRepository>,
        locks: Arc<dyn ProviderLocks>,
        clock: Arc<dyn Clock>,
        events: Arc<dyn EventPublisher<AppointmentEvent>>,
        config: ServiceConfig,
    ) -> Self {
        Self {
            appointments,
            parties,
            locks,
            clock,
            events,
            availability: AvailabilityChecker::from_minutes(config.buffer_minutes),
            config,
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    // --- commands ---

    #[instrument(
        name = "scheduling.service.book",
        skip_all,
        fields(
            provider_id = %new.provider_id,
            requester_id = %new.requester_id,
            scheduled_at = %new.scheduled_at
        )
    )]
    pub async fn book(&self, new: NewAppointment) -> Result<AppointmentId, DomainError> {
        info!("Booking appointment");

        let new = self.validate_new_appointment(new)?;
        if self.config.require_registered_parties {
            self.ensure_party(new.requester_id, PartyRole::Requester)
                .await?;
            self.ensure_party(new.provider_id, PartyRole::Provider)
                .await?;
        }

        let _lease = self.lock_provider(new.provider_id).await?;
        let mut tx = self.begin().await?;
        let res = self.book_in_tx(tx.as_mut(), &new).await;
        let id = self.settle(tx, res).await?;

        self.events.publish(&AppointmentEvent::Booked {
            id,
            provider_id: new.provider_id,
            requester_id: new.requester_id,
            scheduled_at: new.scheduled_at,
        });
        info!(appointment_id = %id, "Appointment booked");
        Ok(id)
    }

    #[instrument(name = "scheduling.service.cancel", skip_all, fields(appointment_id = %id))]
    pub async fn cancel(&self, id: AppointmentId) -> Result<bool, DomainError> {
        info!("Cancelling appointment");
        let changed = self
            .transition(id, AppointmentStatus::Cancelled)
            .await?;
        if changed {
            self.events.publish(&AppointmentEvent::Cancelled { id });
            info!("Appointment cancelled");
        }
        Ok(changed)
    }

    #[instrument(name = "scheduling.service.complete", skip_all, fields(appointment_id = %id))]
    pub async fn complete(&self, id: AppointmentId) -> Result<bool, DomainError> {
        info!("Completing appointment");
        let changed = self
            .transition(id, AppointmentStatus::Completed)
            .await?;
        if changed {
            self.events.publish(&AppointmentEvent::Completed { id });
            info!("Appointment completed");
        }
        Ok(changed)
    }

    #[instrument(
        name = "scheduling.service.reschedule",
        skip_all,
        fields(appointment_id = %id, new_time = %new_time)
    )]
    pub async fn reschedule(
        &self,
        id: AppointmentId,
        new_time: NaiveDateTime,
    ) -> Result<bool, DomainError> {
        info!("Rescheduling appointment");
        let new_time = self.validate_slot(new_time)?;

        // The provider of an appointment never changes, so it can be read before locking.
        let Some(current) = self
            .appointments
            .find_by_id(id)
            .await
            .map_err(|e| persistence("find_by_id", e))?
        else {
            debug!("Appointment not found");
            return Ok(false);
        };

        let _lease = self.lock_provider(current.provider_id).await?;
        let mut tx = self.begin().await?;
        let res = self.reschedule_in_tx(tx.as_mut(), id, new_time).await;
        let moved = self.settle(tx, res).await?;

        if let Some(provider_id) = moved {
            self.events.publish(&AppointmentEvent::Rescheduled {
                id,
                provider_id,
                scheduled_at: new_time,
            });
            info!("Appointment rescheduled");
        }
        Ok(moved.is_some())
    }

    // --- queries ---

    #[instrument(
        name = "scheduling.service.check_availability",
        skip_all,
        fields(provider_id = %provider_id, at = %at)
    )]
    pub async fn check_availability(
        &self,
        provider_id: PartyId,
        at: NaiveDateTime,
    ) -> Result<bool, DomainError> {
        debug!("Checking availability");
        Self::validate_party_id("provider_id", provider_id)?;
        let at = Self::validate_calendar(at)?;

        let mut tx = self.begin().await?;
        let res = self
            .availability
            .is_available(tx.as_mut(), provider_id, at, None)
            .await
            .map_err(|e| persistence("count_active_in_window", e));
        self.settle(tx, res).await
    }

    #[instrument(name = "scheduling.service.get_appointment", skip_all, fields(appointment_id = %id))]
    pub async fn get_appointment(
        &self,
        id: AppointmentId,
    ) -> Result<Option<Appointment>, DomainError> {
        debug!("Getting appointment by id");
        self.appointments
            .find_by_id(id)
            .await
            .map_err(|e| persistence("find_by_id", e))
    }

    #[instrument(name = "scheduling.service.list_for_requester", skip_all, fields(requester_id = %requester_id))]
    pub async fn list_for_requester(
        &self,
        requester_id: PartyId,
    ) -> Result<Vec<Appointment>, DomainError> {
        let items = self
            .appointments
            .list_by_requester(requester_id)
            .await
            .map_err(|e| persistence("list_by_requester", e))?;
        debug!(count = items.len(), "Listed appointments for requester");
        Ok(items)
    }

    #[instrument(name = "scheduling.service.list_for_provider", skip_all, fields(provider_id = %provider_id))]
    pub async fn list_for_provider(
        &self,
        provider_id: PartyId,
    ) -> Result<Vec<Appointment>, DomainError> {
        let items = self
            .appointments
            .list_by_provider(provider_id)
            .await
            .map_err(|e| persistence("list_by_provider", e))?;
        debug!(count = items.len(), "Listed appointments for provider");
        Ok(items)
    }

    // --- party directory ---

    #[instrument(
        name = "scheduling.service.register_party",
        skip_all,
        fields(username = %new.username, role = %new.kind.role())
    )]
    pub async fn register_party(&self, new: NewParty) -> Result<Party, DomainError> {
        info!("Registering party");
        let new = Self::validate_new_party(new)?;

        if self
            .parties
            .username_exists(&new.username)
            .await
            .map_err(|e| persistence("username_exists", e))?
        {
            warn!("Username already taken");
            return Err(DomainError::username_taken(new.username));
        }

        let party = match self.parties.insert(&new).await {
            Ok(p) => p,
            // Lost a race with a concurrent registration of the same name.
            Err(e) if e.downcast_ref::<DuplicateUsername>().is_some() => {
                warn!("Username already taken");
                return Err(DomainError::username_taken(new.username));
            }
            Err(e) => return Err(persistence("insert_party", e)),
        };

        info!(party_id = %party.id, "Party registered");
        Ok(party)
    }

    #[instrument(name = "scheduling.service.get_party", skip_all, fields(party_id = %id))]
    pub async fn get_party(&self, id: PartyId) -> Result<Option<Party>, DomainError> {
        debug!("Getting party by id");
        self.parties
            .find_by_id(id)
            .await
            .map_err(|e| persistence("find_party", e))
    }

    #[instrument(name = "scheduling.service.list_parties", skip(self))]
    pub async fn list_parties(&self, role: Option<PartyRole>) -> Result<Vec<Party>, DomainError> {
        let items = self
            .parties
            .list(role)
            .await
            .map_err(|e| persistence("list_parties", e))?;
        debug!(count = items.len(), "Listed parties");
        Ok(items)
    }

    // --- units of work ---

    async fn book_in_tx(
        &self,
        tx: &mut dyn AppointmentsTx,
        new: &NewAppointment,
    ) -> Result<AppointmentId, DomainError> {
        let available = self
            .availability
            .is_available(tx, new.provider_id, new.scheduled_at, None)
            .await
            .map_err(|e| persistence("count_active_in_window", e))?;
        if !available {
            warn!("Provider already booked within the buffer window");
            return Err(DomainError::slot_unavailable(
                new.provider_id,
                new.scheduled_at,
            ));
        }

        tx.insert(new)
            .await
            .map_err(|e| persistence("insert_appointment", e))
    }

    /// Returns the provider id when the row was moved, `None` when it is gone.
    async fn reschedule_in_tx(
        &self,
        tx: &mut dyn AppointmentsTx,
        id: AppointmentId,
        new_time: NaiveDateTime,
    ) -> Result<Option<PartyId>, DomainError> {
        let Some(current) = tx
            .find_by_id(id)
            .await
            .map_err(|e| persistence("find_by_id", e))?
        else {
            return Ok(None);
        };

        let available = self
            .availability
            .is_available(tx, current.provider_id, new_time, Some(id))
            .await
            .map_err(|e| persistence("count_active_in_window", e))?;
        if !available {
            warn!("Target slot conflicts with another booking");
            return Err(DomainError::slot_unavailable(current.provider_id, new_time));
        }

        let updated = tx
            .update_schedule(id, new_time, AppointmentStatus::Booked)
            .await
            .map_err(|e| persistence("update_schedule", e))?;
        Ok(updated.then_some(current.provider_id))
    }

    /// `BOOKED` → `target` in its own unit of work.
    async fn transition(
        &self,
        id: AppointmentId,
        target: AppointmentStatus,
    ) -> Result<bool, DomainError> {
        let mut tx = self.begin().await?;
        let res = tx
            .update_status_from(id, AppointmentStatus::Booked, target)
            .await
            .map_err(|e| persistence("update_status_from", e));
        let changed = self.settle(tx, res).await?;
        if !changed {
            debug!(to = %target, "No booked appointment with this id; nothing changed");
        }
        Ok(changed)
    }

    async fn begin(&self) -> Result<Box<dyn AppointmentsTx>, DomainError> {
        self.appointments
            .begin()
            .await
            .map_err(|e| persistence("begin", e))
    }

    /// Commit on success, roll back on failure. The original error wins over a rollback error.
    async fn settle<T>(
        &self,
        tx: Box<dyn AppointmentsTx>,
        res: Result<T, DomainError>,
    ) -> Result<T, DomainError> {
        match res {
            Ok(v) => {
                tx.commit().await.map_err(|e| persistence("commit", e))?;
                Ok(v)
            }
            Err(err) => {
                if let Err(rb) = tx.rollback().await {
                    warn!(error = %format!("{rb:#}"), "Rollback failed");
                }
                Err(err)
            }
        }
    }

    async fn lock_provider(&self, provider_id: PartyId) -> Result<ProviderLease, DomainError> {
        self.locks
            .acquire(provider_id, self.config.lock_timeout)
            .await
            .map_err(|e| persistence("provider_lock", e))
    }

    async fn ensure_party(&self, id: PartyId, role: PartyRole) -> Result<(), DomainError> {
        let party = self
            .parties
            .find_by_id(id)
            .await
            .map_err(|e| persistence("find_party", e))?;
        match party {
            Some(p) if p.kind.role() == role => Ok(()),
            _ => {
                warn!(party_id = %id, role = %role, "Party not registered with the required role");
                Err(DomainError::unknown_party(id, role))
            }
        }
    }

    // --- validation ---

    fn validate_party_id(field: &'static str, id: PartyId) -> Result<(), DomainError> {
        if id.is_valid() {
            Ok(())
        } else {
            Err(DomainError::validation(field, "must be a positive id"))
        }
    }

    fn validate_calendar(at: NaiveDateTime) -> Result<NaiveDateTime, DomainError> {
        if STORABLE_YEARS.contains(&at.year()) {
            Ok(truncate_to_seconds(at))
        } else {
            Err(DomainError::validation(
                "scheduled_at",
                format!(
                    "year must be between {} and {}",
                    STORABLE_YEARS.start(),
                    STORABLE_YEARS.end()
                ),
            ))
        }
    }

    fn validate_slot(&self, at: NaiveDateTime) -> Result<NaiveDateTime, DomainError> {
        let at = Self::validate_calendar(at)?;
        if self.config.reject_past_slots && at < truncate_to_seconds(self.clock.now()) {
            return Err(DomainError::validation(
                "scheduled_at",
                "cannot book an appointment in the past",
            ));
        }
        Ok(at)
    }

    fn validate_new_appointment(
        &self,
        new: NewAppointment,
    ) -> Result<NewAppointment, DomainError> {
        Self::validate_party_id("requester_id", new.requester_id)?;
        Self::validate_party_id("provider_id", new.provider_id)?;
        let scheduled_at = self.validate_slot(new.scheduled_at)?;

        Ok(NewAppointment {
            scheduled_at,
            notes: clean_optional(new.notes),
            ..new
        })
    }

    fn validate_new_party(new: NewParty) -> Result<NewParty, DomainError> {
        let username = new.username.trim().to_string();
        if username.is_empty() {
            return Err(DomainError::validation("username", "cannot be empty"));
        }
        if username.len() > MAX_USERNAME_LEN {
            return Err(DomainError::validation(
                "username",
                format!("too long (max {MAX_USERNAME_LEN} characters)"),
            ));
        }
        if username.chars().any(char::is_whitespace) {
            return Err(DomainError::validation(
                "username",
                "cannot contain whitespace",
            ));
        }

        let display_name = new.display_name.trim().to_string();
        if display_name.is_empty() {
            return Err(DomainError::validation("display_name", "cannot be empty"));
        }
        if display_name.chars().count() > MAX_DISPLAY_NAME_LEN {
            return Err(DomainError::validation(
                "display_name",
                format!("too long (max {MAX_DISPLAY_NAME_LEN} characters)"),
            ));
        }

        let kind = match new.kind {
            PartyKind::Requester { contact } => PartyKind::Requester {
                contact: clean_optional(contact),
            },
            PartyKind::Provider { specialization } => PartyKind::Provider {
                specialization: clean_optional(specialization),
            },
        };

        Ok(NewParty {
            username,
            display_name,
            kind,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::error::SchedulingError;
    use crate::infra::events::TracingEventPublisher;
    use crate::infra::locks::DbProviderLocks;
    use crate::infra::storage::{SqliteAppointmentsRepository, SqlitePartiesRepository};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use db::{ConnectOpts, DbHandle};
    use tracing_test::traced_test;

    struct FixedClock(NaiveDateTime);

    impl Clock for FixedClock {
        fn now(&self) -> NaiveDateTime {
            self.0
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl AppointmentsRepository for BrokenStore {
        async fn begin(&self) -> anyhow::Result<Box<dyn AppointmentsTx>> {
            anyhow::bail!("disk I/O error at /var/lib/schedule.db")
        }

        async fn find_by_id(&self, _id: AppointmentId) -> anyhow::Result<Option<Appointment>> {
            anyhow::bail!("disk I/O error at /var/lib/schedule.db")
        }

        async fn list_by_requester(&self, _id: PartyId) -> anyhow::Result<Vec<Appointment>> {
            anyhow::bail!("disk I/O error at /var/lib/schedule.db")
        }

        async fn list_by_provider(&self, _id: PartyId) -> anyhow::Result<Vec<Appointment>> {
            anyhow::bail!("disk I/O error at /var/lib/schedule.db")
        }
    }

    struct BusyLocks;

    #[async_trait]
    impl ProviderLocks for BusyLocks {
        async fn acquire(
            &self,
            provider_id: PartyId,
            max_wait: Duration,
        ) -> anyhow::Result<ProviderLease> {
            anyhow::bail!("provider {provider_id} still locked after {max_wait:?}")
        }
    }

    fn slot(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 11, 25)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn booking(provider: i64, at: NaiveDateTime) -> NewAppointment {
        NewAppointment {
            requester_id: PartyId(11),
            provider_id: PartyId(provider),
            scheduled_at: at,
            notes: None,
        }
    }

    async fn memory_db() -> Arc<DbHandle> {
        let db = DbHandle::connect("sqlite::memory:", ConnectOpts::default())
            .await
            .unwrap();
        crate::module::Scheduling::migrate(&db).await.unwrap();
        Arc::new(db)
    }

    async fn service_with(
        appointments: Option<Arc<dyn AppointmentsRepository>>,
        locks: Option<Arc<dyn ProviderLocks>>,
    ) -> Service {
        let db = memory_db().await;
        let appointments: Arc<dyn AppointmentsRepository> = match appointments {
            Some(a) => a,
            None => Arc::new(SqliteAppointmentsRepository::new(db.clone())),
        };
        let locks: Arc<dyn ProviderLocks> = match locks {
            Some(l) => l,
            None => Arc::new(DbProviderLocks::new(db.clone())),
        };
        Service::new(
            appointments,
            Arc::new(SqlitePartiesRepository::new(db)),
            locks,
            Arc::new(FixedClock(slot(8, 0))),
            Arc::new(TracingEventPublisher),
            ServiceConfig::default(),
        )
    }

    #[test]
    fn truncates_sub_second_precision() {
        let at = slot(9, 0) + chrono::Duration::microseconds(1_500_000);
        assert_eq!(truncate_to_seconds(at), slot(9, 0) + chrono::Duration::seconds(1));
    }

    #[test]
    fn config_follows_module_config() {
        let cfg = ServiceConfig::from(&SchedulingConfig {
            buffer_minutes: 45,
            ..SchedulingConfig::default()
        });
        assert_eq!(cfg.buffer_minutes, 45);
        assert_eq!(cfg.lock_timeout, Duration::from_secs(5));
    }

    #[tokio::test]
    #[traced_test]
    async fn booking_is_traced() {
        let svc = service_with(None, None).await;
        let id = svc.book(booking(7, slot(15, 30))).await.unwrap();

        assert!(logs_contain("scheduling.service.book"));
        assert!(logs_contain("Appointment booked"));
        assert!(logs_contain("appointment event"));
        assert!(logs_contain(&format!("appointment_id={id}")));
    }

    #[tokio::test]
    #[traced_test]
    async fn conflict_is_logged_as_warning() {
        let svc = service_with(None, None).await;
        svc.book(booking(7, slot(15, 30))).await.unwrap();
        let err = svc.book(booking(7, slot(15, 45))).await.unwrap_err();

        assert!(err.is_conflict());
        assert!(logs_contain("Provider already booked within the buffer window"));
    }

    #[tokio::test]
    #[traced_test]
    async fn store_failure_becomes_generic_persistence_error() {
        let svc = service_with(Some(Arc::new(BrokenStore)), None).await;

        let err = svc.book(booking(7, slot(15, 30))).await.unwrap_err();
        assert!(matches!(err, DomainError::Persistence { .. }));
        assert!(logs_contain("persistence failure"));
        assert!(logs_contain("disk I/O error"));

        let public: SchedulingError = err.into();
        assert_eq!(public, SchedulingError::Persistence);

        assert!(matches!(
            svc.list_for_provider(PartyId(7)).await,
            Err(DomainError::Persistence { .. })
        ));
    }

    #[tokio::test]
    #[traced_test]
    async fn lock_timeout_surfaces_as_persistence_error() {
        let svc = service_with(None, Some(Arc::new(BusyLocks))).await;

        let err = svc.book(booking(7, slot(15, 30))).await.unwrap_err();
        assert!(matches!(err, DomainError::Persistence { .. }));
        assert!(logs_contain("provider_lock"));
        assert!(svc.list_for_provider(PartyId(7)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn held_provider_lock_times_out() {
        let db = memory_db().await;
        let svc = Service::new(
            Arc::new(SqliteAppointmentsRepository::new(db.clone())),
            Arc::new(SqlitePartiesRepository::new(db.clone())),
            Arc::new(DbProviderLocks::new(db.clone())),
            Arc::new(FixedClock(slot(8, 0))),
            Arc::new(TracingEventPublisher),
            ServiceConfig {
                lock_timeout: Duration::from_millis(50),
                ..ServiceConfig::default()
            },
        );

        let _held = db
            .try_lock(
                crate::infra::locks::LOCK_NAMESPACE,
                &crate::infra::locks::provider_lock_key(PartyId(7)),
            )
            .unwrap();
        let err = svc.book(booking(7, slot(15, 30))).await.unwrap_err();
        assert!(matches!(err, DomainError::Persistence { .. }));

        // other providers are not affected
        svc.book(booking(8, slot(15, 30))).await.unwrap();
    }

    #[tokio::test]
    async fn past_slot_uses_injected_clock() {
        let svc = service_with(None, None).await;
        let err = svc
            .book(booking(7, slot(7, 59)))
            .await
            .unwrap_err();
        assert!(matches!(&err, DomainError::Validation { field, .. } if field == "scheduled_at"));
        svc.book(booking(7, slot(8, 0))).await.unwrap();
    }
}
