use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::{Executor, Sqlite};

use db::errors::is_sqlx_unique_violation;
use db::{DbHandle, SqliteTx};

use crate::contract::model::{
    Appointment, AppointmentId, AppointmentStatus, NewAppointment, NewParty, Party, PartyId,
    PartyRole,
};
use crate::domain::repo::{
    AppointmentsRepository, AppointmentsTx, DuplicateUsername, PartiesRepository,
};
use crate::infra::storage::entity::{AppointmentRow, PartyRow};
use crate::infra::storage::mapper::{appointment_from_row, party_from_row, profile_columns};

const APPOINTMENT_BY_ID: &str = "SELECT id, requester_id, provider_id, scheduled_at, status, notes \
     FROM appointments WHERE id = ?";

const APPOINTMENTS_BY_REQUESTER: &str =
    "SELECT id, requester_id, provider_id, scheduled_at, status, notes \
     FROM appointments WHERE requester_id = ? \
     ORDER BY scheduled_at DESC, id DESC";

const APPOINTMENTS_BY_PROVIDER: &str =
    "SELECT id, requester_id, provider_id, scheduled_at, status, notes \
     FROM appointments WHERE provider_id = ? \
     ORDER BY scheduled_at ASC, id ASC";

// Inclusive on both ends; `scheduled_at` is stored as fixed-width text so
// string comparison is chronological.
const COUNT_ACTIVE_IN_WINDOW: &str = "SELECT COUNT(*) FROM appointments \
     WHERE provider_id = ? AND status = 'BOOKED' \
       AND scheduled_at BETWEEN ? AND ? \
       AND (? IS NULL OR id <> ?)";

const PARTY_COLUMNS: &str = "SELECT p.id, p.username, p.display_name, p.role, \
            pp.contact, pp.specialization \
     FROM parties p LEFT JOIN party_profiles pp ON pp.party_id = p.id";

async fn fetch_appointment<'e, E>(exec: E, id: AppointmentId) -> anyhow::Result<Option<Appointment>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query_as::<_, AppointmentRow>(APPOINTMENT_BY_ID)
        .bind(id.0)
        .fetch_optional(exec)
        .await
        .with_context(|| format!("load appointment {id}"))?;
    row.map(appointment_from_row).transpose()
}

fn map_rows(rows: Vec<AppointmentRow>) -> anyhow::Result<Vec<Appointment>> {
    rows.into_iter().map(appointment_from_row).collect()
}

/// sqlx-backed appointment store.
#[derive(Clone)]
pub struct SqliteAppointmentsRepository {
    db: Arc<DbHandle>,
}

impl SqliteAppointmentsRepository {
    pub fn new(db: Arc<DbHandle>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl AppointmentsRepository for SqliteAppointmentsRepository {
    // Every unit of work reads the window and then writes; take the write lock up front.
    async fn begin(&self) -> anyhow::Result<Box<dyn AppointmentsTx>> {
        let tx = self
            .db
            .begin_immediate()
            .await
            .context("begin transaction")?;
        Ok(Box::new(SqliteAppointmentsTx { tx }))
    }

    async fn find_by_id(&self, id: AppointmentId) -> anyhow::Result<Option<Appointment>> {
        fetch_appointment(self.db.pool(), id).await
    }

    async fn list_by_requester(&self, requester_id: PartyId) -> anyhow::Result<Vec<Appointment>> {
        let rows = sqlx::query_as::<_, AppointmentRow>(APPOINTMENTS_BY_REQUESTER)
            .bind(requester_id.0)
            .fetch_all(self.db.pool())
            .await
            .with_context(|| format!("list appointments of requester {requester_id}"))?;
        map_rows(rows)
    }

    async fn list_by_provider(&self, provider_id: PartyId) -> anyhow::Result<Vec<Appointment>> {
        let rows = sqlx::query_as::<_, AppointmentRow>(APPOINTMENTS_BY_PROVIDER)
            .bind(provider_id.0)
            .fetch_all(self.db.pool())
            .await
            .with_context(|| format!("list appointments of provider {provider_id}"))?;
        map_rows(rows)
    }
}

/// Open transaction on the appointment store. Dropping it rolls back.
pub struct SqliteAppointmentsTx {
    tx: SqliteTx,
}

#[async_trait]
impl AppointmentsTx for SqliteAppointmentsTx {
    async fn insert(&mut self, new: &NewAppointment) -> anyhow::Result<AppointmentId> {
        let res = sqlx::query(
            "INSERT INTO appointments (requester_id, provider_id, scheduled_at, status, notes) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(new.requester_id.0)
        .bind(new.provider_id.0)
        .bind(new.scheduled_at)
        .bind(AppointmentStatus::Booked.as_str())
        .bind(new.notes.as_deref())
        .execute(&mut *self.tx)
        .await
        .context("insert appointment")?;
        Ok(AppointmentId(res.last_insert_rowid()))
    }

    async fn find_by_id(&mut self, id: AppointmentId) -> anyhow::Result<Option<Appointment>> {
        fetch_appointment(&mut *self.tx, id).await
    }

    async fn update_status(
        &mut self,
        id: AppointmentId,
        status: AppointmentStatus,
    ) -> anyhow::Result<bool> {
        let res = sqlx::query("UPDATE appointments SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id.0)
            .execute(&mut *self.tx)
            .await
            .with_context(|| format!("set status of appointment {id}"))?;
        Ok(res.rows_affected() == 1)
    }

    async fn update_status_from(
        &mut self,
        id: AppointmentId,
        expected: AppointmentStatus,
        status: AppointmentStatus,
    ) -> anyhow::Result<bool> {
        let res = sqlx::query("UPDATE appointments SET status = ? WHERE id = ? AND status = ?")
            .bind(status.as_str())
            .bind(id.0)
            .bind(expected.as_str())
            .execute(&mut *self.tx)
            .await
            .with_context(|| format!("transition appointment {id} from {expected}"))?;
        Ok(res.rows_affected() == 1)
    }

    async fn update_schedule(
        &mut self,
        id: AppointmentId,
        scheduled_at: NaiveDateTime,
        status: AppointmentStatus,
    ) -> anyhow::Result<bool> {
        let res = sqlx::query("UPDATE appointments SET scheduled_at = ?, status = ? WHERE id = ?")
            .bind(scheduled_at)
            .bind(status.as_str())
            .bind(id.0)
            .execute(&mut *self.tx)
            .await
            .with_context(|| format!("reschedule appointment {id}"))?;
        Ok(res.rows_affected() == 1)
    }

    async fn count_active_in_window(
        &mut self,
        provider_id: PartyId,
        window_start: NaiveDateTime,
        window_end: NaiveDateTime,
        exclude: Option<AppointmentId>,
    ) -> anyhow::Result<i64> {
        let exclude = exclude.map(|id| id.0);
        sqlx::query_scalar::<_, i64>(COUNT_ACTIVE_IN_WINDOW)
            .bind(provider_id.0)
            .bind(window_start)
            .bind(window_end)
            .bind(exclude)
            .bind(exclude)
            .fetch_one(&mut *self.tx)
            .await
            .with_context(|| format!("count bookings of provider {provider_id}"))
    }

    async fn commit(self: Box<Self>) -> anyhow::Result<()> {
        self.tx.commit().await.context("commit")
    }

    async fn rollback(self: Box<Self>) -> anyhow::Result<()> {
        self.tx.rollback().await.context("rollback")
    }
}

/// sqlx-backed party directory.
#[derive(Clone)]
pub struct SqlitePartiesRepository {
    db: Arc<DbHandle>,
}

impl SqlitePartiesRepository {
    pub fn new(db: Arc<DbHandle>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl PartiesRepository for SqlitePartiesRepository {
    async fn insert(&self, new: &NewParty) -> anyhow::Result<Party> {
        let new = new.clone();
        self.db
            .transaction::<_, _, anyhow::Error>(move |conn| {
                Box::pin(async move {
                    let res = sqlx::query(
                        "INSERT INTO parties (username, display_name, role) VALUES (?, ?, ?)",
                    )
                    .bind(new.username.as_str())
                    .bind(new.display_name.as_str())
                    .bind(new.kind.role().as_str())
                    .execute(&mut *conn)
                    .await;
                    let id = match res {
                        Ok(done) => done.last_insert_rowid(),
                        Err(e) if is_sqlx_unique_violation(&e) => {
                            return Err(anyhow::Error::new(DuplicateUsername));
                        }
                        Err(e) => return Err(anyhow::Error::new(e).context("insert party")),
                    };

                    let (contact, specialization) = profile_columns(&new.kind);
                    sqlx::query(
                        "INSERT INTO party_profiles (party_id, contact, specialization) \
                         VALUES (?, ?, ?)",
                    )
                    .bind(id)
                    .bind(contact)
                    .bind(specialization)
                    .execute(&mut *conn)
                    .await
                    .context("insert party profile")?;

                    Ok(Party {
                        id: PartyId(id),
                        username: new.username,
                        display_name: new.display_name,
                        kind: new.kind,
                    })
                })
            })
            .await
    }

    async fn find_by_id(&self, id: PartyId) -> anyhow::Result<Option<Party>> {
        let sql = format!("{PARTY_COLUMNS} WHERE p.id = ?");
        let row = sqlx::query_as::<_, PartyRow>(&sql)
            .bind(id.0)
            .fetch_optional(self.db.pool())
            .await
            .with_context(|| format!("load party {id}"))?;
        row.map(party_from_row).transpose()
    }

    async fn username_exists(&self, username: &str) -> anyhow::Result<bool> {
        let found: i64 =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM parties WHERE username = ?)")
                .bind(username)
                .fetch_one(self.db.pool())
                .await
                .context("check username")?;
        Ok(found != 0)
    }

    async fn list(&self, role: Option<PartyRole>) -> anyhow::Result<Vec<Party>> {
        let sql = format!("{PARTY_COLUMNS} WHERE (? IS NULL OR p.role = ?) ORDER BY p.id");
        let role = role.map(PartyRole::as_str);
        let rows = sqlx::query_as::<_, PartyRow>(&sql)
            .bind(role)
            .bind(role)
            .fetch_all(self.db.pool())
            .await
            .context("list parties")?;
        rows.into_iter().map(party_from_row).collect()
    }
}
