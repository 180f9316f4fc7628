use std::sync::Arc;

use anyhow::Context;
use tracing::{debug, info};

use db::{DbHandle, Migrator};

use crate::config::SchedulingConfig;
use crate::contract::client::SchedulingApi;
use crate::domain::events::AppointmentEvent;
use crate::domain::ports::{Clock, EventPublisher, SystemClock};
use crate::domain::service::{Service, ServiceConfig};
use crate::gateways::local::SchedulingLocalClient;
use crate::infra::events::TracingEventPublisher;
use crate::infra::locks::DbProviderLocks;
use crate::infra::storage::{SqliteAppointmentsRepository, SqlitePartiesRepository};

/// Name of the module's section under `modules:` in the app config.
pub const MODULE_NAME: &str = "scheduling";

/// Embedded schema for parties, profiles and appointments.
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Wired scheduling module: the domain service plus its local client.
#[derive(Clone)]
pub struct Scheduling {
    service: Arc<Service>,
    client: Arc<dyn SchedulingApi>,
}

impl Scheduling {
    /// Apply migrations, then wire with the system clock and the tracing publisher.
    pub async fn init(db: Arc<DbHandle>, config: &SchedulingConfig) -> anyhow::Result<Self> {
        Self::init_with(
            db,
            config,
            Arc::new(SystemClock),
            Arc::new(TracingEventPublisher),
        )
        .await
    }

    /// Same as [`Scheduling::init`] with a custom clock and event sink.
    pub async fn init_with(
        db: Arc<DbHandle>,
        config: &SchedulingConfig,
        clock: Arc<dyn Clock>,
        events: Arc<dyn EventPublisher<AppointmentEvent>>,
    ) -> anyhow::Result<Self> {
        Self::migrate(&db).await?;

        let service = Arc::new(Service::new(
            Arc::new(SqliteAppointmentsRepository::new(db.clone())),
            Arc::new(SqlitePartiesRepository::new(db.clone())),
            Arc::new(DbProviderLocks::new(db)),
            clock,
            events,
            ServiceConfig::from(config),
        ));
        let client: Arc<dyn SchedulingApi> = Arc::new(SchedulingLocalClient::new(service.clone()));
        info!(
            module = MODULE_NAME,
            buffer_minutes = config.buffer_minutes,
            "scheduling module initialized"
        );
        Ok(Self { service, client })
    }

    /// Apply the embedded migrations. Safe to call on an up-to-date schema.
    pub async fn migrate(db: &DbHandle) -> anyhow::Result<()> {
        db.run_migrations(&MIGRATOR)
            .await
            .context("apply scheduling migrations")?;
        debug!(module = MODULE_NAME, "migrations applied");
        Ok(())
    }

    pub fn client(&self) -> Arc<dyn SchedulingApi> {
        self.client.clone()
    }

    pub fn service(&self) -> Arc<Service> {
        self.service.clone()
    }
}
