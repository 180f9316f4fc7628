#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use chrono::{NaiveDate, NaiveDateTime};
use tempfile::TempDir;

use db::{ConnectOpts, DbHandle};
use scheduling::domain::events::AppointmentEvent;
use scheduling::domain::ports::{Clock, EventPublisher};
use scheduling::model::{NewAppointment, NewParty, PartyId, PartyKind};
use scheduling::{Scheduling, SchedulingApi, SchedulingConfig};

/// Clock frozen at a fixed instant.
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

/// Collects published events for assertions.
#[derive(Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<AppointmentEvent>>,
}

impl RecordingPublisher {
    pub fn events(&self) -> Vec<AppointmentEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.events().iter().map(AppointmentEvent::kind).collect()
    }
}

impl EventPublisher<AppointmentEvent> for RecordingPublisher {
    fn publish(&self, event: &AppointmentEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

pub fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, mo, d)
        .unwrap()
        .and_hms_opt(h, mi, 0)
        .unwrap()
}

/// 2025-11-25 at `h:mi`.
pub fn nov25(h: u32, mi: u32) -> NaiveDateTime {
    at(2025, 11, 25, h, mi)
}

/// "Now" for every test environment.
pub fn test_now() -> NaiveDateTime {
    at(2025, 11, 1, 8, 0)
}

pub fn new_appointment(requester: i64, provider: i64, when: NaiveDateTime) -> NewAppointment {
    NewAppointment {
        requester_id: PartyId(requester),
        provider_id: PartyId(provider),
        scheduled_at: when,
        notes: None,
    }
}

pub fn new_requester(username: &str) -> NewParty {
    NewParty {
        username: username.to_string(),
        display_name: format!("Requester {username}"),
        kind: PartyKind::Requester {
            contact: Some(format!("{username}@example.com")),
        },
    }
}

pub fn new_provider(username: &str, specialization: &str) -> NewParty {
    NewParty {
        username: username.to_string(),
        display_name: format!("Dr. {username}"),
        kind: PartyKind::Provider {
            specialization: Some(specialization.to_string()),
        },
    }
}

/// File-backed database plus the wired module. The temp dir lives as long as this value.
pub struct TestEnv {
    pub dir: TempDir,
    pub db: Arc<DbHandle>,
    pub module: Scheduling,
    pub client: Arc<dyn SchedulingApi>,
    pub events: Arc<RecordingPublisher>,
}

pub async fn setup() -> TestEnv {
    setup_with(SchedulingConfig::default()).await
}

pub async fn setup_with(config: SchedulingConfig) -> TestEnv {
    let dir = TempDir::new().unwrap();
    let dsn = format!(
        "sqlite://{}?wal=true&busy_timeout=5000",
        dir.path().join("db/schedule.db").display()
    );
    let db = Arc::new(DbHandle::connect(&dsn, ConnectOpts::default()).await.unwrap());
    let events = Arc::new(RecordingPublisher::default());
    let module = Scheduling::init_with(
        db.clone(),
        &config,
        Arc::new(FixedClock(test_now())),
        events.clone(),
    )
    .await
    .unwrap();
    let client = module.client();
    TestEnv {
        dir,
        db,
        module,
        client,
        events,
    }
}
