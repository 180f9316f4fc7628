pub mod client;
pub mod error;
pub mod model;

pub use client::SchedulingApi;
pub use error::SchedulingError;
pub use model::{
    Appointment, AppointmentId, AppointmentStatus, NewAppointment, NewParty, Party, PartyId,
    PartyKind, PartyRole,
};
