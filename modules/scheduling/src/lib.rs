//! Appointment scheduling between requesters and providers.
//!
//! Bookings are refused when the provider already has a `BOOKED` appointment
//! within the configured buffer around the requested time. The check and the
//! insert run under a per-provider lock inside one transaction.
//!
//! In-process callers use [`SchedulingApi`] obtained from [`Scheduling::client`].

// === PUBLIC CONTRACT ===
pub mod contract;
pub use contract::{client, error, model};
pub use contract::{SchedulingApi, SchedulingError};

pub mod config;
pub use config::SchedulingConfig;

pub mod module;
pub use module::{Scheduling, MIGRATOR, MODULE_NAME};

// === INTERNAL MODULES ===
#[doc(hidden)]
pub mod domain;
#[doc(hidden)]
pub mod gateways;
#[doc(hidden)]
pub mod infra;
