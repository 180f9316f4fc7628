use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Store-assigned appointment identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppointmentId(pub i64);

/// Identifier of a requester or a provider. Valid ids are strictly positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartyId(pub i64);

impl PartyId {
    pub fn is_valid(self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for AppointmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for PartyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppointmentStatus {
    Booked,
    Completed,
    Cancelled,
}

impl AppointmentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Booked => "BOOKED",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// `COMPLETED` and `CANCELLED` end the lifecycle unless rescheduled.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Booked)
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown appointment status '{0}'")]
pub struct UnknownStatus(pub String);

impl FromStr for AppointmentStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BOOKED" => Ok(Self::Booked),
            "COMPLETED" => Ok(Self::Completed),
            "CANCELLED" | "CANCELED" => Ok(Self::Cancelled),
            _ => Err(UnknownStatus(s.to_string())),
        }
    }
}

/// A scheduled meeting between a requester and a provider.
///
/// `scheduled_at` is wall-clock time in the one canonical zone the deployment
/// uses; it is stored at whole-second precision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: AppointmentId,
    pub requester_id: PartyId,
    pub provider_id: PartyId,
    pub scheduled_at: NaiveDateTime,
    pub status: AppointmentStatus,
    pub notes: Option<String>,
}

/// Booking request. New appointments always start as `BOOKED`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAppointment {
    pub requester_id: PartyId,
    pub provider_id: PartyId,
    pub scheduled_at: NaiveDateTime,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PartyRole {
    Requester,
    Provider,
}

impl PartyRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Requester => "REQUESTER",
            Self::Provider => "PROVIDER",
        }
    }
}

impl fmt::Display for PartyRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PartyRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "REQUESTER" | "PATIENT" => Ok(Self::Requester),
            "PROVIDER" | "DOCTOR" => Ok(Self::Provider),
            _ => Err(format!("unknown party role '{s}'")),
        }
    }
}

/// Role together with the role-specific profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PartyKind {
    Requester { contact: Option<String> },
    Provider { specialization: Option<String> },
}

impl PartyKind {
    pub fn role(&self) -> PartyRole {
        match self {
            Self::Requester { .. } => PartyRole::Requester,
            Self::Provider { .. } => PartyRole::Provider,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Party {
    pub id: PartyId,
    pub username: String,
    pub display_name: String,
    pub kind: PartyKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewParty {
    pub username: String,
    pub display_name: String,
    pub kind: PartyKind,
}
