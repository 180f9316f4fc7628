use chrono::{Duration, NaiveDate, NaiveDateTime};

use crate::contract::model::{AppointmentId, PartyId};
use crate::domain::repo::AppointmentsTx;

/// Years whose `%F %T` text sorts chronologically; slots outside are never stored.
pub const STORABLE_YEARS: std::ops::RangeInclusive<i32> = 1..=9999;

fn storable_min() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(*STORABLE_YEARS.start(), 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or(NaiveDateTime::MIN)
}

fn storable_max() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(*STORABLE_YEARS.end(), 12, 31)
        .and_then(|d| d.and_hms_opt(23, 59, 59))
        .unwrap_or(NaiveDateTime::MAX)
}

/// Buffer-window conflict rule.
#[derive(Debug, Clone, Copy)]
pub struct AvailabilityChecker {
    buffer: Duration,
}

impl AvailabilityChecker {
    pub fn new(buffer: Duration) -> Self {
        Self { buffer }
    }

    pub fn from_minutes(minutes: u32) -> Self {
        Self::new(Duration::minutes(i64::from(minutes)))
    }

    pub fn buffer(&self) -> Duration {
        self.buffer
    }

    /// `[candidate - buffer, candidate + buffer]`, clamped to the storable years
    /// so that the text bounds compare in calendar order.
    pub fn window(&self, candidate: NaiveDateTime) -> (NaiveDateTime, NaiveDateTime) {
        let start = candidate
            .checked_sub_signed(self.buffer)
            .unwrap_or(NaiveDateTime::MIN)
            .max(storable_min());
        let end = candidate
            .checked_add_signed(self.buffer)
            .unwrap_or(NaiveDateTime::MAX)
            .min(storable_max());
        (start, end)
    }

    /// True when no other `BOOKED` appointment of the provider falls inside the window.
    /// Must run in the same unit of work as the write that depends on it.
    pub async fn is_available(
        &self,
        tx: &mut dyn AppointmentsTx,
        provider_id: PartyId,
        candidate: NaiveDateTime,
        exclude: Option<AppointmentId>,
    ) -> anyhow::Result<bool> {
        let (start, end) = self.window(candidate);
        let active = tx
            .count_active_in_window(provider_id, start, end, exclude)
            .await?;
        tracing::trace!(%provider_id, %start, %end, active, "availability window checked");
        Ok(active == 0)
    }
}
