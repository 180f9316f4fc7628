use tracing::info;

use crate::domain::events::AppointmentEvent;
use crate::domain::ports::EventPublisher;

/// Default publisher: one `info` record per committed change.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventPublisher;

impl EventPublisher<AppointmentEvent> for TracingEventPublisher {
    fn publish(&self, event: &AppointmentEvent) {
        match event {
            AppointmentEvent::Booked {
                id,
                provider_id,
                requester_id,
                scheduled_at,
            } => info!(
                event = event.kind(),
                appointment_id = %id,
                provider_id = %provider_id,
                requester_id = %requester_id,
                scheduled_at = %scheduled_at,
                "appointment event"
            ),
            AppointmentEvent::Rescheduled {
                id,
                provider_id,
                scheduled_at,
            } => info!(
                event = event.kind(),
                appointment_id = %id,
                provider_id = %provider_id,
                scheduled_at = %scheduled_at,
                "appointment event"
            ),
            AppointmentEvent::Cancelled { id } | AppointmentEvent::Completed { id } => info!(
                event = event.kind(),
                appointment_id = %id,
                "appointment event"
            ),
        }
    }
}
