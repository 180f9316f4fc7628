pub mod clock;
pub mod locks;

pub use clock::{Clock, SystemClock};
pub use locks::{ProviderLease, ProviderLocks};

/// Output port: publish domain events (no knowledge of transport).
pub trait EventPublisher<E>: Send + Sync + 'static {
    fn publish(&self, event: &E);
}
