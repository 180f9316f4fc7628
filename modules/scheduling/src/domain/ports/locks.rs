use std::any::Any;
use std::time::Duration;

use async_trait::async_trait;

use crate::contract::model::PartyId;

/// Held while a booking decision for one provider is in flight.
/// Dropping the lease releases the provider.
pub type ProviderLease = Box<dyn Any + Send>;

/// Serializes check-then-write sequences per provider.
#[async_trait]
pub trait ProviderLocks: Send + Sync {
    /// Wait at most `max_wait`; a timeout is an error.
    async fn acquire(&self, provider_id: PartyId, max_wait: Duration)
        -> anyhow::Result<ProviderLease>;
}
