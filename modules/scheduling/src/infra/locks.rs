use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;

use db::{DbHandle, LockConfig};

use crate::contract::model::PartyId;
use crate::domain::ports::{ProviderLease, ProviderLocks};

/// Lock namespace used in [`DbHandle::lock`].
pub const LOCK_NAMESPACE: &str = "scheduling";

/// Per-provider mutual exclusion on top of the database handle's keyed locks.
#[derive(Clone)]
pub struct DbProviderLocks {
    db: Arc<DbHandle>,
}

impl DbProviderLocks {
    pub fn new(db: Arc<DbHandle>) -> Self {
        Self { db }
    }
}

pub fn provider_lock_key(provider_id: PartyId) -> String {
    format!("provider:{provider_id}")
}

#[async_trait]
impl ProviderLocks for DbProviderLocks {
    async fn acquire(
        &self,
        provider_id: PartyId,
        max_wait: Duration,
    ) -> anyhow::Result<ProviderLease> {
        let guard = self
            .db
            .lock(
                LOCK_NAMESPACE,
                &provider_lock_key(provider_id),
                &LockConfig::with_max_wait(max_wait),
            )
            .await
            .with_context(|| format!("lock provider {provider_id}"))?;
        Ok(Box::new(guard))
    }
}
