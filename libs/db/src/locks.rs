//! Namespaced in-process locks with bounded acquisition.
//!
//! Keys are namespaced as `"{module}:{key}"`, so two modules never contend
//! on the same key by accident. Each key maps to a `tokio::sync::Mutex`; the
//! guard owns the mutex lock and releases it on drop or on `release()`.
//!
//! These locks serialize work inside one process only. They are meant to wrap
//! a check-then-write sequence that the database alone does not serialize
//! (SQLite deferred transactions let two readers observe the same state).

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Configuration for lock acquisition attempts.
#[derive(Debug, Clone)]
pub struct LockConfig {
    /// Maximum duration to wait for lock acquisition (`None` = unlimited).
    pub max_wait: Option<Duration>,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            max_wait: Some(Duration::from_secs(30)),
        }
    }
}

impl LockConfig {
    pub fn with_max_wait(max_wait: Duration) -> Self {
        Self {
            max_wait: Some(max_wait),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("timed out after {waited:?} waiting for lock '{key}'")]
    Timeout { key: String, waited: Duration },
}

/// Lock guard. The lock is held until the guard is dropped or released.
pub struct DbLockGuard {
    namespaced_key: String,
    _guard: OwnedMutexGuard<()>,
}

impl DbLockGuard {
    /// Lock key with module namespace ("module:key").
    pub fn key(&self) -> &str {
        &self.namespaced_key
    }

    /// Release the lock now.
    pub fn release(self) {
        tracing::trace!(key = %self.namespaced_key, "lock released");
    }
}

impl std::fmt::Debug for DbLockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbLockGuard")
            .field("key", &self.namespaced_key)
            .finish()
    }
}

/// Table of keyed async mutexes shared by everything holding the same `DbHandle`.
#[derive(Clone, Default)]
pub struct KeyedLocks {
    inner: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, namespaced_key: &str) -> Arc<Mutex<()>> {
        self.inner
            .entry(namespaced_key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Acquire `{module}:{key}`, waiting at most `config.max_wait`.
    pub async fn lock(
        &self,
        module: &str,
        key: &str,
        config: &LockConfig,
    ) -> Result<DbLockGuard, LockError> {
        let namespaced_key = format!("{module}:{key}");
        let mutex = self.slot(&namespaced_key);
        let start = Instant::now();

        let guard = match config.max_wait {
            Some(max_wait) => match tokio::time::timeout(max_wait, mutex.lock_owned()).await {
                Ok(guard) => guard,
                Err(_) => {
                    return Err(LockError::Timeout {
                        key: namespaced_key,
                        waited: start.elapsed(),
                    })
                }
            },
            None => mutex.lock_owned().await,
        };

        tracing::trace!(key = %namespaced_key, waited_ms = start.elapsed().as_millis() as u64, "lock acquired");
        Ok(DbLockGuard {
            namespaced_key,
            _guard: guard,
        })
    }

    /// Acquire `{module}:{key}` only if nobody holds it right now.
    pub fn try_lock(&self, module: &str, key: &str) -> Option<DbLockGuard> {
        let namespaced_key = format!("{module}:{key}");
        let mutex = self.slot(&namespaced_key);
        mutex.try_lock_owned().ok().map(|guard| DbLockGuard {
            namespaced_key,
            _guard: guard,
        })
    }

    /// Number of distinct keys ever locked.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
