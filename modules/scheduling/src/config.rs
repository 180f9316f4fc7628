use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the scheduling module (`modules.scheduling` in the app config).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchedulingConfig {
    /// Half-width of the conflict window around a slot, in minutes.
    #[serde(default = "default_buffer_minutes")]
    pub buffer_minutes: u32,
    /// How long a booking waits for the provider lock.
    #[serde(default = "default_lock_timeout", with = "humantime_serde")]
    pub lock_timeout: Duration,
    /// Refuse slots earlier than the clock's current time.
    #[serde(default = "default_true")]
    pub reject_past_slots: bool,
    /// Require both parties to exist in the directory with the matching role.
    #[serde(default)]
    pub require_registered_parties: bool,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            buffer_minutes: default_buffer_minutes(),
            lock_timeout: default_lock_timeout(),
            reject_past_slots: default_true(),
            require_registered_parties: false,
        }
    }
}

fn default_buffer_minutes() -> u32 {
    20
}

fn default_lock_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_true() -> bool {
    true
}
