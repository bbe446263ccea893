//! Long-poll status reader configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Hard ceiling on any long-poll wait, in seconds.
pub const MAX_WAIT_CEILING_SECONDS: u64 = 30;

/// Long-poll configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    /// Interval in milliseconds between store re-reads while waiting.
    #[serde(default = "default_interval")]
    pub interval_ms: u64,
    /// Server-side cap on the requested wait, in seconds (at most 30).
    #[serde(default = "default_max_wait")]
    pub max_wait_seconds: u64,
}

impl PollConfig {
    /// Re-read interval as a [`Duration`].
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Wait cap as a [`Duration`], never above the 30 s ceiling.
    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_seconds.min(MAX_WAIT_CEILING_SECONDS))
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval(),
            max_wait_seconds: default_max_wait(),
        }
    }
}

fn default_interval() -> u64 {
    500
}

fn default_max_wait() -> u64 {
    MAX_WAIT_CEILING_SECONDS
}
