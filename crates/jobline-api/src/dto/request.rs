//! Request DTOs.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Query parameters for `GET /jobs/{id}`.
///
/// `wait` is kept as a raw string so a malformed value degrades to an
/// immediate read instead of rejecting the request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PollQuery {
    /// Seconds to wait for a terminal state.
    #[serde(default)]
    pub wait: Option<String>,
}

impl PollQuery {
    /// Requested wait; absent, negative, or non-numeric values mean zero.
    pub fn wait(&self) -> Duration {
        Duration::from_secs(parse_wait(self.wait.as_deref()))
    }
}

/// Parse a `wait` query value into whole seconds.
pub fn parse_wait(raw: Option<&str>) -> u64 {
    raw.and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(0)
}
