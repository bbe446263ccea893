//! Job lifecycle events and the broadcast bus that carries them.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::types::JobId;

/// Default channel capacity for the job event bus.
const DEFAULT_CAPACITY: usize = 1024;

/// A job lifecycle notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "job_id", rename_all = "snake_case")]
pub enum JobEvent {
    /// A new job was written in `PENDING` state.
    Submitted(JobId),
    /// A job returned to `PENDING` (retry release or lease reclaim).
    Requeued(JobId),
    /// A job reached a terminal state.
    Finalized(JobId),
}

impl JobEvent {
    /// The job this event refers to.
    pub fn job_id(&self) -> JobId {
        match self {
            Self::Submitted(id) | Self::Requeued(id) | Self::Finalized(id) => *id,
        }
    }

    /// Whether this event means there may be claimable work.
    pub fn is_claimable(&self) -> bool {
        matches!(self, Self::Submitted(_) | Self::Requeued(_))
    }
}

/// Broadcast bus for [`JobEvent`]s.
///
/// Cloning the bus shares the underlying channel. Publishing never blocks
/// and never fails; with no subscribers the event is dropped.
#[derive(Debug, Clone)]
pub struct JobEventBus {
    tx: broadcast::Sender<JobEvent>,
}

impl JobEventBus {
    /// Create a new bus with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a new bus holding up to `capacity` undelivered events per subscriber.
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event to all current subscribers.
    pub fn publish(&self, event: JobEvent) {
        let receivers = self.tx.send(event).unwrap_or(0);
        tracing::trace!(?event, receivers, "Published job event");
    }

    /// Subscribe to events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.tx.subscribe()
    }
}

impl Default for JobEventBus {
    fn default() -> Self {
        Self::new()
    }
}
