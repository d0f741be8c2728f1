use crate::job::Job;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tracing::debug;

// Events buffered per subscriber before the oldest are dropped.
const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// What happened to a job. Tags every snapshot pushed to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    JobCreated,
    DeviceStatusUpdate,
    CommandUpdate,
    ProgressUpdate,
    ExecutionUpdate,
    JobStopping,
    JobCompleted,
    JobFailed,
}

/// A job snapshot tagged with the event that produced it.
#[derive(Debug, Clone, Serialize)]
pub struct JobEvent {
    pub kind: EventKind,
    pub job_id: String,
    pub snapshot: Job,
}

impl JobEvent {
    /// The wire frame sent to subscribers.
    pub fn to_frame(&self) -> Value {
        let mut data = serde_json::to_value(&self.snapshot).unwrap_or_else(|_| json!({}));
        if let Value::Object(map) = &mut data {
            map.insert("event".to_string(), json!(self.kind));
        }
        json!({
            "type": "job_update",
            "job_id": self.job_id,
            "data": data,
        })
    }
}

/// Fan-out of job state snapshots to long-lived subscribers.
///
/// Producers (job-manager mutators running on worker threads) publish
/// without ever blocking: the underlying broadcast channel is bounded and
/// lagging subscribers lose the oldest events, never stall the job. Within
/// one job, events arrive in mutation order. Dropped receivers prune
/// themselves.
pub struct ProgressBroadcaster {
    tx: broadcast::Sender<JobEvent>,
}

impl ProgressBroadcaster {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Enqueue one event. Never blocks; a send with no subscribers is a
    /// no-op.
    pub fn publish(&self, event: JobEvent) {
        debug!(
            target: "ProgressBroadcaster::publish",
            job_id = %event.job_id,
            kind = ?event.kind,
            "Broadcasting job event"
        );
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for ProgressBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}
