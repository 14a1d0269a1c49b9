//! The event payloads emitted over the course of a job's lifecycle.

use chrono::{DateTime, Utc};
use jobforge_model::{JobError, JobId};
use serde::{Deserialize, Serialize};

/// Fields common to every job event, regardless of kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMeta {
    pub job_id: JobId,
    pub queue_name: String,
    pub job_type: String,
    pub timestamp: DateTime<Utc>,
}

impl EventMeta {
    #[must_use]
    pub fn new(job_id: JobId, queue_name: impl Into<String>, job_type: impl Into<String>) -> Self {
        Self {
            job_id,
            queue_name: queue_name.into(),
            job_type: job_type.into(),
            timestamp: Utc::now(),
        }
    }
}

/// A notification published at a job lifecycle transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum JobEvent {
    /// A job was added to a queue.
    Queued { meta: EventMeta },
    /// A queue instance began running a job's handler.
    Started { meta: EventMeta, attempt: u32 },
    /// A handler reported progress via `JobContext::progress`.
    Progress {
        meta: EventMeta,
        progress: u8,
        message: Option<String>,
    },
    /// A handler returned successfully.
    Completed {
        meta: EventMeta,
        result: serde_json::Value,
    },
    /// A handler's attempt failed. `will_retry` tells subscribers whether
    /// another attempt is coming or this was the final failure.
    Failed {
        meta: EventMeta,
        error: JobError,
        will_retry: bool,
    },
    /// A job was cancelled before or during its run.
    Cancelled {
        meta: EventMeta,
        reason: Option<String>,
    },
    /// A failed attempt is being retried.
    Retry { meta: EventMeta, attempt: u32 },
}

impl JobEvent {
    #[must_use]
    pub fn meta(&self) -> &EventMeta {
        match self {
            Self::Queued { meta }
            | Self::Started { meta, .. }
            | Self::Progress { meta, .. }
            | Self::Completed { meta, .. }
            | Self::Failed { meta, .. }
            | Self::Cancelled { meta, .. }
            | Self::Retry { meta, .. } => meta,
        }
    }

    /// Short, stable name for the event kind, used in log lines and by
    /// filtered subscriptions.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Queued { .. } => "queued",
            Self::Started { .. } => "started",
            Self::Progress { .. } => "progress",
            Self::Completed { .. } => "completed",
            Self::Failed { .. } => "failed",
            Self::Cancelled { .. } => "cancelled",
            Self::Retry { .. } => "retry",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meta_extracts_across_variants() {
        let id = JobId::new();
        let meta = EventMeta::new(id, "q", "t");
        let event = JobEvent::Started {
            meta: meta.clone(),
            attempt: 1,
        };
        assert_eq!(event.meta().job_id, id);
        assert_eq!(event.kind(), "started");
    }
}
