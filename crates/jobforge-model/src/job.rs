//! The `Job` record and its lifecycle state machine.
//!
//! A `Job` is an immutable snapshot: every mutation (status transition,
//! progress update) is expressed by building a new value and handing it to
//! a storage adapter, never by mutating a record in place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Unique job identifier.
///
/// Wrapping the `Uuid` keeps a job id from being accidentally interchanged
/// with a queue name or job type, both of which are plain `String`s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    /// Generates a new random job id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job priority, clamped to `[1, 10]`. Higher runs first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Priority(u8);

/// Default priority used when a caller does not specify one.
pub const DEFAULT_PRIORITY: u8 = 5;

impl Priority {
    /// Lowest legal priority.
    pub const MIN: u8 = 1;
    /// Highest legal priority.
    pub const MAX: u8 = 10;

    /// Builds a `Priority`, clamping out-of-range values into `[1, 10]`
    /// rather than rejecting them — callers that want a hard error should
    /// validate with [`Priority::try_new`] instead.
    #[must_use]
    pub fn new(value: u8) -> Self {
        Self(value.clamp(Self::MIN, Self::MAX))
    }

    /// Builds a `Priority`, rejecting values outside `[1, 10]`.
    pub fn try_new(value: u8) -> Result<Self, PriorityOutOfRange> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(PriorityOutOfRange(value))
        }
    }

    /// Returns the raw priority value.
    #[must_use]
    pub fn value(self) -> u8 {
        self.0
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self(DEFAULT_PRIORITY)
    }
}

/// Raised by [`Priority::try_new`] when a value falls outside `[1, 10]`.
#[derive(Debug, Clone, Copy, thiserror::Error)]
#[error("priority {0} is out of range [1, 10]")]
pub struct PriorityOutOfRange(pub u8);

/// Status of a job. Transitions form the DAG described in the job
/// lifecycle invariants: `Queued -> Running -> {Completed, Failed, Cancelled}`,
/// plus `Queued -> Cancelled` and `Running -> Queued` (retry).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// All statuses considered terminal (no further transitions).
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether `self -> next` is a legal edge in the lifecycle DAG.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Queued, Self::Running)
                | (Self::Queued, Self::Cancelled)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
                | (Self::Running, Self::Cancelled)
                | (Self::Running, Self::Queued)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// Terminal failure detail attached to a `failed` job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl JobError {
    /// Builds a bare error with just a message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            stack: None,
        }
    }

    /// Attaches a machine-readable error code (e.g. `"JobTimeout"`).
    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

/// Code used for jobs whose handler invocation was cancelled via timeout.
pub const ERROR_CODE_TIMEOUT: &str = "JobTimeout";
/// Code used for jobs with no registered handler.
pub const ERROR_CODE_NO_HANDLER: &str = "HandlerNotFound";
/// Code used for jobs that failed output validation.
pub const ERROR_CODE_OUTPUT_VALIDATION: &str = "OutputValidationError";

/// An immutable job snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    #[serde(rename = "type")]
    pub job_type: String,
    pub queue_name: String,
    pub data: serde_json::Value,
    pub status: JobStatus,
    pub priority: Priority,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_message: Option<String>,
    pub queued_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
    pub retries: u32,
    pub max_retries: u32,
    pub timeout_ms: u64,
    pub metadata: HashMap<String, String>,
}

impl Job {
    /// Builds a fresh, `Queued` job ready for submission to an adapter.
    #[must_use]
    pub fn new(
        job_type: impl Into<String>,
        queue_name: impl Into<String>,
        data: serde_json::Value,
        priority: Priority,
        max_retries: u32,
        timeout_ms: u64,
        metadata: HashMap<String, String>,
    ) -> Self {
        Self {
            id: JobId::new(),
            job_type: job_type.into(),
            queue_name: queue_name.into(),
            data,
            status: JobStatus::Queued,
            priority,
            progress: 0,
            progress_message: None,
            queued_at: Utc::now(),
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
            retries: 0,
            max_retries,
            timeout_ms,
            metadata,
        }
    }

    /// True once `retries` has exhausted `max_retries`.
    #[must_use]
    pub fn retries_exhausted(&self) -> bool {
        self.retries >= self.max_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_clamps_out_of_range() {
        assert_eq!(Priority::new(0).value(), 1);
        assert_eq!(Priority::new(255).value(), 10);
        assert_eq!(Priority::new(5).value(), 5);
    }

    #[test]
    fn priority_try_new_rejects_out_of_range() {
        assert!(Priority::try_new(0).is_err());
        assert!(Priority::try_new(11).is_err());
        assert!(Priority::try_new(1).is_ok());
        assert!(Priority::try_new(10).is_ok());
    }

    #[test]
    fn status_transition_dag() {
        assert!(JobStatus::Queued.can_transition_to(JobStatus::Running));
        assert!(JobStatus::Queued.can_transition_to(JobStatus::Cancelled));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Completed));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Failed));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Cancelled));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Queued));

        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Running));
        assert!(!JobStatus::Queued.can_transition_to(JobStatus::Completed));
        assert!(!JobStatus::Cancelled.can_transition_to(JobStatus::Queued));
    }

    #[test]
    fn terminal_statuses() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
    }

    #[test]
    fn job_new_starts_queued_with_zero_retries() {
        let job = Job::new(
            "send-email",
            "emails",
            serde_json::json!({"to": "a@example.com"}),
            Priority::default(),
            3,
            30_000,
            HashMap::new(),
        );
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.retries, 0);
        assert!(!job.retries_exhausted());
        assert_eq!(job.progress, 0);
    }

    #[test]
    fn retries_exhausted_at_bound() {
        let mut job = Job::new(
            "x",
            "q",
            serde_json::Value::Null,
            Priority::default(),
            2,
            1000,
            HashMap::new(),
        );
        assert!(!job.retries_exhausted());
        job.retries = 2;
        assert!(job.retries_exhausted());
    }
}
