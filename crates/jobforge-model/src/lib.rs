//! # jobforge-model
//!
//! The data model shared by every other jobforge crate: the `Job` record
//! and its lifecycle, caller-facing options, and the `Validator`
//! capability. Has no opinion on how jobs are stored, scheduled, or run —
//! those live in `jobforge-storage` and `jobforge-queue`.

#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod job;
pub mod options;
pub mod validation;

pub use job::{
    Job, JobError, JobId, JobStatus, Priority, PriorityOutOfRange, ERROR_CODE_NO_HANDLER,
    ERROR_CODE_OUTPUT_VALIDATION, ERROR_CODE_TIMEOUT,
};
pub use options::{
    JobOptions, QueueConfig, StopOptions, DEFAULT_CONCURRENCY, DEFAULT_MAX_RETRIES,
    DEFAULT_STOP_TIMEOUT_MS, DEFAULT_TIMEOUT_MS, MAX_CONCURRENCY, MAX_MAX_RETRIES,
    MAX_TIMEOUT_MS, MIN_CONCURRENCY, MIN_MAX_RETRIES, MIN_TIMEOUT_MS,
};
pub use validation::{
    FnValidator, ModelError, ModelErrorKind, ValidationIssue, ValidationIssueList,
    ValidationOutcome, ValidationTarget, Validator,
};
