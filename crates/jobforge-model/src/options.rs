//! Caller-facing options for submitting jobs and configuring queues.

use crate::job::Priority;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Default number of attempts (first run plus retries) before a job is
/// marked `failed` for good.
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Default per-attempt handler timeout.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
/// Inclusive bounds on `max_retries`.
pub const MIN_MAX_RETRIES: u32 = 0;
pub const MAX_MAX_RETRIES: u32 = 10;
/// Inclusive bounds on `timeout_ms`.
pub const MIN_TIMEOUT_MS: u64 = 1_000;
pub const MAX_TIMEOUT_MS: u64 = 3_600_000;

/// Options accepted when adding a job to a queue. Every field has a
/// sensible default so callers can supply only what they care about.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JobOptions {
    pub priority: Priority,
    pub max_retries: u32,
    pub timeout_ms: u64,
    pub metadata: HashMap<String, String>,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            priority: Priority::default(),
            max_retries: DEFAULT_MAX_RETRIES,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            metadata: HashMap::new(),
        }
    }
}

impl JobOptions {
    /// Starts from defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Clamped to `[0, 10]`.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.clamp(MIN_MAX_RETRIES, MAX_MAX_RETRIES);
        self
    }

    /// Clamped to `[1000ms, 3_600_000ms]`.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        let millis = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self.timeout_ms = millis.clamp(MIN_TIMEOUT_MS, MAX_TIMEOUT_MS);
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: HashMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Default number of jobs a queue runs concurrently when not overridden.
pub const DEFAULT_CONCURRENCY: usize = 5;
/// Inclusive bounds on `concurrency`.
pub const MIN_CONCURRENCY: usize = 1;
pub const MAX_CONCURRENCY: usize = 100;

/// Queue-wide defaults and behavior, set once when a queue is created.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueueConfig {
    /// Maximum number of jobs this queue runs at the same time.
    pub concurrency: usize,
    /// Options applied to a job when the caller's own options omit them.
    pub defaults: JobOptions,
    /// Whether jobs left `running` from a previous process should be
    /// reconciled back to `queued` on startup.
    pub reconcile_on_start: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            defaults: JobOptions::default(),
            reconcile_on_start: true,
        }
    }
}

impl QueueConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Clamped to `[1, 100]`.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.clamp(MIN_CONCURRENCY, MAX_CONCURRENCY);
        self
    }

    #[must_use]
    pub fn with_defaults(mut self, defaults: JobOptions) -> Self {
        self.defaults = defaults;
        self
    }

    #[must_use]
    pub fn with_reconcile_on_start(mut self, reconcile: bool) -> Self {
        self.reconcile_on_start = reconcile;
        self
    }
}

/// Default time a graceful stop waits for in-flight jobs before aborting
/// the remainder.
pub const DEFAULT_STOP_TIMEOUT_MS: u64 = 30_000;

/// How a queue (or the whole service) should wind down in-flight jobs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StopOptions {
    /// Waits up to `timeout_ms` for in-flight jobs to finish before
    /// aborting the remainder. `false` aborts every in-flight job
    /// immediately.
    pub graceful: bool,
    pub timeout_ms: u64,
}

impl Default for StopOptions {
    fn default() -> Self {
        Self {
            graceful: true,
            timeout_ms: DEFAULT_STOP_TIMEOUT_MS,
        }
    }
}

impl StopOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn immediate() -> Self {
        Self {
            graceful: false,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_graceful(mut self, graceful: bool) -> Self {
        self.graceful = graceful;
        self
    }

    #[must_use]
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}
