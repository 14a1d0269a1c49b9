//! The `JobHandler` capability and the registry that maps a queue's job
//! types to the handlers and optional validators that process them.

use crate::error::{WorkerError, WorkerErrorKind, WorkerResult};
use async_trait::async_trait;
use dashmap::DashMap;
use jobforge_events::{EventBus, EventMeta, JobEvent};
use jobforge_model::{Job, JobError, JobId, Validator};
use jobforge_storage::StorageAdapter;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Everything a handler needs to process one job attempt: its data,
/// identity, and a way to report progress or notice it has been
/// cancelled.
pub struct JobContext {
    job: Job,
    events: Arc<dyn EventBus>,
    storage: Arc<dyn StorageAdapter>,
    cancellation: CancellationToken,
}

impl JobContext {
    pub(crate) fn new(
        job: Job,
        events: Arc<dyn EventBus>,
        storage: Arc<dyn StorageAdapter>,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            job,
            events,
            storage,
            cancellation,
        }
    }

    #[must_use]
    pub fn job_id(&self) -> JobId {
        self.job.id
    }

    #[must_use]
    pub fn queue_name(&self) -> &str {
        &self.job.queue_name
    }

    #[must_use]
    pub fn job_type(&self) -> &str {
        &self.job.job_type
    }

    #[must_use]
    pub fn data(&self) -> &serde_json::Value {
        &self.job.data
    }

    #[must_use]
    pub fn metadata(&self) -> &std::collections::HashMap<String, String> {
        &self.job.metadata
    }

    /// The token a handler can `select!` against to return early once the
    /// job has been cancelled.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Records progress and publishes a `Progress` event. Handlers call
    /// this as often as they like; it never fails the job if the update
    /// itself errors, it only logs.
    pub async fn progress(&self, percent: u8, message: Option<String>) {
        let mut job = self.job.clone();
        job.progress = percent.min(100);
        job.progress_message = message.clone();
        if let Err(err) = self.storage.update_job(job).await {
            tracing::warn!(job_id = %self.job.id, error = %err, "failed to persist progress update");
        }
        let meta = EventMeta::new(self.job.id, &self.job.queue_name, &self.job.job_type);
        let _ = self
            .events
            .publish(JobEvent::Progress {
                meta,
                progress: percent.min(100),
                message,
            })
            .await;
    }
}

/// The work a job type performs. Registered once per `(queue, job type)`
/// pair; a queue instance builds a `JobContext` per attempt and awaits
/// `handle`.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, ctx: JobContext) -> Result<serde_json::Value, JobError>;
}

#[async_trait]
impl<F, Fut> JobHandler for F
where
    F: Fn(JobContext) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<serde_json::Value, JobError>> + Send,
{
    async fn handle(&self, ctx: JobContext) -> Result<serde_json::Value, JobError> {
        (self)(ctx).await
    }
}

struct Registration {
    handler: Arc<dyn JobHandler>,
    input_validator: Option<Arc<dyn Validator>>,
    output_validator: Option<Arc<dyn Validator>>,
}

/// A handler's registered validators, looked up once per attempt.
#[derive(Clone)]
pub(crate) struct Validators {
    pub input: Option<Arc<dyn Validator>>,
    pub output: Option<Arc<dyn Validator>>,
}

/// Maps `(queue_name, job_type)` to the handler and optional validators
/// that process jobs of that type.
#[derive(Default)]
pub struct HandlerRegistry {
    entries: DashMap<(String, String), Registration>,
}

impl HandlerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for `job_type` on `queue_name`. Fails if one is
    /// already registered for that pair — re-registration is almost always
    /// a bug, not an intentional override.
    pub fn register(
        &self,
        queue_name: impl Into<String>,
        job_type: impl Into<String>,
        handler: Arc<dyn JobHandler>,
    ) -> WorkerResult<()> {
        self.register_with_validators(queue_name, job_type, handler, None, None)
    }

    /// As [`HandlerRegistry::register`], additionally attaching an input
    /// validator run synchronously against the job's payload before it is
    /// enqueued, and an output validator run against the handler's result
    /// once it succeeds.
    pub fn register_with_validators(
        &self,
        queue_name: impl Into<String>,
        job_type: impl Into<String>,
        handler: Arc<dyn JobHandler>,
        input_validator: Option<Arc<dyn Validator>>,
        output_validator: Option<Arc<dyn Validator>>,
    ) -> WorkerResult<()> {
        let key = (queue_name.into(), job_type.into());
        if self.entries.contains_key(&key) {
            return Err(WorkerErrorKind::HandlerAlreadyRegistered {
                queue_name: key.0,
                job_type: key.1,
            }
            .into());
        }
        self.entries.insert(
            key,
            Registration {
                handler,
                input_validator,
                output_validator,
            },
        );
        Ok(())
    }

    pub(crate) fn get(
        &self,
        queue_name: &str,
        job_type: &str,
    ) -> Option<(Arc<dyn JobHandler>, Validators)> {
        self.entries
            .get(&(queue_name.to_string(), job_type.to_string()))
            .map(|entry| {
                (
                    entry.handler.clone(),
                    Validators {
                        input: entry.input_validator.clone(),
                        output: entry.output_validator.clone(),
                    },
                )
            })
    }

    pub(crate) fn require(
        &self,
        queue_name: &str,
        job_type: &str,
    ) -> WorkerResult<(Arc<dyn JobHandler>, Validators)> {
        self.get(queue_name, job_type).ok_or_else(|| {
            WorkerError::from(WorkerErrorKind::HandlerNotFound {
                queue_name: queue_name.to_string(),
                job_type: job_type.to_string(),
            })
        })
    }

    /// Looks up just the input validator for `(queue_name, job_type)`,
    /// without requiring a handler to already be registered — used by
    /// [`crate::instance::QueueInstance::add`] to validate before a handler
    /// necessarily exists.
    pub(crate) fn input_validator(
        &self,
        queue_name: &str,
        job_type: &str,
    ) -> Option<Arc<dyn Validator>> {
        self.entries
            .get(&(queue_name.to_string(), job_type.to_string()))
            .and_then(|entry| entry.input_validator.clone())
    }
}
