//! `QueueInstance`: the scheduling loop that pulls jobs off a named queue,
//! runs them against registered handlers with bounded concurrency,
//! timeouts, cancellation, and retry.

use crate::config::SchedulerConfig;
use crate::error::{WorkerErrorKind, WorkerResult};
use crate::registry::{HandlerRegistry, JobContext};
use dashmap::DashMap;
use jobforge_events::{EventBus, EventMeta, JobEvent, Subscription};
use jobforge_model::{
    Job, JobError, JobId, JobStatus, QueueConfig, StopOptions, ValidationTarget,
    ERROR_CODE_OUTPUT_VALIDATION, ERROR_CODE_TIMEOUT,
};
use jobforge_storage::{ListFilters, QueueStats, StorageAdapter};
use parking_lot::Mutex as SyncMutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A running job's cancellation token plus the reason given for cancelling
/// it, if any — stashed here so `execute` can read it back when publishing
/// the `Cancelled` event.
struct Cancellation {
    token: CancellationToken,
    reason: SyncMutex<Option<String>>,
}

/// A single named queue: its storage, handlers, and the background loop
/// that dispatches jobs to them.
pub struct QueueInstance {
    name: String,
    storage: Arc<dyn StorageAdapter>,
    events: Arc<dyn EventBus>,
    handlers: Arc<HandlerRegistry>,
    config: QueueConfig,
    scheduler_config: SchedulerConfig,
    semaphore: Arc<Semaphore>,
    notify: Arc<Notify>,
    cancellations: Arc<DashMap<JobId, Arc<Cancellation>>>,
    inflight: Arc<DashMap<JobId, JoinHandle<()>>>,
    shutdown: std::sync::Mutex<CancellationToken>,
    loop_handle: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl QueueInstance {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        storage: Arc<dyn StorageAdapter>,
        events: Arc<dyn EventBus>,
        handlers: Arc<HandlerRegistry>,
        config: QueueConfig,
    ) -> Self {
        let concurrency = config.concurrency;
        Self {
            name: name.into(),
            storage,
            events,
            handlers,
            config,
            scheduler_config: SchedulerConfig::default(),
            semaphore: Arc::new(Semaphore::new(concurrency)),
            notify: Arc::new(Notify::new()),
            cancellations: Arc::new(DashMap::new()),
            inflight: Arc::new(DashMap::new()),
            shutdown: std::sync::Mutex::new(CancellationToken::new()),
            loop_handle: std::sync::Mutex::new(None),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// This queue's configured maximum number of concurrently running jobs.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.config.concurrency
    }

    /// Starts the scheduling loop. Reconciles any jobs left `running` from
    /// a previous process back to `queued` first, when configured to.
    pub async fn start(self: &Arc<Self>) -> WorkerResult<()> {
        {
            let guard = self.loop_handle.lock().expect("lock poisoned");
            if guard.is_some() {
                return Err(WorkerErrorKind::AlreadyRunning {
                    name: self.name.clone(),
                }
                .into());
            }
        }

        if self.config.reconcile_on_start {
            self.reconcile().await?;
        }

        let token = CancellationToken::new();
        *self.shutdown.lock().expect("lock poisoned") = token.clone();

        let this = Arc::clone(self);
        let handle = tokio::spawn(async move { this.run_loop(token).await });
        *self.loop_handle.lock().expect("lock poisoned") = Some(handle);
        Ok(())
    }

    /// Signals the loop to stop, then winds down in-flight jobs according
    /// to `opts`: `graceful` waits up to `timeout_ms` for each to finish on
    /// its own before aborting the remainder; a non-graceful stop aborts
    /// every in-flight job immediately. Either way, a job aborted here is
    /// left `running` in storage so a subsequent `start`'s reconcile step
    /// requeues it rather than losing it.
    pub async fn stop(&self, opts: StopOptions) -> WorkerResult<()> {
        let handle = self.loop_handle.lock().expect("lock poisoned").take();
        let Some(handle) = handle else {
            return Err(WorkerErrorKind::NotRunning {
                name: self.name.clone(),
            }
            .into());
        };
        self.shutdown.lock().expect("lock poisoned").cancel();
        let _ = handle.await;

        let ids = self
            .inflight
            .iter()
            .map(|entry| *entry.key())
            .collect::<Vec<_>>();

        if !opts.graceful {
            for id in ids {
                if let Some((_, task)) = self.inflight.remove(&id) {
                    task.abort();
                }
            }
            return Ok(());
        }

        let deadline = tokio::time::Instant::now() + Duration::from_millis(opts.timeout_ms);
        for id in ids {
            let Some((_, task)) = self.inflight.remove(&id) else {
                continue;
            };
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            let abort_handle = task.abort_handle();
            if tokio::time::timeout(remaining, task).await.is_err() {
                abort_handle.abort();
            }
        }
        Ok(())
    }

    /// Finds jobs stuck `running` from a prior process and requeues them.
    async fn reconcile(&self) -> WorkerResult<()> {
        let stuck = self
            .storage
            .list_jobs(&self.name, &ListFilters::new().with_status(JobStatus::Running))
            .await?;
        for mut job in stuck {
            tracing::info!(job_id = %job.id, queue = %self.name, "reconciling job stuck running on startup");
            job.status = JobStatus::Queued;
            job.started_at = None;
            self.storage.update_job(job).await?;
        }
        Ok(())
    }

    /// Validates and adds a job to this queue, waking the scheduling loop.
    /// Rejects the job synchronously, without ever enqueueing it, when an
    /// input validator is registered for its job type and rejects the
    /// payload.
    pub async fn add(&self, job: Job) -> WorkerResult<JobId> {
        if let Some(validator) = self.handlers.input_validator(&job.queue_name, &job.job_type) {
            let outcome = validator.validate(ValidationTarget::Input, &job.data).await;
            if !outcome.is_valid() {
                return Err(jobforge_model::ModelError::job_validation(outcome.into_issues()).into());
            }
        }

        let id = job.id;
        let meta = EventMeta::new(id, &job.queue_name, &job.job_type);
        self.storage.enqueue(job).await?;
        let _ = self.events.publish(JobEvent::Queued { meta }).await;
        self.notify.notify_one();
        Ok(id)
    }

    /// Cancels a job, returning whether it was actually cancelled (`false`
    /// when the job was already terminal). Idempotent: cancelling an
    /// already-cancelled job succeeds, reporting `false`.
    pub async fn cancel(&self, job_id: JobId, reason: Option<String>) -> WorkerResult<bool> {
        if let Some(cancellation) = self.cancellations.get(&job_id) {
            *cancellation.reason.lock() = reason;
            cancellation.token.cancel();
            return Ok(true);
        }

        let Some(job) = self.storage.get_job(job_id).await? else {
            return Err(WorkerErrorKind::JobNotFound {
                id: job_id.to_string(),
            }
            .into());
        };
        if job.status.is_terminal() {
            return Ok(false);
        }

        let mut job = job;
        job.status = JobStatus::Cancelled;
        job.completed_at = Some(chrono::Utc::now());
        let meta = EventMeta::new(job.id, &job.queue_name, &job.job_type);
        self.storage.update_job(job).await?;
        let _ = self.events.publish(JobEvent::Cancelled { meta, reason }).await;
        Ok(true)
    }

    pub async fn get_job(&self, job_id: JobId) -> WorkerResult<Option<Job>> {
        Ok(self.storage.get_job(job_id).await?)
    }

    pub async fn list_jobs(&self, filters: &ListFilters) -> WorkerResult<Vec<Job>> {
        Ok(self.storage.list_jobs(&self.name, filters).await?)
    }

    pub async fn stats(&self) -> WorkerResult<QueueStats> {
        Ok(self.storage.get_queue_stats(&self.name).await?)
    }

    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        self.events.subscribe()
    }

    /// A subscription filtered to just `job_id`'s events.
    #[must_use]
    pub fn subscribe_job(&self, job_id: JobId) -> Subscription {
        self.events.subscribe_job(job_id)
    }

    async fn run_loop(self: Arc<Self>, shutdown: CancellationToken) {
        let poll_interval = Duration::from_millis(self.scheduler_config.poll_interval_ms);
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                () = self.notify.notified() => {},
                () = tokio::time::sleep(poll_interval) => {},
            }

            loop {
                if shutdown.is_cancelled() {
                    return;
                }
                let permit = match Arc::clone(&self.semaphore).try_acquire_owned() {
                    Ok(permit) => permit,
                    Err(_) => break,
                };
                match self.storage.dequeue(&self.name).await {
                    Ok(Some(job)) => {
                        let this = Arc::clone(&self);
                        let job_id = job.id;
                        let inflight = Arc::clone(&self.inflight);
                        let handle = tokio::spawn(async move {
                            this.execute(job).await;
                            inflight.remove(&job_id);
                            drop(permit);
                        });
                        self.inflight.insert(job_id, handle);
                    }
                    Ok(None) => {
                        drop(permit);
                        break;
                    }
                    Err(err) => {
                        tracing::error!(queue = %self.name, error = %err, "dequeue failed");
                        drop(permit);
                        break;
                    }
                }
            }
        }
    }

    async fn execute(self: &Arc<Self>, job: Job) {
        let cancellation = Arc::new(Cancellation {
            token: CancellationToken::new(),
            reason: SyncMutex::new(None),
        });
        self.cancellations.insert(job.id, Arc::clone(&cancellation));

        let meta = EventMeta::new(job.id, &job.queue_name, &job.job_type);
        let _ = self
            .events
            .publish(JobEvent::Started {
                meta: meta.clone(),
                attempt: job.retries + 1,
            })
            .await;

        let outcome = self.run_attempt(job.clone(), cancellation.token.clone()).await;
        self.cancellations.remove(&job.id);

        match outcome {
            Attempt::Completed(value) => self.finalize_completed(job, value).await,
            Attempt::Cancelled => {
                let reason = cancellation.reason.lock().clone();
                self.finalize_cancelled(job, reason).await;
            }
            Attempt::Failed { error, retryable } => {
                self.finalize_failed(job, error, retryable).await;
            }
        }
    }

    async fn run_attempt(&self, job: Job, token: CancellationToken) -> Attempt {
        let (handler, validators) = match self.handlers.require(&job.queue_name, &job.job_type) {
            Ok(pair) => pair,
            Err(_) => {
                return Attempt::Failed {
                    error: JobError::new(format!(
                        "no handler registered for job type \"{}\"",
                        job.job_type
                    ))
                    .with_code(jobforge_model::ERROR_CODE_NO_HANDLER),
                    retryable: false,
                };
            }
        };

        let ctx = JobContext::new(
            job.clone(),
            Arc::clone(&self.events),
            Arc::clone(&self.storage),
            token.clone(),
        );
        let timeout = tokio::time::sleep(Duration::from_millis(job.timeout_ms));

        let result = tokio::select! {
            biased;
            () = token.cancelled() => return Attempt::Cancelled,
            () = timeout => return Attempt::Failed {
                error: JobError::new(format!("handler exceeded timeout of {}ms", job.timeout_ms))
                    .with_code(ERROR_CODE_TIMEOUT),
                retryable: true,
            },
            result = handler.handle(ctx) => result,
        };

        let value = match result {
            Ok(value) => value,
            Err(err) => return Attempt::Failed { error: err, retryable: true },
        };

        if let Some(validator) = &validators.output {
            let outcome = validator.validate(ValidationTarget::Output, &value).await;
            if !outcome.is_valid() {
                let message = outcome
                    .issues()
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; ");
                return Attempt::Failed {
                    error: JobError::new(message).with_code(ERROR_CODE_OUTPUT_VALIDATION),
                    retryable: false,
                };
            }
        }

        Attempt::Completed(value)
    }

    async fn finalize_completed(&self, mut job: Job, value: serde_json::Value) {
        job.status = JobStatus::Completed;
        job.progress = 100;
        job.result = Some(value.clone());
        job.completed_at = Some(chrono::Utc::now());
        let meta = EventMeta::new(job.id, &job.queue_name, &job.job_type);
        if let Err(err) = self.storage.update_job(job).await {
            tracing::error!(error = %err, "failed to persist completed job");
        }
        let _ = self
            .events
            .publish(JobEvent::Completed {
                meta,
                result: value,
            })
            .await;
    }

    async fn finalize_cancelled(&self, mut job: Job, reason: Option<String>) {
        job.status = JobStatus::Cancelled;
        job.completed_at = Some(chrono::Utc::now());
        let meta = EventMeta::new(job.id, &job.queue_name, &job.job_type);
        if let Err(err) = self.storage.update_job(job).await {
            tracing::error!(error = %err, "failed to persist cancelled job");
        }
        let _ = self.events.publish(JobEvent::Cancelled { meta, reason }).await;
    }

    /// `retryable` gates whether an attempt that did not complete gets
    /// requeued for another try. Output validation failures and missing
    /// handlers set it `false` so a job fails terminally on the spot
    /// rather than retrying against input that will never pass.
    async fn finalize_failed(&self, mut job: Job, error: JobError, retryable: bool) {
        let meta = EventMeta::new(job.id, &job.queue_name, &job.job_type);
        if !retryable || job.retries_exhausted() {
            job.status = JobStatus::Failed;
            job.completed_at = Some(chrono::Utc::now());
            job.error = Some(error.clone());
            if let Err(err) = self.storage.update_job(job).await {
                tracing::error!(error = %err, "failed to persist failed job");
            }
            let _ = self
                .events
                .publish(JobEvent::Failed {
                    meta,
                    error,
                    will_retry: false,
                })
                .await;
            return;
        }

        job.retries += 1;
        job.status = JobStatus::Queued;
        job.started_at = None;
        job.error = Some(error.clone());
        let attempt = job.retries + 1;
        if let Err(err) = self.storage.update_job(job).await {
            tracing::error!(error = %err, "failed to persist job for retry");
        }
        let _ = self
            .events
            .publish(JobEvent::Failed {
                meta: meta.clone(),
                error,
                will_retry: true,
            })
            .await;
        let _ = self.events.publish(JobEvent::Retry { meta, attempt }).await;
        self.notify.notify_one();
    }
}

enum Attempt {
    Completed(serde_json::Value),
    Cancelled,
    Failed { error: JobError, retryable: bool },
}
