//! `QueueService`: the facade most callers use instead of wiring up
//! storage, events, a handler registry, and a `QueueInstance` per queue by
//! hand.

use crate::error::{ServiceErrorKind, ServiceResult};
use dashmap::DashMap;
use jobforge_events::EventBus;
use jobforge_model::{Job, JobId, JobOptions, QueueConfig, StopOptions};
use jobforge_queue::{HandlerRegistry, JobHandler, QueueInstance};
use jobforge_storage::{ListFilters, QueueStats, StorageAdapter};
use std::sync::Arc;

/// Owns the shared storage adapter, event bus, and handler registry, and
/// creates/holds a `QueueInstance` per named queue.
pub struct QueueService {
    storage: Arc<dyn StorageAdapter>,
    events: Arc<dyn EventBus>,
    handlers: Arc<HandlerRegistry>,
    queues: DashMap<String, Arc<QueueInstance>>,
}

impl QueueService {
    #[must_use]
    pub fn new(storage: Arc<dyn StorageAdapter>, events: Arc<dyn EventBus>) -> Self {
        Self {
            storage,
            events,
            handlers: Arc::new(HandlerRegistry::new()),
            queues: DashMap::new(),
        }
    }

    /// Builds a `QueueService` backed by the in-memory adapter and a local
    /// event bus, for callers who don't need durability or cross-process
    /// events.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(jobforge_storage::InMemoryAdapter::new()),
            Arc::new(jobforge_events::LocalEventBus::new()),
        )
    }

    /// Declares a new queue. Fails if one with this name already exists.
    pub fn create_queue(
        &self,
        name: impl Into<String>,
        config: QueueConfig,
    ) -> ServiceResult<Arc<QueueInstance>> {
        let name = name.into();
        if self.queues.contains_key(&name) {
            return Err(ServiceErrorKind::QueueAlreadyExists { name }.into());
        }
        let instance = Arc::new(QueueInstance::new(
            name.clone(),
            Arc::clone(&self.storage),
            Arc::clone(&self.events),
            Arc::clone(&self.handlers),
            config,
        ));
        self.queues.insert(name, Arc::clone(&instance));
        Ok(instance)
    }

    #[must_use]
    pub fn queue(&self, name: &str) -> Option<Arc<QueueInstance>> {
        self.queues.get(name).map(|entry| Arc::clone(&entry))
    }

    fn require_queue(&self, name: &str) -> ServiceResult<Arc<QueueInstance>> {
        self.queue(name).ok_or_else(|| {
            ServiceErrorKind::QueueNotFound {
                name: name.to_string(),
            }
            .into()
        })
    }

    /// Registers a handler for `job_type` on `queue_name`. The queue need
    /// not exist yet — handlers and queues are independent registrations
    /// joined at dispatch time.
    pub fn register_handler(
        &self,
        queue_name: impl Into<String>,
        job_type: impl Into<String>,
        handler: Arc<dyn JobHandler>,
    ) -> ServiceResult<()> {
        self.handlers
            .register(queue_name, job_type, handler)
            .map_err(Into::into)
    }

    /// Adds a job to a queue, applying `options` for priority, retry, and
    /// timeout.
    pub async fn add_job(
        &self,
        queue_name: impl Into<String>,
        job_type: impl Into<String>,
        data: serde_json::Value,
        options: JobOptions,
    ) -> ServiceResult<JobId> {
        let queue_name = queue_name.into();
        let queue = self.require_queue(&queue_name)?;
        let job = Job::new(
            job_type,
            queue_name,
            data,
            options.priority,
            options.max_retries,
            options.timeout_ms,
            options.metadata,
        );
        Ok(queue.add(job).await?)
    }

    /// Fetches a job by id, regardless of which queue it belongs to.
    pub async fn get_job(&self, job_id: JobId) -> ServiceResult<Option<Job>> {
        Ok(self.storage.get_job(job_id).await?)
    }

    pub async fn list_jobs(
        &self,
        queue_name: &str,
        filters: &ListFilters,
    ) -> ServiceResult<Vec<Job>> {
        Ok(self.storage.list_jobs(queue_name, filters).await?)
    }

    /// Cancels a job by id, routing to whichever queue it belongs to.
    /// Returns whether the job was actually cancelled.
    pub async fn cancel_job(
        &self,
        job_id: JobId,
        reason: Option<String>,
    ) -> ServiceResult<bool> {
        let Some(job) = self.storage.get_job(job_id).await? else {
            return Err(ServiceErrorKind::JobNotFound {
                id: job_id.to_string(),
            }
            .into());
        };
        let queue = self.require_queue(&job.queue_name)?;
        Ok(queue.cancel(job_id, reason).await?)
    }

    pub async fn get_queue_stats(&self, queue_name: &str) -> ServiceResult<QueueStats> {
        Ok(self.storage.get_queue_stats(queue_name).await?)
    }

    pub async fn list_queues(&self) -> ServiceResult<Vec<String>> {
        Ok(self.storage.list_queues().await?)
    }

    /// Starts every declared queue's scheduling loop.
    pub async fn start_all(&self) -> ServiceResult<()> {
        for entry in &self.queues {
            entry.value().start().await?;
        }
        Ok(())
    }

    /// Stops every declared queue's scheduling loop, winding down
    /// in-flight jobs per `opts`.
    pub async fn stop_all(&self, opts: StopOptions) -> ServiceResult<()> {
        for entry in &self.queues {
            entry.value().stop(opts).await?;
        }
        Ok(())
    }

    pub(crate) fn storage(&self) -> &Arc<dyn StorageAdapter> {
        &self.storage
    }

    pub(crate) fn queue_names(&self) -> Vec<String> {
        self.queues.iter().map(|e| e.key().clone()).collect()
    }
}
