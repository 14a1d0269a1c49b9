//! An in-memory `StorageAdapter`, backed by `DashMap` for job records and a
//! `parking_lot`-guarded `PriorityQueue` per queue for scheduling order.
//!
//! Nothing here survives a process restart; durability is a concern for a
//! real adapter, not this one. It exists so jobforge is usable without a
//! database and so the queue scheduling logic can be exercised in tests
//! without one.

use crate::adapter::{apply_filters, ListFilters, QueueStats, StorageAdapter};
use crate::error::StorageError;
use crate::priority_queue::PriorityQueue;
use async_trait::async_trait;
use dashmap::DashMap;
use jobforge_model::{Job, JobId, JobStatus};
use parking_lot::Mutex;

/// In-memory storage adapter. Cheap to construct, cheap to clone via
/// `Arc<InMemoryAdapter>` — all interior state lives behind `DashMap` and
/// `Mutex`.
#[derive(Default)]
pub struct InMemoryAdapter {
    jobs: DashMap<JobId, Job>,
    order: DashMap<String, Mutex<PriorityQueue<JobId>>>,
}

impl InMemoryAdapter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn order_for(&self, queue_name: &str) -> dashmap::mapref::one::Ref<'_, String, Mutex<PriorityQueue<JobId>>> {
        if !self.order.contains_key(queue_name) {
            self.order
                .entry(queue_name.to_string())
                .or_insert_with(|| Mutex::new(PriorityQueue::new()));
        }
        self.order.get(queue_name).expect("just inserted")
    }
}

#[async_trait]
impl StorageAdapter for InMemoryAdapter {
    async fn enqueue(&self, job: Job) -> Result<(), StorageError> {
        let queue_name = job.queue_name.clone();
        let priority = job.priority;
        let id = job.id;
        self.jobs.insert(id, job);
        self.order_for(&queue_name).lock().enqueue(priority, id);
        Ok(())
    }

    async fn dequeue(&self, queue_name: &str) -> Result<Option<Job>, StorageError> {
        let order = self.order_for(queue_name);
        loop {
            let Some(id) = order.lock().dequeue() else {
                return Ok(None);
            };
            // A job popped from the order queue may already have been
            // removed (cancelled and purged) between enqueue and dequeue;
            // skip stale entries rather than surface them.
            let Some(mut entry) = self.jobs.get_mut(&id) else {
                continue;
            };
            if entry.status != JobStatus::Queued {
                continue;
            }
            entry.status = JobStatus::Running;
            entry.started_at = Some(chrono::Utc::now());
            return Ok(Some(entry.clone()));
        }
    }

    async fn peek(&self, queue_name: &str) -> Result<Option<Job>, StorageError> {
        let order = self.order_for(queue_name);
        let guard = order.lock();
        let Some(id) = guard.peek().copied() else {
            return Ok(None);
        };
        Ok(self.jobs.get(&id).map(|j| j.clone()))
    }

    async fn get_job(&self, job_id: JobId) -> Result<Option<Job>, StorageError> {
        Ok(self.jobs.get(&job_id).map(|j| j.clone()))
    }

    async fn list_jobs(
        &self,
        queue_name: &str,
        filters: &ListFilters,
    ) -> Result<Vec<Job>, StorageError> {
        let jobs = self
            .jobs
            .iter()
            .filter(|entry| entry.queue_name == queue_name)
            .map(|entry| entry.clone())
            .collect::<Vec<_>>();
        Ok(apply_filters(jobs, filters))
    }

    async fn update_job(&self, job: Job) -> Result<(), StorageError> {
        let retry_into_queue = job.status == JobStatus::Queued;
        let queue_name = job.queue_name.clone();
        let priority = job.priority;
        let id = job.id;
        self.jobs.insert(id, job);
        if retry_into_queue {
            // A job transitioning back to `Queued` (a retry) needs a fresh
            // order-queue entry; `dequeue` already skips entries whose
            // stored status no longer matches what it popped, so this does
            // not risk a double-dequeue.
            self.order_for(&queue_name).lock().enqueue(priority, id);
        }
        Ok(())
    }

    async fn remove_job(&self, job_id: JobId) -> Result<bool, StorageError> {
        Ok(self.jobs.remove(&job_id).is_some())
    }

    async fn get_queue_stats(&self, queue_name: &str) -> Result<QueueStats, StorageError> {
        let mut stats = QueueStats::default();
        for entry in &self.jobs {
            if entry.queue_name != queue_name {
                continue;
            }
            match entry.status {
                JobStatus::Queued => stats.queued += 1,
                JobStatus::Running => stats.running += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
                JobStatus::Cancelled => stats.cancelled += 1,
            }
        }
        Ok(stats)
    }

    async fn list_queues(&self) -> Result<Vec<String>, StorageError> {
        let mut names = self
            .jobs
            .iter()
            .map(|entry| entry.queue_name.clone())
            .collect::<Vec<_>>();
        names.sort();
        names.dedup();
        Ok(names)
    }
}
