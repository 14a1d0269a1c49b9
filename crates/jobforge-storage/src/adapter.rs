//! The `StorageAdapter` contract: a swappable backend for persisting and
//! retrieving jobs. `jobforge-storage` ships an in-memory implementation;
//! hosts that need durability implement this trait against their own
//! database.

use async_trait::async_trait;
use jobforge_model::{Job, JobId, JobStatus};

/// Aggregate counts for a single queue, used by the dashboard gatherer and
/// by callers polling queue health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    pub queued: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl QueueStats {
    #[must_use]
    pub fn total(&self) -> usize {
        self.queued + self.running + self.completed + self.failed + self.cancelled
    }
}

/// Field a `list_jobs` query can sort on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortBy {
    QueuedAt,
    Priority,
    Status,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Filters accepted by `list_jobs`. All fields are optional; an empty
/// filter returns every job in the queue.
#[derive(Debug, Clone, Default)]
pub struct ListFilters {
    pub status: Option<JobStatus>,
    pub job_type: Option<String>,
    pub sort_by: Option<SortBy>,
    pub sort_order: Option<SortOrder>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl ListFilters {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn with_job_type(mut self, job_type: impl Into<String>) -> Self {
        self.job_type = Some(job_type.into());
        self
    }

    #[must_use]
    pub fn with_sort(mut self, by: SortBy, order: SortOrder) -> Self {
        self.sort_by = Some(by);
        self.sort_order = Some(order);
        self
    }

    #[must_use]
    pub fn with_page(mut self, offset: usize, limit: usize) -> Self {
        self.offset = Some(offset);
        self.limit = Some(limit);
        self
    }

    fn matches(&self, job: &Job) -> bool {
        if let Some(status) = self.status {
            if job.status != status {
                return false;
            }
        }
        if let Some(job_type) = &self.job_type {
            if &job.job_type != job_type {
                return false;
            }
        }
        true
    }
}

/// Storage backend contract. All methods are async so a durable adapter can
/// talk to a real database without blocking the scheduling loop.
///
/// `connect`, `disconnect` and `health_check` default to no-ops: the
/// in-memory adapter needs none of them, but a database-backed adapter is
/// expected to override them.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Persists a new job. The job is expected to already be in `Queued`
    /// status with a fresh id.
    async fn enqueue(&self, job: Job) -> Result<(), crate::StorageError>;

    /// Pops the highest-priority, oldest-among-equals `queued` job from the
    /// named queue and marks it `running`, or `None` if the queue is empty.
    async fn dequeue(&self, queue_name: &str) -> Result<Option<Job>, crate::StorageError>;

    /// Looks at the next job that would be returned by `dequeue` without
    /// removing it.
    async fn peek(&self, queue_name: &str) -> Result<Option<Job>, crate::StorageError>;

    /// Fetches a single job by id, regardless of its queue or status.
    async fn get_job(&self, job_id: JobId) -> Result<Option<Job>, crate::StorageError>;

    /// Lists jobs in a queue matching `filters`.
    async fn list_jobs(
        &self,
        queue_name: &str,
        filters: &ListFilters,
    ) -> Result<Vec<Job>, crate::StorageError>;

    /// Overwrites the stored record for a job. Used for every status
    /// transition and progress update.
    async fn update_job(&self, job: Job) -> Result<(), crate::StorageError>;

    /// Permanently removes a job's record. Returns whether a record was
    /// actually removed.
    async fn remove_job(&self, job_id: JobId) -> Result<bool, crate::StorageError>;

    /// Computes aggregate stats for a queue.
    async fn get_queue_stats(&self, queue_name: &str) -> Result<QueueStats, crate::StorageError>;

    /// Lists every queue name the adapter currently has jobs for.
    async fn list_queues(&self) -> Result<Vec<String>, crate::StorageError>;

    /// Establishes any backend connection. No-op by default.
    async fn connect(&self) -> Result<(), crate::StorageError> {
        Ok(())
    }

    /// Releases any backend connection. No-op by default.
    async fn disconnect(&self) -> Result<(), crate::StorageError> {
        Ok(())
    }

    /// Reports whether the backend is reachable. Always healthy by
    /// default.
    async fn health_check(&self) -> Result<(), crate::StorageError> {
        Ok(())
    }
}

pub(crate) fn apply_filters(mut jobs: Vec<Job>, filters: &ListFilters) -> Vec<Job> {
    jobs.retain(|job| filters.matches(job));

    match filters.sort_by {
        Some(SortBy::Priority) => jobs.sort_by_key(|j| std::cmp::Reverse(j.priority)),
        Some(SortBy::Status) => jobs.sort_by_key(|j| j.status),
        Some(SortBy::QueuedAt) | None => jobs.sort_by_key(|j| j.queued_at),
    }
    if filters.sort_order == Some(SortOrder::Descending) {
        jobs.reverse();
    }

    let offset = filters.offset.unwrap_or(0);
    let jobs = jobs.into_iter().skip(offset).collect::<Vec<_>>();
    match filters.limit {
        Some(limit) => jobs.into_iter().take(limit).collect(),
        None => jobs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobforge_model::Priority;
    use rstest::rstest;

    fn job_with(status: JobStatus, priority: u8) -> Job {
        let mut job = Job::new(
            "noop",
            "q",
            serde_json::Value::Null,
            Priority::new(priority),
            3,
            1000,
            Default::default(),
        );
        job.status = status;
        job
    }

    #[rstest]
    #[case(SortBy::Status, vec![JobStatus::Queued, JobStatus::Running, JobStatus::Completed, JobStatus::Failed, JobStatus::Cancelled])]
    fn apply_filters_sorts_by_status_ascending(
        #[case] sort_by: SortBy,
        #[case] expected: Vec<JobStatus>,
    ) {
        let jobs = vec![
            job_with(JobStatus::Cancelled, 5),
            job_with(JobStatus::Queued, 5),
            job_with(JobStatus::Failed, 5),
            job_with(JobStatus::Completed, 5),
            job_with(JobStatus::Running, 5),
        ];
        let filters = ListFilters::new().with_sort(sort_by, SortOrder::Ascending);
        let sorted = apply_filters(jobs, &filters);
        let statuses = sorted.into_iter().map(|j| j.status).collect::<Vec<_>>();
        assert_eq!(statuses, expected);
    }

    #[test]
    fn apply_filters_respects_page() {
        let jobs = (0..5)
            .map(|p| job_with(JobStatus::Queued, p))
            .collect::<Vec<_>>();
        let filters = ListFilters::new()
            .with_sort(SortBy::Priority, SortOrder::Descending)
            .with_page(1, 2);
        let page = apply_filters(jobs, &filters);
        assert_eq!(page.len(), 2);
    }
}
