//! A pure snapshot of every queue's stats, for a host to render on a
//! dashboard or export to a metrics backend. Gathering is read-only and
//! touches no scheduling state.

use crate::error::ServiceResult;
use crate::service::QueueService;
use chrono::{DateTime, Utc};
use jobforge_model::Job;
use jobforge_storage::{ListFilters, QueueStats, SortBy, SortOrder};
use serde::{Deserialize, Serialize};

/// Most-recent jobs shown per queue on the dashboard.
pub const RECENT_JOBS_LIMIT: usize = 20;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueSnapshot {
    pub name: String,
    pub stats: QueueStats,
    pub concurrency: usize,
    pub recent_jobs: Vec<Job>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSnapshot {
    pub generated_at: DateTime<Utc>,
    pub queues: Vec<QueueSnapshot>,
}

impl DashboardSnapshot {
    /// Gathers stats, concurrency, and the most recently queued jobs for
    /// every queue the service knows about.
    pub async fn gather(service: &QueueService) -> ServiceResult<Self> {
        let mut queues = Vec::new();
        for name in service.queue_names() {
            let stats = service.storage().get_queue_stats(&name).await?;
            let concurrency = service
                .queue(&name)
                .map(|instance| instance.concurrency())
                .unwrap_or_default();
            let recent_jobs = service
                .list_jobs(
                    &name,
                    &ListFilters::new()
                        .with_sort(SortBy::QueuedAt, SortOrder::Descending)
                        .with_page(0, RECENT_JOBS_LIMIT),
                )
                .await?;
            queues.push(QueueSnapshot {
                name,
                stats,
                concurrency,
                recent_jobs,
            });
        }
        Ok(Self {
            generated_at: Utc::now(),
            queues,
        })
    }

    #[must_use]
    pub fn total_jobs(&self) -> usize {
        self.queues.iter().map(|q| q.stats.total()).sum()
    }
}
