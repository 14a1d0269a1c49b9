//! Runtime tuning for a queue instance's scheduling loop, separate from the
//! caller-facing [`jobforge_model::QueueConfig`] because it governs
//! internal polling behavior rather than job semantics.

/// Fallback poll interval used when the loop's `Notify` wake-up is missed
/// (e.g. a retry re-enqueues while the loop is between iterations). Kept
/// short since it is only a backstop, not the primary wake mechanism.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 50;

#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    pub poll_interval_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}
