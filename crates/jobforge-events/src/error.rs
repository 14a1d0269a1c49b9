//! Error type for the event bus.

#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct EventsError(#[from] EventsErrorKind);

#[derive(Debug, thiserror::Error)]
pub enum EventsErrorKind {
    #[error("failed to publish event: {reason}")]
    PublishFailed { reason: String },
}

impl EventsError {
    #[must_use]
    pub fn publish_failed(reason: impl Into<String>) -> Self {
        Self(EventsErrorKind::PublishFailed {
            reason: reason.into(),
        })
    }
}
