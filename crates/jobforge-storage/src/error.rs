//! Error type for the storage layer.

#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct StorageError(#[from] StorageErrorKind);

#[derive(Debug, thiserror::Error)]
pub enum StorageErrorKind {
    #[error("job not found: {id}")]
    JobNotFound { id: String },
    #[error("queue not found: {name}")]
    QueueNotFound { name: String },
    #[error("backend unavailable: {reason}")]
    BackendUnavailable { reason: String },
}

impl StorageError {
    #[must_use]
    pub fn job_not_found(id: impl std::fmt::Display) -> Self {
        Self(StorageErrorKind::JobNotFound { id: id.to_string() })
    }

    #[must_use]
    pub fn queue_not_found(name: impl Into<String>) -> Self {
        Self(StorageErrorKind::QueueNotFound { name: name.into() })
    }

    #[must_use]
    pub fn backend_unavailable(reason: impl Into<String>) -> Self {
        Self(StorageErrorKind::BackendUnavailable {
            reason: reason.into(),
        })
    }
}

pub type StorageResult<T> = Result<T, StorageError>;
