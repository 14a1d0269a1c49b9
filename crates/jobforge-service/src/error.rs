//! Error type for the service facade.

#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct ServiceError(#[from] ServiceErrorKind);

#[derive(Debug, thiserror::Error)]
pub enum ServiceErrorKind {
    #[error("queue \"{name}\" already exists")]
    QueueAlreadyExists { name: String },
    #[error("queue \"{name}\" does not exist")]
    QueueNotFound { name: String },
    #[error("job not found: {id}")]
    JobNotFound { id: String },
    #[error("jobforge has not been initialized, call jobforge_service::initialize() first")]
    NotInitialized,
    #[error("jobforge has already been initialized")]
    AlreadyInitialized,
    #[error(transparent)]
    Storage(#[from] jobforge_storage::StorageError),
    #[error(transparent)]
    Worker(#[from] jobforge_queue::WorkerError),
}

impl From<jobforge_storage::StorageError> for ServiceError {
    fn from(e: jobforge_storage::StorageError) -> Self {
        Self(ServiceErrorKind::Storage(e))
    }
}

impl From<jobforge_queue::WorkerError> for ServiceError {
    fn from(e: jobforge_queue::WorkerError) -> Self {
        Self(ServiceErrorKind::Worker(e))
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
