//! Error type for the scheduling layer.

#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct WorkerError(#[from] WorkerErrorKind);

#[derive(Debug, thiserror::Error)]
pub enum WorkerErrorKind {
    #[error("job not found: {id}")]
    JobNotFound { id: String },
    #[error("no handler registered for job type \"{job_type}\" on queue \"{queue_name}\"")]
    HandlerNotFound {
        queue_name: String,
        job_type: String,
    },
    #[error("handler already registered for job type \"{job_type}\" on queue \"{queue_name}\"")]
    HandlerAlreadyRegistered {
        queue_name: String,
        job_type: String,
    },
    #[error("queue \"{name}\" is already running")]
    AlreadyRunning { name: String },
    #[error("queue \"{name}\" is not running")]
    NotRunning { name: String },
    #[error(transparent)]
    Storage(#[from] jobforge_storage::StorageError),
    #[error(transparent)]
    Validation(#[from] jobforge_model::ModelError),
}

impl From<jobforge_storage::StorageError> for WorkerError {
    fn from(e: jobforge_storage::StorageError) -> Self {
        Self(WorkerErrorKind::Storage(e))
    }
}

impl From<jobforge_model::ModelError> for WorkerError {
    fn from(e: jobforge_model::ModelError) -> Self {
        Self(WorkerErrorKind::Validation(e))
    }
}

pub type WorkerResult<T> = Result<T, WorkerError>;
