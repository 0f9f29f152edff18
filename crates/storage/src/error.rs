use time::OffsetDateTime;

/// All errors that can be returned by a RunStorage implementation or the
/// Run Store operations built on it.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The run failed validation. Not retriable.
    #[error("{0}")]
    Validation(String),

    /// No run with the given (project, attempt_timestamp).
    #[error("reclustering run not found: {project}/{attempt_timestamp}")]
    RunNotFound {
        project: String,
        attempt_timestamp: OffsetDateTime,
    },

    /// A run with this (project, attempt_timestamp) already exists.
    #[error("reclustering run already exists: {project}/{attempt_timestamp}")]
    AlreadyExists {
        project: String,
        attempt_timestamp: OffsetDateTime,
    },

    /// A write was attempted through a read-only snapshot.
    #[error("cannot write in a read-only snapshot")]
    ReadOnlySnapshot,

    /// A backend-specific storage error (connection, lock, injected fault).
    /// The outcome of the surrounding transaction is unknown.
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::RunNotFound { .. })
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, StorageError::Validation(_))
    }

    pub(crate) fn not_found(project: &str, attempt_timestamp: OffsetDateTime) -> Self {
        StorageError::RunNotFound {
            project: project.to_string(),
            attempt_timestamp,
        }
    }
}
