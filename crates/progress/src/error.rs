use recluster_storage::StorageError;
use time::OffsetDateTime;

/// Errors from progress reporting, aggregation and orchestration.
#[derive(Debug, thiserror::Error)]
pub enum ProgressError {
    /// Bad input from the caller. Not retriable.
    #[error("{0}")]
    Validation(String),

    /// The token saw a failure with an unknown outcome and must be
    /// discarded. Report again through a new token.
    #[error("progress token is invalid: an earlier report failed with an unknown outcome")]
    TokenInvalid,

    /// A run at or after the proposed attempt start already exists.
    #[error(
        "an attempt which overlaps the proposed attempt already exists: existing {existing}, proposed start {proposed}"
    )]
    OverlappingAttempt {
        existing: OffsetDateTime,
        proposed: OffsetDateTime,
    },

    /// Every project needs at least one worker.
    #[error("more projects configured ({projects}) than workers ({workers})")]
    TooFewWorkers { projects: usize, workers: i64 },

    #[error(transparent)]
    Storage(#[from] StorageError),
}
