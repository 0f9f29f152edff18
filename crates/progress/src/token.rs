//! Per-shard progress reporting.
//!
//! A shard reports its absolute progress (0..=1000 per-mille) as often as it
//! likes. The token remembers the last value it got committed and writes
//! only the difference, so the run's `progress` column ends up as the sum of
//! every shard's latest value.
//!
//! If a report fails, the token cannot know whether the store applied the
//! delta. Retrying with a recomputed delta could apply it twice and push the
//! run past 100%, so the token turns invalid instead and refuses every later
//! report. The shard has to start over with a new token. At worst this
//! under-reports in-flight progress; it never over-reports completion.

use std::sync::Arc;

use recluster_core::PROGRESS_SCALE;
use recluster_storage::{runs, RunStorage, SnapshotMode, StorageError};
use time::OffsetDateTime;

use crate::error::ProgressError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenState {
    Active {
        last_reported: i64,
        reported_once: bool,
    },
    Invalid,
}

/// Reports one shard's progress on one reclustering run.
///
/// Owned by a single shard and used sequentially; never share or reuse it
/// across restarts.
pub struct ProgressToken<S: RunStorage> {
    storage: Arc<S>,
    project: String,
    attempt_timestamp: OffsetDateTime,
    state: TokenState,
}

impl<S: RunStorage> ProgressToken<S> {
    pub fn new(storage: Arc<S>, project: impl Into<String>, attempt_timestamp: OffsetDateTime) -> Self {
        ProgressToken {
            storage,
            project: project.into(),
            attempt_timestamp,
            state: TokenState::Active {
                last_reported: 0,
                reported_once: false,
            },
        }
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn attempt_timestamp(&self) -> OffsetDateTime {
        self.attempt_timestamp
    }

    pub fn is_valid(&self) -> bool {
        self.state != TokenState::Invalid
    }

    /// The last value successfully committed through this token, if any.
    pub fn last_reported(&self) -> Option<i64> {
        match self.state {
            TokenState::Active {
                last_reported,
                reported_once: true,
            } => Some(last_reported),
            _ => None,
        }
    }

    /// Report the shard's absolute progress, in per-mille.
    ///
    /// Repeating the last committed value is a no-op. The first report
    /// always writes, even at 0, so the shard is counted as reported.
    pub async fn report_progress(&mut self, value: i64) -> Result<(), ProgressError> {
        if !(0..=PROGRESS_SCALE).contains(&value) {
            return Err(ProgressError::Validation(format!(
                "progress value must be between 0 and {PROGRESS_SCALE}, got {value}"
            )));
        }
        let (last_reported, reported_once) = match self.state {
            TokenState::Invalid => return Err(ProgressError::TokenInvalid),
            TokenState::Active {
                last_reported,
                reported_once,
            } => (last_reported, reported_once),
        };
        if reported_once && value == last_reported {
            return Ok(());
        }

        let delta = value - last_reported;
        match self.write_delta(!reported_once, delta).await {
            Ok(()) => {
                self.state = TokenState::Active {
                    last_reported: value,
                    reported_once: true,
                };
                tracing::debug!(
                    project = %self.project,
                    attempt_timestamp = %self.attempt_timestamp,
                    value,
                    delta,
                    "reported shard progress"
                );
                Ok(())
            }
            Err(e) => {
                self.state = TokenState::Invalid;
                tracing::warn!(
                    project = %self.project,
                    attempt_timestamp = %self.attempt_timestamp,
                    value,
                    error = %e,
                    "progress report failed; token invalidated"
                );
                Err(e.into())
            }
        }
    }

    async fn write_delta(&self, first_report: bool, delta: i64) -> Result<(), StorageError> {
        let storage = self.storage.as_ref();
        let mut snapshot = storage.begin_snapshot(SnapshotMode::ReadWrite).await?;
        let written = runs::report_progress(
            storage,
            &mut snapshot,
            &self.project,
            self.attempt_timestamp,
            first_report,
            delta,
        )
        .await;
        if let Err(e) = written {
            let _ = storage.abort_snapshot(snapshot).await;
            return Err(e);
        }
        storage.commit_snapshot(snapshot).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recluster_storage::{CommitFault, InMemoryStorage, ReclusteringRun, RunBuilder};
    use time::macros::datetime;

    const ATTEMPT: OffsetDateTime = datetime!(2020-01-01 1:00 UTC);

    fn storage_with_run(shard_count: i64) -> Arc<InMemoryStorage> {
        let run = RunBuilder::new(0)
            .with_attempt_timestamp(ATTEMPT)
            .with_shard_count(shard_count)
            .with_no_reported_progress()
            .build();
        Arc::new(InMemoryStorage::from_runs([run]).unwrap())
    }

    fn stored(storage: &InMemoryStorage) -> ReclusteringRun {
        storage.runs().unwrap().remove(0)
    }

    #[tokio::test]
    async fn rejects_out_of_range_values() {
        let storage = storage_with_run(1);
        let mut token = ProgressToken::new(storage.clone(), "testproject", ATTEMPT);
        assert!(matches!(
            token.report_progress(1001).await,
            Err(ProgressError::Validation(_))
        ));
        assert!(matches!(
            token.report_progress(-1).await,
            Err(ProgressError::Validation(_))
        ));
        assert!(token.is_valid());
        assert_eq!(stored(&storage).shards_reported, 0);
    }

    #[tokio::test]
    async fn first_report_of_zero_counts_the_shard() {
        let storage = storage_with_run(2);
        let mut token = ProgressToken::new(storage.clone(), "testproject", ATTEMPT);
        assert_eq!(token.last_reported(), None);
        token.report_progress(0).await.unwrap();
        assert_eq!(token.last_reported(), Some(0));
        let run = stored(&storage);
        assert_eq!((run.shards_reported, run.progress), (1, 0));
    }

    #[tokio::test]
    async fn repeated_value_is_not_reapplied() {
        let storage = storage_with_run(1);
        let mut token = ProgressToken::new(storage.clone(), "testproject", ATTEMPT);
        token.report_progress(300).await.unwrap();
        // Would fail if it reached storage.
        storage.inject_commit_fault(CommitFault::Lost).unwrap();
        token.report_progress(300).await.unwrap();
        assert!(token.is_valid());
        let run = stored(&storage);
        assert_eq!((run.shards_reported, run.progress), (1, 300));
    }

    #[tokio::test]
    async fn failed_commit_invalidates_token() {
        let storage = storage_with_run(1);
        let mut token = ProgressToken::new(storage.clone(), "testproject", ATTEMPT);
        token.report_progress(100).await.unwrap();

        storage
            .inject_commit_fault(CommitFault::AppliedThenFailed)
            .unwrap();
        assert!(matches!(
            token.report_progress(400).await,
            Err(ProgressError::Storage(_))
        ));
        assert!(!token.is_valid());
        assert_eq!(token.last_reported(), None);

        // Refused without touching storage, even for a repeated value.
        assert!(matches!(
            token.report_progress(400).await,
            Err(ProgressError::TokenInvalid)
        ));
        assert!(matches!(
            token.report_progress(1000).await,
            Err(ProgressError::TokenInvalid)
        ));
        let run = stored(&storage);
        assert_eq!((run.shards_reported, run.progress), (1, 400));
    }

    #[tokio::test]
    async fn missing_run_invalidates_token() {
        let storage = Arc::new(InMemoryStorage::new());
        let mut token = ProgressToken::new(storage, "testproject", ATTEMPT);
        let err = token.report_progress(10).await.unwrap_err();
        assert!(matches!(err, ProgressError::Storage(ref e) if e.is_not_found()));
        assert!(!token.is_valid());
    }
}
