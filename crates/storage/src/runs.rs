//! Run Store operations.
//!
//! These sit on top of any [`RunStorage`] backend and run inside a caller
//! supplied snapshot, so several of them can share one transaction.
//!
//! The `read_last*` lookups never report "not found". A project without
//! runs is a normal steady state, so they substitute
//! [`ReclusteringRun::placeholder`]: a complete run targeting the oldest
//! possible versions. Callers can then divide and compare without special
//! cases.

use recluster_core::{is_valid_project, PROGRESS_SCALE, STARTING_EPOCH, UNSET_TIMESTAMP};
use time::OffsetDateTime;

use crate::error::StorageError;
use crate::record::ReclusteringRun;
use crate::traits::{RunFilter, RunStorage};

/// Check a run before it is created.
pub fn validate(run: &ReclusteringRun) -> Result<(), StorageError> {
    if !is_valid_project(&run.project) {
        return invalid("project must be valid");
    }
    if run.attempt_timestamp == UNSET_TIMESTAMP {
        return invalid("attempt timestamp must be set");
    }
    if run.algorithms_version <= 0 {
        return invalid("algorithms version must be valid");
    }
    if run.rules_version < STARTING_EPOCH {
        return invalid("rules version must be valid");
    }
    if run.config_version < STARTING_EPOCH {
        return invalid("config version must be valid");
    }
    if run.shard_count <= 0 {
        return invalid("shard count must be valid");
    }
    if run.shards_reported < 0 || run.shards_reported > run.shard_count {
        return invalid("shards reported must be valid");
    }
    let Some(max_progress) = run.shard_count.checked_mul(PROGRESS_SCALE) else {
        return invalid("shard count must be valid");
    };
    if run.progress < 0 || run.progress > max_progress {
        return invalid("progress must be valid");
    }
    Ok(())
}

fn invalid(msg: &str) -> Result<(), StorageError> {
    Err(StorageError::Validation(msg.to_string()))
}

/// Validate and insert a new run. Visible to later reads in the same
/// snapshot, and to other snapshots once committed.
pub async fn create<S: RunStorage>(
    storage: &S,
    snapshot: &mut S::Snapshot,
    run: &ReclusteringRun,
) -> Result<(), StorageError> {
    validate(run)?;
    storage.insert_run(snapshot, run.clone()).await?;
    tracing::info!(
        project = %run.project,
        attempt_timestamp = %run.attempt_timestamp,
        shard_count = run.shard_count,
        algorithms_version = run.algorithms_version,
        "created reclustering run"
    );
    Ok(())
}

/// Exact lookup. Fails with [`StorageError::RunNotFound`] if absent.
pub async fn read<S: RunStorage>(
    storage: &S,
    snapshot: &mut S::Snapshot,
    project: &str,
    attempt_timestamp: OffsetDateTime,
) -> Result<ReclusteringRun, StorageError> {
    storage.get_run(snapshot, project, attempt_timestamp).await
}

/// The project's newest run, or the placeholder.
pub async fn read_last<S: RunStorage>(
    storage: &S,
    snapshot: &mut S::Snapshot,
    project: &str,
) -> Result<ReclusteringRun, StorageError> {
    read_last_matching(storage, snapshot, project, RunFilter::Any).await
}

/// The project's newest run on which every shard has reported, or the
/// placeholder.
pub async fn read_last_with_progress<S: RunStorage>(
    storage: &S,
    snapshot: &mut S::Snapshot,
    project: &str,
) -> Result<ReclusteringRun, StorageError> {
    read_last_matching(storage, snapshot, project, RunFilter::WithProgress).await
}

/// The project's newest complete run, or the placeholder.
pub async fn read_last_complete<S: RunStorage>(
    storage: &S,
    snapshot: &mut S::Snapshot,
    project: &str,
) -> Result<ReclusteringRun, StorageError> {
    read_last_matching(storage, snapshot, project, RunFilter::Complete).await
}

async fn read_last_matching<S: RunStorage>(
    storage: &S,
    snapshot: &mut S::Snapshot,
    project: &str,
    filter: RunFilter,
) -> Result<ReclusteringRun, StorageError> {
    let run = storage.last_run(snapshot, project, filter).await?;
    Ok(run.unwrap_or_else(|| ReclusteringRun::placeholder(project)))
}

/// All runs of a project, newest first.
pub async fn list<S: RunStorage>(
    storage: &S,
    snapshot: &mut S::Snapshot,
    project: &str,
) -> Result<Vec<ReclusteringRun>, StorageError> {
    storage.list_runs(snapshot, project).await
}

/// Add a shard's progress delta to a run, counting the shard as reported if
/// this is its first report.
pub async fn report_progress<S: RunStorage>(
    storage: &S,
    snapshot: &mut S::Snapshot,
    project: &str,
    attempt_timestamp: OffsetDateTime,
    first_report_for_shard: bool,
    delta_progress: i64,
) -> Result<(), StorageError> {
    let shards_reported_delta = i64::from(first_report_for_shard);
    storage
        .increment_progress(
            snapshot,
            project,
            attempt_timestamp,
            shards_reported_delta,
            delta_progress,
        )
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RunBuilder;

    fn message(run: &ReclusteringRun) -> String {
        validate(run).unwrap_err().to_string()
    }

    #[test]
    fn valid_run_passes() {
        assert!(validate(&RunBuilder::new(100).build()).is_ok());
        assert!(validate(&ReclusteringRun::placeholder("emptyproject")).is_ok());
    }

    #[test]
    fn project_must_be_valid() {
        let mut run = RunBuilder::new(100).build();
        run.project = String::new();
        assert_eq!(message(&run), "project must be valid");
        run.project = "!".to_string();
        assert_eq!(message(&run), "project must be valid");
    }

    #[test]
    fn attempt_timestamp_must_be_set() {
        let mut run = RunBuilder::new(100).build();
        run.attempt_timestamp = UNSET_TIMESTAMP;
        assert_eq!(message(&run), "attempt timestamp must be set");
    }

    #[test]
    fn versions_must_be_valid() {
        let mut run = RunBuilder::new(100).build();
        run.algorithms_version = 0;
        assert_eq!(message(&run), "algorithms version must be valid");

        let mut run = RunBuilder::new(100).build();
        run.rules_version = UNSET_TIMESTAMP;
        assert_eq!(message(&run), "rules version must be valid");

        let mut run = RunBuilder::new(100).build();
        run.config_version = UNSET_TIMESTAMP;
        assert_eq!(message(&run), "config version must be valid");
    }

    #[test]
    fn shard_accounting_must_be_valid() {
        let mut run = RunBuilder::new(100).build();
        run.shard_count = 0;
        assert_eq!(message(&run), "shard count must be valid");

        let mut run = RunBuilder::new(100).build();
        run.shards_reported = run.shard_count + 1;
        assert_eq!(message(&run), "shards reported must be valid");

        let mut run = RunBuilder::new(100).build();
        run.progress = run.shard_count * 1000 + 1;
        assert_eq!(message(&run), "progress must be valid");

        let mut run = RunBuilder::new(100).build();
        run.progress = -1;
        assert_eq!(message(&run), "progress must be valid");
    }
}
