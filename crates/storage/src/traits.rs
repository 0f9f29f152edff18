use async_trait::async_trait;
use time::OffsetDateTime;

use crate::error::StorageError;
use crate::record::ReclusteringRun;

/// Whether a snapshot may write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotMode {
    ReadWrite,
    /// Observes one consistent committed state for its whole lifetime.
    ReadOnly,
}

/// Row predicate for [`RunStorage::last_run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunFilter {
    /// Every run.
    Any,
    /// Runs where every shard has reported at least once.
    WithProgress,
    /// Runs where every shard has reported completion.
    Complete,
}

impl RunFilter {
    pub fn matches(self, run: &ReclusteringRun) -> bool {
        match self {
            RunFilter::Any => true,
            RunFilter::WithProgress => run.has_progress(),
            RunFilter::Complete => run.is_complete(),
        }
    }
}

/// The storage trait for reclustering run backends.
///
/// ## Snapshot Semantics
///
/// Every operation takes `&mut Self::Snapshot`, an in-progress transaction:
///
/// 1. `begin_snapshot(mode)` starts a transaction
/// 2. reads and writes go through `&mut snapshot`
/// 3. `commit_snapshot(snapshot)` commits, or `abort_snapshot(snapshot)`
///    rolls back. Both consume the snapshot.
///
/// A snapshot dropped without committing MUST be rolled back. Reads in a
/// read-write snapshot observe that snapshot's own writes.
///
/// ## Additive progress
///
/// `increment_progress` is a relative update (`progress = progress + delta`)
/// applied against the row as it stands at commit time. Concurrent
/// snapshots incrementing the same run therefore compose without a
/// compare-and-swap loop.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync + 'static` to be shared through
/// axum application state and across spawned tasks.
#[async_trait]
pub trait RunStorage: Send + Sync + 'static {
    /// The snapshot (transaction) type used by this backend.
    type Snapshot: Send;

    // ── Snapshot lifecycle ────────────────────────────────────────────────────

    async fn begin_snapshot(&self, mode: SnapshotMode) -> Result<Self::Snapshot, StorageError>;

    /// Commit a snapshot, making its writes durable.
    ///
    /// An error here leaves the outcome unknown: the writes may or may not
    /// have been applied.
    async fn commit_snapshot(&self, snapshot: Self::Snapshot) -> Result<(), StorageError>;

    /// Abort (roll back) a snapshot. Also used to release read-only snapshots.
    async fn abort_snapshot(&self, snapshot: Self::Snapshot) -> Result<(), StorageError>;

    // ── Writes ───────────────────────────────────────────────────────────────

    /// Insert a run as given. Does not validate.
    ///
    /// Returns `Err(StorageError::AlreadyExists)` if the key is taken.
    async fn insert_run(
        &self,
        snapshot: &mut Self::Snapshot,
        run: ReclusteringRun,
    ) -> Result<(), StorageError>;

    /// Add `shards_reported_delta` and `progress_delta` to a run.
    ///
    /// Returns `Err(StorageError::RunNotFound)` if the run does not exist.
    async fn increment_progress(
        &self,
        snapshot: &mut Self::Snapshot,
        project: &str,
        attempt_timestamp: OffsetDateTime,
        shards_reported_delta: i64,
        progress_delta: i64,
    ) -> Result<(), StorageError>;

    // ── Reads ────────────────────────────────────────────────────────────────

    /// Returns `Err(StorageError::RunNotFound)` if the run does not exist.
    async fn get_run(
        &self,
        snapshot: &mut Self::Snapshot,
        project: &str,
        attempt_timestamp: OffsetDateTime,
    ) -> Result<ReclusteringRun, StorageError>;

    /// The run with the greatest attempt timestamp among the project's runs
    /// matching `filter`, if any.
    async fn last_run(
        &self,
        snapshot: &mut Self::Snapshot,
        project: &str,
        filter: RunFilter,
    ) -> Result<Option<ReclusteringRun>, StorageError>;

    /// All runs of a project, newest first.
    async fn list_runs(
        &self,
        snapshot: &mut Self::Snapshot,
        project: &str,
    ) -> Result<Vec<ReclusteringRun>, StorageError>;
}
