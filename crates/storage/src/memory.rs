//! In-process `RunStorage` backend.
//!
//! Committed runs live behind a mutex. A snapshot copies the committed table
//! when it begins and buffers its writes; commit replays the buffered writes
//! against the table as it stands at commit time, all or nothing. Inserts
//! re-check key uniqueness and increments are applied relative to the
//! current row, so concurrent snapshots that only increment compose.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::error::StorageError;
use crate::record::ReclusteringRun;
use crate::traits::{RunFilter, RunStorage, SnapshotMode};

/// Runs by project, then by attempt timestamp.
type RunTable = BTreeMap<String, BTreeMap<OffsetDateTime, ReclusteringRun>>;

/// A failure to inject into the next read-write commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitFault {
    /// The commit fails and none of its writes are applied.
    Lost,
    /// The writes are applied, but the caller still sees an error.
    AppliedThenFailed,
}

#[derive(Debug, Clone)]
enum Write {
    Insert(ReclusteringRun),
    Increment {
        project: String,
        attempt_timestamp: OffsetDateTime,
        shards_reported: i64,
        progress: i64,
    },
}

#[derive(Default)]
struct Inner {
    runs: RunTable,
    faults: VecDeque<CommitFault>,
    /// Number of reads that still succeed before one fails.
    read_fault: Option<usize>,
}

/// Shared, cloneable in-memory store of reclustering runs.
#[derive(Clone, Default)]
pub struct InMemoryStorage {
    inner: Arc<Mutex<Inner>>,
}

/// Snapshot type for [`InMemoryStorage`].
pub struct MemorySnapshot {
    mode: SnapshotMode,
    /// Committed state at begin, plus this snapshot's own writes.
    view: RunTable,
    writes: Vec<Write>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a store with existing runs. Runs are stored as given, without
    /// validation; duplicate keys are rejected.
    pub fn from_runs(
        runs: impl IntoIterator<Item = ReclusteringRun>,
    ) -> Result<Self, StorageError> {
        let mut table = RunTable::new();
        for run in runs {
            apply(&mut table, Write::Insert(run))?;
        }
        Ok(InMemoryStorage {
            inner: Arc::new(Mutex::new(Inner {
                runs: table,
                ..Inner::default()
            })),
        })
    }

    /// Every committed run, ordered by project then attempt timestamp.
    pub fn runs(&self) -> Result<Vec<ReclusteringRun>, StorageError> {
        let inner = self.lock()?;
        Ok(inner
            .runs
            .values()
            .flat_map(|by_time| by_time.values().cloned())
            .collect())
    }

    /// Make the next read-write commit that carries writes fail. Faults
    /// queue up and are consumed one per commit.
    pub fn inject_commit_fault(&self, fault: CommitFault) -> Result<(), StorageError> {
        self.lock()?.faults.push_back(fault);
        Ok(())
    }

    /// Make a snapshot read fail once `after` further reads have succeeded.
    /// Reads are `get_run`, `last_run` and `list_runs`, counted across all
    /// snapshots.
    pub fn inject_read_fault(&self, after: usize) -> Result<(), StorageError> {
        self.lock()?.read_fault = Some(after);
        Ok(())
    }

    fn check_read(&self) -> Result<(), StorageError> {
        let mut inner = self.lock()?;
        match inner.read_fault {
            Some(0) => {
                inner.read_fault = None;
                Err(StorageError::Backend("injected read fault".to_string()))
            }
            Some(n) => {
                inner.read_fault = Some(n - 1);
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StorageError> {
        self.inner
            .lock()
            .map_err(|_| StorageError::Backend("in-memory storage lock poisoned".to_string()))
    }
}

/// Apply one write to a table.
fn apply(table: &mut RunTable, write: Write) -> Result<(), StorageError> {
    match write {
        Write::Insert(run) => {
            let by_time = table.entry(run.project.clone()).or_default();
            if by_time.contains_key(&run.attempt_timestamp) {
                return Err(StorageError::AlreadyExists {
                    project: run.project,
                    attempt_timestamp: run.attempt_timestamp,
                });
            }
            by_time.insert(run.attempt_timestamp, run);
        }
        Write::Increment {
            project,
            attempt_timestamp,
            shards_reported,
            progress,
        } => {
            let run = table
                .get_mut(&project)
                .and_then(|by_time| by_time.get_mut(&attempt_timestamp))
                .ok_or_else(|| StorageError::not_found(&project, attempt_timestamp))?;
            run.shards_reported += shards_reported;
            run.progress += progress;
        }
    }
    Ok(())
}

impl MemorySnapshot {
    /// Record a write, applying it to this snapshot's view first so that
    /// errors surface at the call site and later reads observe it.
    fn write(&mut self, write: Write) -> Result<(), StorageError> {
        if self.mode == SnapshotMode::ReadOnly {
            return Err(StorageError::ReadOnlySnapshot);
        }
        apply(&mut self.view, write.clone())?;
        self.writes.push(write);
        Ok(())
    }
}

#[async_trait]
impl RunStorage for InMemoryStorage {
    type Snapshot = MemorySnapshot;

    async fn begin_snapshot(&self, mode: SnapshotMode) -> Result<MemorySnapshot, StorageError> {
        let view = self.lock()?.runs.clone();
        Ok(MemorySnapshot {
            mode,
            view,
            writes: Vec::new(),
        })
    }

    async fn commit_snapshot(&self, snapshot: MemorySnapshot) -> Result<(), StorageError> {
        if snapshot.writes.is_empty() {
            return Ok(());
        }
        let mut inner = self.lock()?;
        let mut staged = inner.runs.clone();
        let count = snapshot.writes.len();
        for write in snapshot.writes {
            apply(&mut staged, write)?;
        }

        // A fault is only consumed by a commit that would otherwise succeed.
        let fault = inner.faults.pop_front();
        if fault == Some(CommitFault::Lost) {
            return Err(StorageError::Backend(
                "injected commit fault: writes lost".to_string(),
            ));
        }
        inner.runs = staged;
        tracing::debug!(writes = count, "committed in-memory snapshot");

        if fault == Some(CommitFault::AppliedThenFailed) {
            return Err(StorageError::Backend(
                "injected commit fault: outcome unknown".to_string(),
            ));
        }
        Ok(())
    }

    async fn abort_snapshot(&self, _snapshot: MemorySnapshot) -> Result<(), StorageError> {
        Ok(())
    }

    async fn insert_run(
        &self,
        snapshot: &mut MemorySnapshot,
        run: ReclusteringRun,
    ) -> Result<(), StorageError> {
        snapshot.write(Write::Insert(run))
    }

    async fn increment_progress(
        &self,
        snapshot: &mut MemorySnapshot,
        project: &str,
        attempt_timestamp: OffsetDateTime,
        shards_reported_delta: i64,
        progress_delta: i64,
    ) -> Result<(), StorageError> {
        snapshot.write(Write::Increment {
            project: project.to_string(),
            attempt_timestamp,
            shards_reported: shards_reported_delta,
            progress: progress_delta,
        })
    }

    async fn get_run(
        &self,
        snapshot: &mut MemorySnapshot,
        project: &str,
        attempt_timestamp: OffsetDateTime,
    ) -> Result<ReclusteringRun, StorageError> {
        self.check_read()?;
        snapshot
            .view
            .get(project)
            .and_then(|by_time| by_time.get(&attempt_timestamp))
            .cloned()
            .ok_or_else(|| StorageError::not_found(project, attempt_timestamp))
    }

    async fn last_run(
        &self,
        snapshot: &mut MemorySnapshot,
        project: &str,
        filter: RunFilter,
    ) -> Result<Option<ReclusteringRun>, StorageError> {
        self.check_read()?;
        Ok(snapshot.view.get(project).and_then(|by_time| {
            by_time
                .values()
                .rev()
                .find(|run| filter.matches(run))
                .cloned()
        }))
    }

    async fn list_runs(
        &self,
        snapshot: &mut MemorySnapshot,
        project: &str,
    ) -> Result<Vec<ReclusteringRun>, StorageError> {
        self.check_read()?;
        Ok(snapshot
            .view
            .get(project)
            .map(|by_time| by_time.values().rev().cloned().collect())
            .unwrap_or_default())
    }
}
