//! Creating reclustering runs and dividing work between shards.
//!
//! Every interval a new run is created per project. Its targets only move
//! forward once the previous run has completed; otherwise the same targets
//! are carried over. If targets were bumped on every run while rules kept
//! changing, workers would keep restarting at the front of the keyspace and
//! later chunks would never be reached.

use std::collections::BTreeMap;

use recluster_core::{truncate, RunTargets, PROGRESS_SCALE};
use recluster_storage::{runs, ReclusteringRun, RunStorage, SnapshotMode};
use serde::Serialize;
use time::{Duration, OffsetDateTime};

use crate::error::ProgressError;
use crate::keyspace::chunk_id;

/// The time span of one reclustering attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptWindow {
    pub start: OffsetDateTime,
    /// Also the attempt timestamp of the run created for this window.
    pub end: OffsetDateTime,
}

/// The attempt window starting at `now`, or `None` if `now` is not on an
/// interval boundary (or the interval is not positive).
pub fn attempt_window(now: OffsetDateTime, interval_minutes: i64) -> Option<AttemptWindow> {
    if interval_minutes <= 0 {
        return None;
    }
    let interval = Duration::minutes(interval_minutes);
    let start = truncate(now, interval);
    if start != truncate(now, Duration::minutes(1)) {
        return None;
    }
    Some(AttemptWindow {
        start,
        end: start + interval,
    })
}

/// Divide `workers` between projects.
///
/// Each project gets one worker; the rest are handed out in project-name
/// order in proportion to each project's share of the remaining chunks.
pub fn project_worker_counts(
    chunk_estimates: &BTreeMap<String, i64>,
    workers: i64,
) -> Result<BTreeMap<String, i64>, ProgressError> {
    let projects = chunk_estimates.len();
    let mut free_workers = workers - projects as i64;
    if free_workers < 0 {
        return Err(ProgressError::TooFewWorkers { projects, workers });
    }
    let mut remaining_chunks: i64 = chunk_estimates.values().map(|c| (*c).max(0)).sum();

    let mut result = BTreeMap::new();
    for (project, chunks) in chunk_estimates {
        let chunks = (*chunks).max(0);
        let additional = if remaining_chunks > 0 {
            // i128: chunk estimates times worker counts can exceed i64.
            (i128::from(chunks) * i128::from(free_workers) / i128::from(remaining_chunks)) as i64
        } else {
            0
        };
        remaining_chunks -= chunks;
        free_workers -= additional;
        result.insert(project.clone(), 1 + additional);
    }
    Ok(result)
}

/// Split the 128-bit chunk id keyspace into `count` equal partitions.
///
/// Returns `count + 1` boundaries. Partition `i` covers chunk ids after
/// `result[i]` up to and including `result[i + 1]`; `""` is the start of
/// the table.
pub fn worker_splits(count: usize) -> Vec<String> {
    let mut result = Vec::with_capacity(count + 1);
    result.push(String::new());
    let n = count as u128;
    for i in 1..=n {
        result.push(chunk_id(split_point(i, n)));
    }
    result
}

/// `floor(2^128 * i / n) - 1`, for `1 <= i <= n`.
fn split_point(i: u128, n: u128) -> u128 {
    if i == n {
        return u128::MAX;
    }
    // 2^128 = q * n + r
    let mut q = u128::MAX / n;
    let mut r = u128::MAX % n + 1;
    if r == n {
        q += 1;
        r = 0;
    }
    i * q + (i * r) / n - 1
}

/// One shard's slice of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShardAssignment {
    pub project: String,
    #[serde(with = "time::serde::rfc3339")]
    pub attempt_timestamp: OffsetDateTime,
    /// 1-based shard number.
    pub shard: usize,
    /// Exclusive lower bound; `""` is the start of the table.
    pub start_chunk_id: String,
    /// Inclusive upper bound.
    pub end_chunk_id: String,
}

impl ShardAssignment {
    /// Task title, unique per project, attempt and shard.
    pub fn title(&self) -> String {
        format!(
            "{}-{:04}{:02}{:02}-{:02}{:02}{:02}-shard-{}",
            self.project,
            self.attempt_timestamp.year(),
            self.attempt_timestamp.month() as u8,
            self.attempt_timestamp.day(),
            self.attempt_timestamp.hour(),
            self.attempt_timestamp.minute(),
            self.attempt_timestamp.second(),
            self.shard
        )
    }
}

/// The assignments for every shard of `run`.
pub fn shard_assignments(run: &ReclusteringRun) -> Vec<ShardAssignment> {
    let count = usize::try_from(run.shard_count).unwrap_or(0);
    let splits = worker_splits(count);
    splits
        .windows(2)
        .enumerate()
        .map(|(i, bounds)| ShardAssignment {
            project: run.project.clone(),
            attempt_timestamp: run.attempt_timestamp,
            shard: i + 1,
            start_chunk_id: bounds[0].clone(),
            end_chunk_id: bounds[1].clone(),
        })
        .collect()
}

/// A run ready to be created, and how far its predecessor got.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPlan {
    pub run: ReclusteringRun,
    /// Per-mille progress of the previous run.
    pub previous_progress: i64,
}

/// Plan the run that follows `last_run` for `window`.
///
/// `latest` are the newest targets available; they are adopted only if the
/// previous run completed.
pub fn plan_run(
    last_run: &ReclusteringRun,
    window: AttemptWindow,
    workers: i64,
    latest: RunTargets,
) -> Result<RunPlan, ProgressError> {
    let previous_progress = last_run.progress_per_mille();
    if last_run.attempt_timestamp > window.start {
        return Err(ProgressError::OverlappingAttempt {
            existing: last_run.attempt_timestamp,
            proposed: window.start,
        });
    }
    let targets = if previous_progress == PROGRESS_SCALE {
        latest
    } else {
        last_run.targets()
    };
    let run = ReclusteringRun {
        project: last_run.project.clone(),
        attempt_timestamp: window.end,
        algorithms_version: targets.algorithms_version,
        rules_version: targets.rules_version,
        config_version: targets.config_version,
        shard_count: workers,
        shards_reported: 0,
        progress: 0,
    };
    Ok(RunPlan {
        run,
        previous_progress,
    })
}

/// Result of orchestrating one project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Orchestration {
    pub run: ReclusteringRun,
    pub previous_progress: i64,
    pub assignments: Vec<ShardAssignment>,
}

/// Create the next run for `project` and assign its shards.
///
/// Reading the last run and creating the new one share a read-write
/// snapshot, so two orchestrators racing for the same window cannot both
/// succeed.
pub async fn orchestrate_project<S: RunStorage>(
    storage: &S,
    project: &str,
    window: AttemptWindow,
    workers: i64,
    latest: RunTargets,
) -> Result<Orchestration, ProgressError> {
    let mut snapshot = storage.begin_snapshot(SnapshotMode::ReadWrite).await?;
    let planned = plan_in_snapshot(storage, &mut snapshot, project, window, workers, latest).await;
    let plan = match planned {
        Ok(plan) => plan,
        Err(e) => {
            let _ = storage.abort_snapshot(snapshot).await;
            return Err(e);
        }
    };
    storage.commit_snapshot(snapshot).await?;

    tracing::info!(
        project,
        attempt_timestamp = %plan.run.attempt_timestamp,
        workers,
        previous_progress = plan.previous_progress,
        "orchestrated reclustering run"
    );
    let assignments = shard_assignments(&plan.run);
    Ok(Orchestration {
        run: plan.run,
        previous_progress: plan.previous_progress,
        assignments,
    })
}

async fn plan_in_snapshot<S: RunStorage>(
    storage: &S,
    snapshot: &mut S::Snapshot,
    project: &str,
    window: AttemptWindow,
    workers: i64,
    latest: RunTargets,
) -> Result<RunPlan, ProgressError> {
    let last_run = runs::read_last(storage, snapshot, project).await?;
    let plan = plan_run(&last_run, window, workers, latest)?;
    runs::create(storage, snapshot, &plan.run).await?;
    Ok(plan)
}
