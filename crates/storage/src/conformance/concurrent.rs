use std::future::Future;
use std::sync::Arc;

use super::{expect_eq, read_committed, seed, TestResult};
use crate::record::RunBuilder;
use crate::{runs, RunStorage, SnapshotMode, StorageError};

/// Number of concurrent tasks to spawn in each test.
const N: usize = 10;

pub(super) async fn run_concurrent_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: RunStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "concurrent",
            "concurrent_increments_compose",
            concurrent_increments_compose(factory).await,
        ),
        TestResult::from_result(
            "concurrent",
            "concurrent_create_exactly_one_wins",
            concurrent_create_exactly_one_wins(factory).await,
        ),
    ]
}

// ── Concurrent increments: all applied ──────────────────────────────────────

/// N tasks, one per shard, each open a snapshot and report their first
/// progress on the same run. Every increment must land: shards_reported == N
/// and progress is the sum of the deltas.
async fn concurrent_increments_compose<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RunStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);
    let run = RunBuilder::new(0)
        .with_shard_count(N as i64)
        .with_no_reported_progress()
        .build();
    seed(storage.as_ref(), std::slice::from_ref(&run)).await?;

    let mut handles = Vec::new();
    for i in 0..N {
        let s = storage.clone();
        let project = run.project.clone();
        let attempt = run.attempt_timestamp;
        handles.push(tokio::spawn(async move {
            let mut snap = s.begin_snapshot(SnapshotMode::ReadWrite).await?;
            let delta = 10 * (i as i64 + 1);
            match runs::report_progress(s.as_ref(), &mut snap, &project, attempt, true, delta)
                .await
            {
                Ok(()) => s.commit_snapshot(snap).await,
                Err(e) => {
                    let _ = s.abort_snapshot(snap).await;
                    Err(e)
                }
            }
        }));
    }

    for handle in handles {
        handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e: StorageError| format!("storage error: {e}"))?;
    }

    let got = read_committed(storage.as_ref(), &run.project, run.attempt_timestamp).await?;
    let expected_progress: i64 = (1..=N as i64).map(|i| 10 * i).sum();
    expect_eq("shards_reported", got.shards_reported, N as i64)?;
    expect_eq("progress", got.progress, expected_progress)
}

// ── Concurrent create: exactly one wins ─────────────────────────────────────

/// N tasks each attempt to create the same run. Exactly one succeeds; the
/// rest must get AlreadyExists.
async fn concurrent_create_exactly_one_wins<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RunStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);
    let run = RunBuilder::new(1).build();

    let mut handles = Vec::new();
    for _ in 0..N {
        let s = storage.clone();
        let run = run.clone();
        handles.push(tokio::spawn(async move {
            let mut snap = s.begin_snapshot(SnapshotMode::ReadWrite).await?;
            let result = match runs::create(s.as_ref(), &mut snap, &run).await {
                Ok(()) => s.commit_snapshot(snap).await,
                Err(e) => {
                    let _ = s.abort_snapshot(snap).await;
                    Err(e)
                }
            };
            match result {
                Ok(()) => Ok(true),
                Err(StorageError::AlreadyExists { .. }) => Ok(false),
                Err(e) => Err(e),
            }
        }));
    }

    let mut winners = 0usize;
    for handle in handles {
        let won = handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e: StorageError| format!("storage error: {e}"))?;
        if won {
            winners += 1;
        }
    }

    expect_eq("winners", winners, 1)
}
