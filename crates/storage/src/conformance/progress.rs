use std::future::Future;

use time::macros::datetime;
use time::OffsetDateTime;

use super::{expect_eq, read_committed, seed, TestResult};
use crate::record::RunBuilder;
use crate::{runs, RunStorage, SnapshotMode, StorageError};

const ATTEMPT: OffsetDateTime = datetime!(2020-01-01 1:00 UTC);

pub(super) async fn run_progress_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: RunStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "progress",
            "first_report_counts_shard",
            first_report_counts_shard(factory).await,
        ),
        TestResult::from_result(
            "progress",
            "later_reports_add_progress_only",
            later_reports_add_progress_only(factory).await,
        ),
        TestResult::from_result(
            "progress",
            "increments_in_one_snapshot_accumulate",
            increments_in_one_snapshot_accumulate(factory).await,
        ),
        TestResult::from_result(
            "progress",
            "report_on_missing_run_returns_not_found",
            report_on_missing_run_returns_not_found(factory).await,
        ),
        TestResult::from_result(
            "progress",
            "report_leaves_other_fields_unchanged",
            report_leaves_other_fields_unchanged(factory).await,
        ),
    ]
}

async fn report<S: RunStorage>(
    storage: &S,
    first: bool,
    delta: i64,
) -> Result<(), StorageError> {
    let mut snap = storage.begin_snapshot(SnapshotMode::ReadWrite).await?;
    match runs::report_progress(storage, &mut snap, "testproject", ATTEMPT, first, delta).await {
        Ok(()) => storage.commit_snapshot(snap).await,
        Err(e) => {
            let _ = storage.abort_snapshot(snap).await;
            Err(e)
        }
    }
}

async fn seed_empty_run<S: RunStorage>(storage: &S, shard_count: i64) -> Result<(), String> {
    let run = RunBuilder::new(0)
        .with_attempt_timestamp(ATTEMPT)
        .with_shard_count(shard_count)
        .with_no_reported_progress()
        .build();
    seed(storage, &[run]).await
}

async fn first_report_counts_shard<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RunStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_empty_run(&s, 2).await?;

    report(&s, true, 0).await.map_err(|e| e.to_string())?;
    let run = read_committed(&s, "testproject", ATTEMPT).await?;
    expect_eq("shards_reported", run.shards_reported, 1)?;
    expect_eq("progress", run.progress, 0)
}

async fn later_reports_add_progress_only<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RunStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_empty_run(&s, 2).await?;

    report(&s, true, 150).await.map_err(|e| e.to_string())?;
    report(&s, false, 50).await.map_err(|e| e.to_string())?;
    report(&s, false, 800).await.map_err(|e| e.to_string())?;
    let run = read_committed(&s, "testproject", ATTEMPT).await?;
    expect_eq("shards_reported", run.shards_reported, 1)?;
    expect_eq("progress", run.progress, 1000)
}

async fn increments_in_one_snapshot_accumulate<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RunStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_empty_run(&s, 3).await?;

    let mut snap = s
        .begin_snapshot(SnapshotMode::ReadWrite)
        .await
        .map_err(|e| e.to_string())?;
    for delta in [100, 200, 300] {
        runs::report_progress(&s, &mut snap, "testproject", ATTEMPT, true, delta)
            .await
            .map_err(|e| e.to_string())?;
    }
    let in_snapshot = runs::read(&s, &mut snap, "testproject", ATTEMPT)
        .await
        .map_err(|e| e.to_string())?;
    expect_eq("in-snapshot progress", in_snapshot.progress, 600)?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    let run = read_committed(&s, "testproject", ATTEMPT).await?;
    expect_eq("shards_reported", run.shards_reported, 3)?;
    expect_eq("progress", run.progress, 600)
}

async fn report_on_missing_run_returns_not_found<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RunStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    match report(&s, true, 10).await {
        Err(e) if e.is_not_found() => Ok(()),
        Err(e) => Err(format!("expected RunNotFound, got {e}")),
        Ok(()) => Err("report on missing run succeeded".to_string()),
    }
}

async fn report_leaves_other_fields_unchanged<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RunStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_empty_run(&s, 2).await?;
    let before = read_committed(&s, "testproject", ATTEMPT).await?;

    report(&s, true, 400).await.map_err(|e| e.to_string())?;
    let mut after = read_committed(&s, "testproject", ATTEMPT).await?;
    after.shards_reported = before.shards_reported;
    after.progress = before.progress;
    expect_eq("immutable fields", after, before)
}
