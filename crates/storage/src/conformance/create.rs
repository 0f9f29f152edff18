use std::future::Future;

use super::{expect_eq, read_committed, seed, TestResult};
use crate::record::RunBuilder;
use crate::{runs, RunStorage, SnapshotMode, StorageError};

pub(super) async fn run_create_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: RunStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "create",
            "create_then_read_returns_run",
            create_then_read_returns_run(factory).await,
        ),
        TestResult::from_result(
            "create",
            "create_visible_in_same_snapshot",
            create_visible_in_same_snapshot(factory).await,
        ),
        TestResult::from_result(
            "create",
            "duplicate_create_returns_already_exists",
            duplicate_create_returns_already_exists(factory).await,
        ),
        TestResult::from_result(
            "create",
            "invalid_run_is_not_inserted",
            invalid_run_is_not_inserted(factory).await,
        ),
        TestResult::from_result(
            "create",
            "read_missing_returns_not_found",
            read_missing_returns_not_found(factory).await,
        ),
        TestResult::from_result(
            "create",
            "same_timestamp_different_projects_independent",
            same_timestamp_different_projects_independent(factory).await,
        ),
    ]
}

/// A committed run reads back field-for-field.
async fn create_then_read_returns_run<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RunStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let run = RunBuilder::new(100).build();
    seed(&s, std::slice::from_ref(&run)).await?;

    let got = read_committed(&s, &run.project, run.attempt_timestamp).await?;
    expect_eq("run", got, run)
}

async fn create_visible_in_same_snapshot<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RunStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let run = RunBuilder::new(1).build();
    let mut snap = s
        .begin_snapshot(SnapshotMode::ReadWrite)
        .await
        .map_err(|e| e.to_string())?;
    runs::create(&s, &mut snap, &run)
        .await
        .map_err(|e| e.to_string())?;
    let got = runs::read(&s, &mut snap, &run.project, run.attempt_timestamp)
        .await
        .map_err(|e| format!("read in snapshot: {e}"))?;
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;
    expect_eq("run", got, run)
}

async fn duplicate_create_returns_already_exists<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RunStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let run = RunBuilder::new(2).build();
    seed(&s, std::slice::from_ref(&run)).await?;

    let mut snap = s
        .begin_snapshot(SnapshotMode::ReadWrite)
        .await
        .map_err(|e| e.to_string())?;
    let result = runs::create(&s, &mut snap, &run).await;
    let result = match result {
        // Backends may defer the uniqueness check to commit.
        Ok(()) => s.commit_snapshot(snap).await,
        Err(e) => {
            let _ = s.abort_snapshot(snap).await;
            Err(e)
        }
    };
    match result {
        Err(StorageError::AlreadyExists { .. }) => Ok(()),
        Err(e) => Err(format!("expected AlreadyExists, got {e}")),
        Ok(()) => Err("duplicate create succeeded".to_string()),
    }
}

async fn invalid_run_is_not_inserted<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RunStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let run = RunBuilder::new(3).with_shard_count(0).build();
    let mut snap = s
        .begin_snapshot(SnapshotMode::ReadWrite)
        .await
        .map_err(|e| e.to_string())?;
    match runs::create(&s, &mut snap, &run).await {
        Err(e) if e.is_validation() => {}
        Err(e) => return Err(format!("expected validation error, got {e}")),
        Ok(()) => return Err("invalid run was created".to_string()),
    }
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    match read_committed(&s, &run.project, run.attempt_timestamp).await {
        Err(_) => Ok(()),
        Ok(_) => Err("invalid run is readable".to_string()),
    }
}

async fn read_missing_returns_not_found<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RunStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let run = RunBuilder::new(4).build();
    let mut snap = s
        .begin_snapshot(SnapshotMode::ReadOnly)
        .await
        .map_err(|e| e.to_string())?;
    let result = runs::read(&s, &mut snap, &run.project, run.attempt_timestamp).await;
    let _ = s.abort_snapshot(snap).await;
    match result {
        Err(e) if e.is_not_found() => Ok(()),
        Err(e) => Err(format!("expected RunNotFound, got {e}")),
        Ok(_) => Err("read of missing run succeeded".to_string()),
    }
}

async fn same_timestamp_different_projects_independent<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: RunStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let a = RunBuilder::new(5).with_project("project-a").build();
    let b = RunBuilder::new(5)
        .with_project("project-b")
        .with_algorithms_version(42)
        .build();
    seed(&s, &[a.clone(), b.clone()]).await?;

    expect_eq(
        "project-a",
        read_committed(&s, "project-a", a.attempt_timestamp).await?,
        a,
    )?;
    expect_eq(
        "project-b",
        read_committed(&s, "project-b", b.attempt_timestamp).await?,
        b,
    )
}
