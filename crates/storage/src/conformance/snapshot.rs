use std::future::Future;

use super::{expect_eq, read_committed, seed, TestResult};
use crate::record::RunBuilder;
use crate::{runs, RunStorage, SnapshotMode};

pub(super) async fn run_snapshot_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: RunStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "snapshot",
            "uncommitted_create_invisible",
            uncommitted_create_invisible(factory).await,
        ),
        TestResult::from_result(
            "snapshot",
            "aborted_create_discarded",
            aborted_create_discarded(factory).await,
        ),
        TestResult::from_result(
            "snapshot",
            "aborted_progress_discarded",
            aborted_progress_discarded(factory).await,
        ),
        TestResult::from_result(
            "snapshot",
            "read_only_snapshot_is_stable",
            read_only_snapshot_is_stable(factory).await,
        ),
        TestResult::from_result(
            "snapshot",
            "read_only_snapshot_rejects_writes",
            read_only_snapshot_rejects_writes(factory).await,
        ),
    ]
}

async fn uncommitted_create_invisible<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RunStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let run = RunBuilder::new(1).build();
    let mut writer = s
        .begin_snapshot(SnapshotMode::ReadWrite)
        .await
        .map_err(|e| e.to_string())?;
    runs::create(&s, &mut writer, &run)
        .await
        .map_err(|e| e.to_string())?;

    let visible = read_committed(&s, &run.project, run.attempt_timestamp)
        .await
        .is_ok();
    s.abort_snapshot(writer).await.map_err(|e| e.to_string())?;
    if visible {
        return Err("uncommitted run visible to another snapshot".to_string());
    }
    Ok(())
}

async fn aborted_create_discarded<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RunStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let run = RunBuilder::new(2).build();
    let mut snap = s
        .begin_snapshot(SnapshotMode::ReadWrite)
        .await
        .map_err(|e| e.to_string())?;
    runs::create(&s, &mut snap, &run)
        .await
        .map_err(|e| e.to_string())?;
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;

    match read_committed(&s, &run.project, run.attempt_timestamp).await {
        Err(_) => Ok(()),
        Ok(_) => Err("aborted run visible".to_string()),
    }
}

async fn aborted_progress_discarded<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RunStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let run = RunBuilder::new(3).with_no_reported_progress().build();
    seed(&s, std::slice::from_ref(&run)).await?;

    let mut snap = s
        .begin_snapshot(SnapshotMode::ReadWrite)
        .await
        .map_err(|e| e.to_string())?;
    runs::report_progress(&s, &mut snap, &run.project, run.attempt_timestamp, true, 500)
        .await
        .map_err(|e| e.to_string())?;
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;

    let got = read_committed(&s, &run.project, run.attempt_timestamp).await?;
    expect_eq("shards_reported", got.shards_reported, 0)?;
    expect_eq("progress", got.progress, 0)
}

/// A read-only snapshot keeps seeing the state it began with while another
/// snapshot commits progress.
async fn read_only_snapshot_is_stable<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RunStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let run = RunBuilder::new(4).with_no_reported_progress().build();
    seed(&s, std::slice::from_ref(&run)).await?;

    let mut reader = s
        .begin_snapshot(SnapshotMode::ReadOnly)
        .await
        .map_err(|e| e.to_string())?;
    let before = runs::read(&s, &mut reader, &run.project, run.attempt_timestamp)
        .await
        .map_err(|e| e.to_string())?;

    let mut writer = s
        .begin_snapshot(SnapshotMode::ReadWrite)
        .await
        .map_err(|e| e.to_string())?;
    runs::report_progress(&s, &mut writer, &run.project, run.attempt_timestamp, true, 700)
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(writer).await.map_err(|e| e.to_string())?;

    let after = runs::read(&s, &mut reader, &run.project, run.attempt_timestamp)
        .await
        .map_err(|e| e.to_string())?;
    s.abort_snapshot(reader).await.map_err(|e| e.to_string())?;
    expect_eq("read-only view", after, before)?;

    let committed = read_committed(&s, &run.project, run.attempt_timestamp).await?;
    expect_eq("committed progress", committed.progress, 700)
}

async fn read_only_snapshot_rejects_writes<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RunStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let run = RunBuilder::new(5).build();
    let mut snap = s
        .begin_snapshot(SnapshotMode::ReadOnly)
        .await
        .map_err(|e| e.to_string())?;
    let result = runs::create(&s, &mut snap, &run).await;
    let _ = s.abort_snapshot(snap).await;
    match result {
        Err(crate::StorageError::ReadOnlySnapshot) => Ok(()),
        Err(e) => Err(format!("expected ReadOnlySnapshot, got {e}")),
        Ok(()) => Err("write through read-only snapshot succeeded".to_string()),
    }
}
