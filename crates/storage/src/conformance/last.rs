use std::future::Future;

use time::macros::datetime;
use time::{Duration, OffsetDateTime};

use super::{expect_eq, seed, TestResult};
use crate::record::{ReclusteringRun, RunBuilder};
use crate::{runs, RunStorage, SnapshotMode};

const REFERENCE: OffsetDateTime = datetime!(2020-01-01 1:00 UTC);

pub(super) async fn run_last_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: RunStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "last",
            "empty_project_returns_placeholder",
            empty_project_returns_placeholder(factory).await,
        ),
        TestResult::from_result(
            "last",
            "read_last_picks_newest",
            read_last_picks_newest(factory).await,
        ),
        TestResult::from_result(
            "last",
            "read_last_ignores_insertion_order",
            read_last_ignores_insertion_order(factory).await,
        ),
        TestResult::from_result(
            "last",
            "read_last_with_progress_filters",
            read_last_with_progress_filters(factory).await,
        ),
        TestResult::from_result(
            "last",
            "read_last_complete_filters",
            read_last_complete_filters(factory).await,
        ),
        TestResult::from_result(
            "last",
            "list_runs_newest_first",
            list_runs_newest_first(factory).await,
        ),
    ]
}

/// Runs in `testproject` (and one newer run in another project), newest
/// first: no progress, no progress, 50%, 50%, complete, complete.
fn fixture() -> Vec<ReclusteringRun> {
    vec![
        RunBuilder::new(0)
            .with_project("otherproject")
            .with_attempt_timestamp(REFERENCE)
            .with_completed_progress()
            .build(),
        RunBuilder::new(1)
            .with_attempt_timestamp(REFERENCE - Duration::minutes(5))
            .with_no_reported_progress()
            .build(),
        RunBuilder::new(2)
            .with_attempt_timestamp(REFERENCE - Duration::minutes(10))
            .with_no_reported_progress()
            .build(),
        RunBuilder::new(3)
            .with_attempt_timestamp(REFERENCE - Duration::minutes(20))
            .with_reported_progress(500)
            .build(),
        RunBuilder::new(4)
            .with_attempt_timestamp(REFERENCE - Duration::minutes(30))
            .with_reported_progress(500)
            .build(),
        RunBuilder::new(5)
            .with_attempt_timestamp(REFERENCE - Duration::minutes(40))
            .with_completed_progress()
            .build(),
        RunBuilder::new(6)
            .with_attempt_timestamp(REFERENCE - Duration::minutes(50))
            .with_completed_progress()
            .build(),
    ]
}

struct LastRuns {
    last: ReclusteringRun,
    with_progress: ReclusteringRun,
    complete: ReclusteringRun,
}

async fn read_all_last<S: RunStorage>(storage: &S, project: &str) -> Result<LastRuns, String> {
    let mut snap = storage
        .begin_snapshot(SnapshotMode::ReadOnly)
        .await
        .map_err(|e| e.to_string())?;
    let result = async {
        Ok::<_, String>(LastRuns {
            last: runs::read_last(storage, &mut snap, project)
                .await
                .map_err(|e| format!("read_last: {e}"))?,
            with_progress: runs::read_last_with_progress(storage, &mut snap, project)
                .await
                .map_err(|e| format!("read_last_with_progress: {e}"))?,
            complete: runs::read_last_complete(storage, &mut snap, project)
                .await
                .map_err(|e| format!("read_last_complete: {e}"))?,
        })
    }
    .await;
    let _ = storage.abort_snapshot(snap).await;
    result
}

async fn empty_project_returns_placeholder<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RunStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, &fixture()).await?;

    let expected = ReclusteringRun::placeholder("emptyproject");
    let got = read_all_last(&s, "emptyproject").await?;
    expect_eq("read_last", &got.last, &expected)?;
    expect_eq("read_last_with_progress", &got.with_progress, &expected)?;
    expect_eq("read_last_complete", &got.complete, &expected)
}

async fn read_last_picks_newest<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RunStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let runs = fixture();
    seed(&s, &runs).await?;

    let got = read_all_last(&s, "testproject").await?;
    expect_eq("read_last", got.last, runs[1].clone())
}

async fn read_last_ignores_insertion_order<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RunStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let t1 = RunBuilder::new(1).with_attempt_timestamp(REFERENCE).build();
    let t2 = RunBuilder::new(2)
        .with_attempt_timestamp(REFERENCE + Duration::minutes(1))
        .build();
    let t3 = RunBuilder::new(3)
        .with_attempt_timestamp(REFERENCE + Duration::minutes(2))
        .build();
    // Each in its own snapshot, newest first.
    seed(&s, std::slice::from_ref(&t3)).await?;
    seed(&s, std::slice::from_ref(&t1)).await?;
    seed(&s, std::slice::from_ref(&t2)).await?;

    let got = read_all_last(&s, "testproject").await?;
    expect_eq("read_last", got.last, t3)
}

async fn read_last_with_progress_filters<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RunStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let runs = fixture();
    seed(&s, &runs).await?;

    let got = read_all_last(&s, "testproject").await?;
    expect_eq("read_last_with_progress", got.with_progress, runs[3].clone())
}

async fn read_last_complete_filters<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RunStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let runs = fixture();
    seed(&s, &runs).await?;

    let got = read_all_last(&s, "testproject").await?;
    expect_eq("read_last_complete", got.complete, runs[5].clone())
}

async fn list_runs_newest_first<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RunStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let runs = fixture();
    seed(&s, &runs).await?;

    let mut snap = s
        .begin_snapshot(SnapshotMode::ReadOnly)
        .await
        .map_err(|e| e.to_string())?;
    let listed = runs::list(&s, &mut snap, "testproject").await;
    let _ = s.abort_snapshot(snap).await;
    let listed = listed.map_err(|e| e.to_string())?;

    expect_eq("listed runs", listed, runs[1..].to_vec())
}
