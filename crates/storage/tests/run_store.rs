//! Run Store behaviour: creation, lookups and placeholder fallback.

use recluster_storage::{
    runs, InMemoryStorage, ReclusteringRun, RunBuilder, RunStorage, SnapshotMode, StorageError,
    PLACEHOLDER_ATTEMPT_TIMESTAMP,
};
use time::macros::datetime;
use time::{Duration, OffsetDateTime};

const REFERENCE: OffsetDateTime = datetime!(2020-01-01 1:00 UTC);

async fn create(storage: &InMemoryStorage, run: &ReclusteringRun) -> Result<(), StorageError> {
    let mut snap = storage.begin_snapshot(SnapshotMode::ReadWrite).await?;
    runs::create(storage, &mut snap, run).await?;
    storage.commit_snapshot(snap).await
}

async fn last_three(storage: &InMemoryStorage, project: &str) -> [ReclusteringRun; 3] {
    let mut snap = storage
        .begin_snapshot(SnapshotMode::ReadOnly)
        .await
        .unwrap();
    let last = runs::read_last(storage, &mut snap, project).await.unwrap();
    let with_progress = runs::read_last_with_progress(storage, &mut snap, project)
        .await
        .unwrap();
    let complete = runs::read_last_complete(storage, &mut snap, project)
        .await
        .unwrap();
    storage.abort_snapshot(snap).await.unwrap();
    [last, with_progress, complete]
}

#[tokio::test]
async fn project_without_runs_reads_placeholder() {
    let storage = InMemoryStorage::new();
    let expected = ReclusteringRun {
        project: "emptyproject".to_string(),
        attempt_timestamp: datetime!(1900-01-01 0:00 UTC),
        algorithms_version: 1,
        rules_version: recluster_core::STARTING_EPOCH,
        config_version: recluster_core::STARTING_EPOCH,
        shard_count: 1,
        shards_reported: 1,
        progress: 1000,
    };
    assert_eq!(expected.attempt_timestamp, PLACEHOLDER_ATTEMPT_TIMESTAMP);
    for run in last_three(&storage, "emptyproject").await {
        assert_eq!(run, expected);
    }
}

#[tokio::test]
async fn read_last_is_newest_regardless_of_insertion_order() {
    let storage = InMemoryStorage::new();
    let t1 = RunBuilder::new(1).with_attempt_timestamp(REFERENCE).build();
    let t2 = RunBuilder::new(2)
        .with_attempt_timestamp(REFERENCE + Duration::seconds(1))
        .build();
    let t3 = RunBuilder::new(3)
        .with_attempt_timestamp(REFERENCE + Duration::seconds(2))
        .build();
    for run in [&t2, &t3, &t1] {
        create(&storage, run).await.unwrap();
    }
    let [last, _, _] = last_three(&storage, "testproject").await;
    assert_eq!(last, t3);
}

#[tokio::test]
async fn filtered_reads_pick_newest_matching_run() {
    let storage = InMemoryStorage::new();
    let oldest = RunBuilder::new(1)
        .with_attempt_timestamp(REFERENCE - Duration::minutes(30))
        .with_completed_progress()
        .build();
    let middle = RunBuilder::new(2)
        .with_attempt_timestamp(REFERENCE - Duration::minutes(20))
        .with_reported_progress(400)
        .build();
    let newest = RunBuilder::new(3)
        .with_attempt_timestamp(REFERENCE - Duration::minutes(10))
        .with_no_reported_progress()
        .build();
    for run in [&oldest, &middle, &newest] {
        create(&storage, run).await.unwrap();
    }

    let [last, with_progress, complete] = last_three(&storage, "testproject").await;
    assert_eq!(last, newest);
    assert_eq!(with_progress, middle);
    assert_eq!(complete, oldest);
}

#[tokio::test]
async fn read_distinguishes_not_found() {
    let storage = InMemoryStorage::new();
    let mut snap = storage
        .begin_snapshot(SnapshotMode::ReadOnly)
        .await
        .unwrap();
    let err = runs::read(&storage, &mut snap, "testproject", REFERENCE)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert!(!err.is_validation());
}

#[tokio::test]
async fn create_rejects_invalid_runs() {
    let storage = InMemoryStorage::new();
    let cases: Vec<(ReclusteringRun, &str)> = vec![
        (
            RunBuilder::new(100).with_project("").build(),
            "project must be valid",
        ),
        (
            RunBuilder::new(100).with_project("!").build(),
            "project must be valid",
        ),
        (
            RunBuilder::new(100).with_shard_count(0).build(),
            "shard count must be valid",
        ),
        (
            {
                let mut run = RunBuilder::new(100).build();
                run.shards_reported = run.shard_count + 1;
                run
            },
            "shards reported must be valid",
        ),
        (
            {
                let mut run = RunBuilder::new(100).build();
                run.progress = run.shard_count * 1000 + 1;
                run
            },
            "progress must be valid",
        ),
        (
            {
                let mut run = RunBuilder::new(100).build();
                run.shard_count = i64::MAX / 10;
                run
            },
            "shard count must be valid",
        ),
    ];
    for (run, message) in cases {
        let err = create(&storage, &run).await.unwrap_err();
        assert!(err.is_validation(), "{err}");
        assert_eq!(err.to_string(), message);
    }
    assert!(storage.runs().unwrap().is_empty());
}

#[tokio::test]
async fn oversized_seeded_run_is_never_complete() {
    let mut huge = RunBuilder::new(0)
        .with_attempt_timestamp(REFERENCE + Duration::hours(1))
        .build();
    huge.shard_count = i64::MAX / 10;
    huge.shards_reported = huge.shard_count;
    let complete = RunBuilder::new(1)
        .with_attempt_timestamp(REFERENCE)
        .with_completed_progress()
        .build();
    let storage = InMemoryStorage::from_runs([complete.clone(), huge.clone()]).unwrap();

    let [last, with_progress, last_complete] = last_three(&storage, "testproject").await;
    assert_eq!(last, huge);
    assert_eq!(with_progress, huge);
    assert_eq!(last_complete, complete);
}

#[tokio::test]
async fn runs_dump_round_trips_through_json() {
    let storage = InMemoryStorage::new();
    let run = RunBuilder::new(7).build();
    create(&storage, &run).await.unwrap();

    let json = serde_json::to_string(&storage.runs().unwrap()).unwrap();
    let loaded: Vec<ReclusteringRun> = serde_json::from_str(&json).unwrap();
    let reloaded = InMemoryStorage::from_runs(loaded).unwrap();
    assert_eq!(reloaded.runs().unwrap(), vec![run]);
}
