//! The reclustering progress snapshot served to consumers.
//!
//! Three runs matter for a project:
//!
//! - the last *complete* run: its targets are what clustered data is
//!   guaranteed to reflect (`last`);
//! - the last run every shard has reported on: the run in flight, whose
//!   targets are being reclustered to now (`next`);
//! - the last run of all: the newest versions anyone has asked for.
//!
//! All three are read in one read-only snapshot so the view is never torn.

use recluster_core::{RunTargets, ALGORITHMS_VERSION, PROGRESS_SCALE, STARTING_EPOCH};
use recluster_storage::{runs, ReclusteringRun, RunStorage, SnapshotMode, StorageError};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::ProgressError;

/// Share of the credit, in per-mille, for a target that the in-flight run
/// has started reclustering to. Completing that run earns the rest.
const STARTED_WEIGHT: i64 = 300;

/// Versions known to the reading process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressOptions {
    /// Algorithms version compiled into (or configured for) this process.
    pub algorithms_version: i64,
    /// Newest config version this process knows of.
    pub config_version: OffsetDateTime,
}

impl Default for ProgressOptions {
    fn default() -> Self {
        ProgressOptions {
            algorithms_version: ALGORITHMS_VERSION,
            config_version: STARTING_EPOCH,
        }
    }
}

/// Point-in-time reclustering progress of a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReclusteringProgress {
    /// Progress of the run in flight (`next`), 0..=1000.
    pub progress_per_mille: i64,
    /// Newest algorithms version known, to this process or to storage.
    pub latest_algorithms_version: i64,
    /// Newest config version known, to this process or to storage.
    #[serde(with = "time::serde::rfc3339")]
    pub latest_config_version: OffsetDateTime,
    /// Targets of the run in flight.
    pub next: RunTargets,
    /// Targets of the last complete run.
    pub last: RunTargets,
}

impl ReclusteringProgress {
    /// Combine the three "last run" reads.
    pub fn from_runs(
        last_complete: &ReclusteringRun,
        last_with_progress: &ReclusteringRun,
        last: &ReclusteringRun,
        options: &ProgressOptions,
    ) -> Self {
        // A reader running older code must not report a latest version
        // older than one a newer writer already stored.
        let latest_algorithms_version = options.algorithms_version.max(last.algorithms_version);
        let latest_config_version = options.config_version.max(last.config_version);
        ReclusteringProgress {
            progress_per_mille: last_with_progress.progress_per_mille(),
            latest_algorithms_version,
            latest_config_version,
            next: last_with_progress.targets(),
            last: last_complete.targets(),
        }
    }

    /// Clustered data reflects every rule change up to `version`.
    ///
    /// Only a complete run counts: a partially reclustered project can hold
    /// a mix of old and new rules across chunks.
    pub fn incorporates_rules_version(&self, version: OffsetDateTime) -> bool {
        version <= self.last.rules_version
    }

    pub fn is_reclustering_to_new_algorithms(&self) -> bool {
        self.last.algorithms_version < self.latest_algorithms_version
    }

    pub fn incorporates_latest_algorithms(&self) -> bool {
        !self.is_reclustering_to_new_algorithms()
    }

    pub fn is_reclustering_to_new_config(&self) -> bool {
        self.last.config_version < self.latest_config_version
    }

    /// Per-mille progress towards clustered data reflecting rules `version`.
    pub fn progress_to_rules_version(&self, version: OffsetDateTime) -> i64 {
        self.progress_towards(|t| t.rules_version >= version)
    }

    pub fn progress_to_latest_algorithms_version(&self) -> i64 {
        let latest = self.latest_algorithms_version;
        self.progress_towards(|t| t.algorithms_version >= latest)
    }

    pub fn progress_to_latest_config_version(&self) -> i64 {
        let latest = self.latest_config_version;
        self.progress_towards(|t| t.config_version >= latest)
    }

    /// 1000 if the last complete run satisfies `reached`. Otherwise
    /// 300..=1000 scaled by in-flight progress if the in-flight run does,
    /// else 0..=300 scaled the same way: only a run after this one will get
    /// there, and it starts once this one ends.
    fn progress_towards(&self, reached: impl Fn(&RunTargets) -> bool) -> i64 {
        if reached(&self.last) {
            return PROGRESS_SCALE;
        }
        if reached(&self.next) {
            return STARTED_WEIGHT
                + self.progress_per_mille * (PROGRESS_SCALE - STARTED_WEIGHT) / PROGRESS_SCALE;
        }
        self.progress_per_mille * STARTED_WEIGHT / PROGRESS_SCALE
    }
}

/// Read the reclustering progress of `project` in one read-only snapshot.
///
/// Either all three reads succeed or an error is returned; there are no
/// partial snapshots.
pub async fn read_reclustering_progress<S: RunStorage>(
    storage: &S,
    project: &str,
    options: &ProgressOptions,
) -> Result<ReclusteringProgress, ProgressError> {
    let mut snapshot = storage.begin_snapshot(SnapshotMode::ReadOnly).await?;
    let result = read_in_snapshot(storage, &mut snapshot, project, options).await;
    let _ = storage.abort_snapshot(snapshot).await;
    Ok(result?)
}

async fn read_in_snapshot<S: RunStorage>(
    storage: &S,
    snapshot: &mut S::Snapshot,
    project: &str,
    options: &ProgressOptions,
) -> Result<ReclusteringProgress, StorageError> {
    let last_complete = runs::read_last_complete(storage, snapshot, project).await?;
    let last_with_progress = runs::read_last_with_progress(storage, snapshot, project).await?;
    let last = runs::read_last(storage, snapshot, project).await?;
    Ok(ReclusteringProgress::from_runs(
        &last_complete,
        &last_with_progress,
        &last,
        options,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use recluster_storage::RunBuilder;
    use time::macros::datetime;
    use time::Duration;

    const RULES: OffsetDateTime = datetime!(2021-01-01 1:00 UTC);

    fn progress(per_mille: i64, next_rules: OffsetDateTime, last_rules: OffsetDateTime) -> ReclusteringProgress {
        ReclusteringProgress {
            progress_per_mille: per_mille,
            latest_algorithms_version: ALGORITHMS_VERSION,
            latest_config_version: STARTING_EPOCH,
            next: RunTargets {
                rules_version: next_rules,
                ..RunTargets::initial()
            },
            last: RunTargets {
                rules_version: last_rules,
                ..RunTargets::initial()
            },
        }
    }

    #[test]
    fn rules_incorporated_only_by_complete_run() {
        let p = progress(500, RULES, RULES - Duration::hours(1));
        assert!(!p.incorporates_rules_version(RULES));
        assert!(p.incorporates_rules_version(RULES - Duration::hours(1)));
        assert!(p.incorporates_rules_version(RULES - Duration::hours(2)));
    }

    #[test]
    fn rules_version_boundary_is_inclusive() {
        let p = progress(1000, RULES, RULES);
        assert!(p.incorporates_rules_version(RULES));
        assert!(!p.incorporates_rules_version(RULES + Duration::nanoseconds(1)));
    }

    #[test]
    fn three_tier_rules_progress() {
        let p = progress(500, RULES, RULES - Duration::hours(1));
        // Complete run already there.
        assert_eq!(p.progress_to_rules_version(RULES - Duration::hours(1)), 1000);
        // In-flight run targets it: 300 + 500 * 0.7.
        assert_eq!(p.progress_to_rules_version(RULES), 650);
        // Only a future run will: 500 * 0.3.
        assert_eq!(p.progress_to_rules_version(RULES + Duration::hours(1)), 150);
    }

    #[test]
    fn three_tier_bounds() {
        let p = progress(0, RULES, RULES - Duration::hours(1));
        assert_eq!(p.progress_to_rules_version(RULES), 300);
        assert_eq!(p.progress_to_rules_version(RULES + Duration::hours(1)), 0);

        let p = progress(1000, RULES, RULES - Duration::hours(1));
        assert_eq!(p.progress_to_rules_version(RULES), 1000);
        assert_eq!(p.progress_to_rules_version(RULES + Duration::hours(1)), 300);
    }

    #[test]
    fn latest_versions_never_go_backwards() {
        let newer = RunBuilder::new(0)
            .with_algorithms_version(ALGORITHMS_VERSION + 2)
            .with_config_version(datetime!(2030-01-01 0:00 UTC))
            .with_no_reported_progress()
            .build();
        let placeholder = ReclusteringRun::placeholder("testproject");
        let p = ReclusteringProgress::from_runs(
            &placeholder,
            &placeholder,
            &newer,
            &ProgressOptions::default(),
        );
        assert_eq!(p.latest_algorithms_version, ALGORITHMS_VERSION + 2);
        assert_eq!(p.latest_config_version, datetime!(2030-01-01 0:00 UTC));
        assert!(p.is_reclustering_to_new_algorithms());
        assert!(p.is_reclustering_to_new_config());
        assert_eq!(p.progress_to_latest_algorithms_version(), 300);
        assert_eq!(p.progress_to_latest_config_version(), 300);
    }

    #[test]
    fn injected_options_raise_latest_versions() {
        let placeholder = ReclusteringRun::placeholder("testproject");
        let options = ProgressOptions {
            algorithms_version: 9,
            config_version: datetime!(2022-06-01 0:00 UTC),
        };
        let p = ReclusteringProgress::from_runs(&placeholder, &placeholder, &placeholder, &options);
        assert_eq!(p.latest_algorithms_version, 9);
        assert_eq!(p.latest_config_version, datetime!(2022-06-01 0:00 UTC));
        assert_eq!(p.progress_per_mille, 1000);
        assert!(p.is_reclustering_to_new_algorithms());
        // Only a run not yet created will reach it.
        assert_eq!(p.progress_to_latest_algorithms_version(), 300);
    }

    #[test]
    fn serializes_camel_case() {
        let p = progress(250, RULES, STARTING_EPOCH);
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["progressPerMille"], 250);
        assert_eq!(json["latestAlgorithmsVersion"], ALGORITHMS_VERSION);
        assert_eq!(json["latestConfigVersion"], "1900-01-01T00:00:00Z");
        assert_eq!(json["next"]["rulesVersion"], "2021-01-01T01:00:00Z");
        assert_eq!(json["last"]["algorithmsVersion"], 1);
    }
}
