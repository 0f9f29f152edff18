use recluster_core::{RunTargets, PROGRESS_SCALE, STARTING_EPOCH};
use serde::{Deserialize, Serialize};
use time::macros::datetime;
use time::{Duration, OffsetDateTime};

/// Attempt timestamp of the placeholder run returned for projects that have
/// no runs yet.
pub const PLACEHOLDER_ATTEMPT_TIMESTAMP: OffsetDateTime = datetime!(1900-01-01 0:00 UTC);

/// One attempt to recluster a project's data up to a set of target versions.
///
/// Keyed by `(project, attempt_timestamp)`. Everything except
/// `shards_reported` and `progress` is immutable once created, and those two
/// only ever increase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReclusteringRun {
    pub project: String,
    /// Identity and order key; newer attempts have larger timestamps.
    #[serde(with = "time::serde::rfc3339")]
    pub attempt_timestamp: OffsetDateTime,
    /// Minimum algorithms version this run reclusters to.
    pub algorithms_version: i64,
    /// Minimum rules version this run reclusters to.
    #[serde(with = "time::serde::rfc3339")]
    pub rules_version: OffsetDateTime,
    /// Minimum config version this run reclusters to. Absent in rows
    /// written before config versioning existed.
    #[serde(with = "time::serde::rfc3339", default = "starting_epoch")]
    pub config_version: OffsetDateTime,
    pub shard_count: i64,
    /// Number of distinct shards that have reported at least once.
    pub shards_reported: i64,
    /// Sum over shards of each shard's last reported per-mille progress.
    pub progress: i64,
}

fn starting_epoch() -> OffsetDateTime {
    STARTING_EPOCH
}

impl ReclusteringRun {
    /// The run reported for a project that has never been reclustered:
    /// a fully complete run targeting the oldest possible versions.
    pub fn placeholder(project: &str) -> Self {
        ReclusteringRun {
            project: project.to_string(),
            attempt_timestamp: PLACEHOLDER_ATTEMPT_TIMESTAMP,
            algorithms_version: 1,
            rules_version: STARTING_EPOCH,
            config_version: STARTING_EPOCH,
            shard_count: 1,
            shards_reported: 1,
            progress: PROGRESS_SCALE,
        }
    }

    /// Every shard has reported at least once.
    pub fn has_progress(&self) -> bool {
        self.shards_reported == self.shard_count
    }

    /// Every shard has reported 1000 per-mille.
    pub fn is_complete(&self) -> bool {
        self.shard_count
            .checked_mul(PROGRESS_SCALE)
            .is_some_and(|total| total == self.progress)
    }

    /// Average shard progress in per-mille, rounded down.
    pub fn progress_per_mille(&self) -> i64 {
        if self.shard_count <= 0 {
            return 0;
        }
        self.progress / self.shard_count
    }

    pub fn targets(&self) -> RunTargets {
        RunTargets {
            rules_version: self.rules_version,
            config_version: self.config_version,
            algorithms_version: self.algorithms_version,
        }
    }
}

/// Builder for test and fixture runs.
///
/// `RunBuilder::new(n)` produces a distinct, valid run for each `n`.
#[derive(Debug, Clone)]
pub struct RunBuilder {
    run: ReclusteringRun,
}

impl RunBuilder {
    pub fn new(uniqifier: i64) -> Self {
        let shard_count = uniqifier + 1;
        let shards_reported = shard_count / 2;
        RunBuilder {
            run: ReclusteringRun {
                project: "testproject".to_string(),
                attempt_timestamp: datetime!(2010-01-01 0:00 UTC) + Duration::hours(uniqifier),
                algorithms_version: uniqifier + 1,
                rules_version: datetime!(2011-01-01 0:00 UTC) + Duration::hours(uniqifier),
                config_version: datetime!(2012-01-01 0:00 UTC) + Duration::hours(uniqifier),
                shard_count,
                shards_reported,
                progress: shards_reported * 500,
            },
        }
    }

    pub fn with_project(mut self, project: &str) -> Self {
        self.run.project = project.to_string();
        self
    }

    pub fn with_attempt_timestamp(mut self, ts: OffsetDateTime) -> Self {
        self.run.attempt_timestamp = ts;
        self
    }

    pub fn with_algorithms_version(mut self, version: i64) -> Self {
        self.run.algorithms_version = version;
        self
    }

    pub fn with_rules_version(mut self, version: OffsetDateTime) -> Self {
        self.run.rules_version = version;
        self
    }

    pub fn with_config_version(mut self, version: OffsetDateTime) -> Self {
        self.run.config_version = version;
        self
    }

    /// Sets the shard count, rescaling progress so the per-mille average
    /// and reporting completeness are preserved.
    pub fn with_shard_count(mut self, count: i64) -> Self {
        let per_mille = self.run.progress_per_mille();
        let all_reported = self.run.has_progress();
        self.run.shard_count = count;
        self.run.progress = per_mille * count;
        self.run.shards_reported = if all_reported {
            count
        } else {
            self.run.shards_reported.min(count)
        };
        self
    }

    pub fn with_no_reported_progress(mut self) -> Self {
        self.run.shards_reported = 0;
        self.run.progress = 0;
        self
    }

    /// Every shard has reported, at an average of `per_mille`.
    pub fn with_reported_progress(mut self, per_mille: i64) -> Self {
        self.run.shards_reported = self.run.shard_count;
        self.run.progress = self.run.shard_count * per_mille;
        self
    }

    pub fn with_completed_progress(self) -> Self {
        self.with_reported_progress(PROGRESS_SCALE)
    }

    pub fn build(self) -> ReclusteringRun {
        self.run
    }
}
