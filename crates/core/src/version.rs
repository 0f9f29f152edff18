//! Version constants and the target triple a reclustering run aims for.

use serde::{Deserialize, Serialize};
use time::macros::datetime;
use time::OffsetDateTime;

/// The rules (and config) version used for projects that have never had
/// rules or config. No valid version is older than this.
pub const STARTING_EPOCH: OffsetDateTime = datetime!(1900-01-01 0:00 UTC);

/// The zero timestamp. A run whose attempt timestamp equals this has not
/// had one assigned.
pub const UNSET_TIMESTAMP: OffsetDateTime = datetime!(0001-01-01 0:00 UTC);

/// Version of the clustering algorithms compiled into this build.
///
/// Readers compare stored runs against this value, but never assume it is
/// the newest version in existence: a writer running newer code may already
/// have created runs targeting a later version.
pub const ALGORITHMS_VERSION: i64 = 3;

/// Progress units per shard. Shards report progress in per-mille.
pub const PROGRESS_SCALE: i64 = 1000;

/// The minimum versions a reclustering run brings clustered data up to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunTargets {
    #[serde(with = "time::serde::rfc3339")]
    pub rules_version: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub config_version: OffsetDateTime,
    pub algorithms_version: i64,
}

impl RunTargets {
    /// Targets of a project that has never been reclustered.
    pub const fn initial() -> Self {
        RunTargets {
            rules_version: STARTING_EPOCH,
            config_version: STARTING_EPOCH,
            algorithms_version: 1,
        }
    }
}

impl Default for RunTargets {
    fn default() -> Self {
        Self::initial()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn targets_serialize_camel_case_rfc3339() {
        let json = serde_json::to_value(RunTargets::initial()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "rulesVersion": "1900-01-01T00:00:00Z",
                "configVersion": "1900-01-01T00:00:00Z",
                "algorithmsVersion": 1,
            })
        );
    }

    #[test]
    fn unset_is_before_epoch() {
        assert!(UNSET_TIMESTAMP < STARTING_EPOCH);
    }
}
