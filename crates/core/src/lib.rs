//! recluster-core: identifiers and version constants shared by the
//! reclustering progress crates.
//!
//! Nothing here touches storage. The crate defines what a valid project
//! looks like, the oldest rules/config version that can exist
//! ([`STARTING_EPOCH`]), the algorithms version compiled into this build
//! ([`ALGORITHMS_VERSION`]) and the per-mille progress scale every shard
//! reports on.

pub mod project;
pub mod timestamp;
pub mod version;

pub use project::{is_valid_project, validate_project, ProjectError, PROJECT_MAX_LENGTH};
pub use timestamp::{format_rfc3339, parse_rfc3339, truncate, TimestampError};
pub use version::{
    RunTargets, ALGORITHMS_VERSION, PROGRESS_SCALE, STARTING_EPOCH, UNSET_TIMESTAMP,
};
