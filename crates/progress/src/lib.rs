//! Reclustering progress: per-shard progress reporting, the progress
//! snapshot served to consumers, and planning of new runs.
//!
//! - [`ProgressToken`] turns a shard's repeated absolute progress reports
//!   into additive deltas against its run, never applying a delta twice.
//! - [`read_reclustering_progress`] combines the run store's "last run"
//!   queries into a [`ReclusteringProgress`] snapshot.
//! - [`orchestrate`] creates runs and divides the chunk keyspace between
//!   workers; [`keyspace`] maps a worker's position to per-mille progress.

pub mod aggregate;
mod error;
pub mod keyspace;
pub mod orchestrate;
pub mod token;

pub use aggregate::{read_reclustering_progress, ProgressOptions, ReclusteringProgress};
pub use error::ProgressError;
pub use orchestrate::{orchestrate_project, AttemptWindow, Orchestration, ShardAssignment};
pub use token::ProgressToken;
