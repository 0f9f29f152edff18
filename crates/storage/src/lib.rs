//! recluster-storage: durable state for reclustering runs.
//!
//! - [`RunStorage`] is the backend seam: a transactional store of
//!   [`ReclusteringRun`] rows with snapshot (transaction) semantics.
//! - [`runs`] holds the Run Store operations built on top of any backend:
//!   validated creation, point and "last run" lookups with placeholder
//!   fallback, and additive progress reporting.
//! - [`InMemoryStorage`] is a complete in-process backend.
//! - [`conformance`] is a backend-agnostic test suite.

pub mod conformance;
mod error;
mod memory;
mod record;
pub mod runs;
mod traits;

pub use error::StorageError;
pub use memory::{CommitFault, InMemoryStorage, MemorySnapshot};
pub use record::{ReclusteringRun, RunBuilder, PLACEHOLDER_ATTEMPT_TIMESTAMP};
pub use traits::{RunFilter, RunStorage, SnapshotMode};
