//! Conformance test suite for `RunStorage` implementations.
//!
//! A backend-agnostic suite that any `RunStorage` implementation can run to
//! verify correctness. The suite covers:
//!
//! - **Create / read**: validated creation, point lookup, duplicate keys
//! - **Last run**: newest-run selection, progress filters, placeholder fallback
//! - **Progress**: additive increments and shard counting
//! - **Snapshot isolation**: uncommitted writes invisible, read-only snapshots stable
//! - **Concurrency**: increments from many tasks compose
//!
//! # Usage
//!
//! Backend crates call [`run_conformance_suite`] with a factory function that
//! creates a fresh, empty storage instance for each test:
//!
//! ```ignore
//! use recluster_storage::conformance::run_conformance_suite;
//!
//! #[tokio::test]
//! async fn spanner_conformance() {
//!     let report = run_conformance_suite(|| async {
//!         create_test_spanner_storage().await
//!     }).await;
//!     assert!(report.failed == 0, "{report}");
//! }
//! ```

mod concurrent;
mod create;
mod last;
mod progress;
mod snapshot;

use std::fmt;
use std::future::Future;

use time::OffsetDateTime;

use crate::record::ReclusteringRun;
use crate::traits::{RunStorage, SnapshotMode};

/// Result of a single conformance test.
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Test category (e.g. "create", "last", "progress").
    pub category: String,
    /// Test name (e.g. "create_then_read_returns_run").
    pub name: String,
    pub passed: bool,
    /// Error message if the test failed.
    pub message: Option<String>,
}

impl TestResult {
    fn from_result(category: &str, name: &str, result: Result<(), String>) -> Self {
        let (passed, message) = match result {
            Ok(()) => (true, None),
            Err(msg) => (false, Some(msg)),
        };
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed,
            message,
        }
    }
}

/// Aggregated report from a full conformance suite run.
#[derive(Debug, Clone)]
pub struct ConformanceReport {
    pub results: Vec<TestResult>,
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Conformance: {}/{} passed ({} failed)",
            self.passed, self.total, self.failed
        )?;
        for r in self.results.iter().filter(|r| !r.passed) {
            writeln!(
                f,
                "  FAIL [{}/{}]: {}",
                r.category,
                r.name,
                r.message.as_deref().unwrap_or("(no message)")
            )?;
        }
        Ok(())
    }
}

/// Run the full conformance suite against a storage backend.
///
/// The `factory` function is called once per test to create a fresh, empty
/// storage instance.
pub async fn run_conformance_suite<S, F, Fut>(factory: F) -> ConformanceReport
where
    S: RunStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.extend(create::run_create_tests(&factory).await);
    results.extend(last::run_last_tests(&factory).await);
    results.extend(progress::run_progress_tests(&factory).await);
    results.extend(snapshot::run_snapshot_tests(&factory).await);
    results.extend(concurrent::run_concurrent_tests(&factory).await);

    let passed = results.iter().filter(|r| r.passed).count();
    let total = results.len();

    ConformanceReport {
        results,
        passed,
        failed: total - passed,
        total,
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Create runs in one committed snapshot.
async fn seed<S: RunStorage>(storage: &S, runs: &[ReclusteringRun]) -> Result<(), String> {
    let mut snap = storage
        .begin_snapshot(SnapshotMode::ReadWrite)
        .await
        .map_err(|e| format!("begin: {e}"))?;
    for run in runs {
        crate::runs::create(storage, &mut snap, run)
            .await
            .map_err(|e| format!("create: {e}"))?;
    }
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit seed: {e}"))
}

/// Read one run in its own read-only snapshot.
async fn read_committed<S: RunStorage>(
    storage: &S,
    project: &str,
    attempt_timestamp: OffsetDateTime,
) -> Result<ReclusteringRun, String> {
    let mut snap = storage
        .begin_snapshot(SnapshotMode::ReadOnly)
        .await
        .map_err(|e| format!("begin: {e}"))?;
    let run = crate::runs::read(storage, &mut snap, project, attempt_timestamp)
        .await
        .map_err(|e| format!("read: {e}"));
    let _ = storage.abort_snapshot(snap).await;
    run
}

fn expect_eq<T: PartialEq + fmt::Debug>(what: &str, actual: T, expected: T) -> Result<(), String> {
    if actual == expected {
        Ok(())
    } else {
        Err(format!("{what}: expected {expected:?}, got {actual:?}"))
    }
}
