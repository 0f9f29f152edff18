//! Runs the backend conformance suite against the in-memory backend.

use recluster_storage::conformance::run_conformance_suite;
use recluster_storage::InMemoryStorage;

#[tokio::test]
async fn in_memory_storage_passes_conformance_suite() {
    let report = run_conformance_suite(|| async { InMemoryStorage::new() }).await;
    assert!(report.total > 0);
    assert_eq!(report.failed, 0, "{report}");
}
