//! Application state.

use recluster_progress::ProgressOptions;
use recluster_storage::InMemoryStorage;

/// Application state shared across request handlers.
pub(crate) struct AppState {
    /// Run store. Cloning shares the underlying table.
    pub(crate) storage: InMemoryStorage,
    /// Versions this server knows of, for progress snapshots.
    pub(crate) options: ProgressOptions,
    /// Optional API key for authentication. None = no auth required.
    pub(crate) api_key: Option<String>,
}
