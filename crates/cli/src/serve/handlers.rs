//! HTTP route handlers: health, progress snapshot, runs.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use recluster_core::{parse_rfc3339, validate_project};
use recluster_progress::{read_reclustering_progress, ProgressError};
use recluster_storage::{runs, ReclusteringRun, RunStorage, SnapshotMode, StorageError};
use serde::Deserialize;
use time::OffsetDateTime;

use super::json_error;
use super::state::AppState;

/// Body of `POST /projects/{project}/runs`. The project comes from the path.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct CreateRunRequest {
    #[serde(with = "time::serde::rfc3339")]
    attempt_timestamp: OffsetDateTime,
    algorithms_version: i64,
    #[serde(with = "time::serde::rfc3339")]
    rules_version: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    config_version: Option<OffsetDateTime>,
    shard_count: i64,
    #[serde(default)]
    shards_reported: i64,
    #[serde(default)]
    progress: i64,
}

impl CreateRunRequest {
    fn into_run(self, project: String) -> ReclusteringRun {
        ReclusteringRun {
            project,
            attempt_timestamp: self.attempt_timestamp,
            algorithms_version: self.algorithms_version,
            rules_version: self.rules_version,
            config_version: self.config_version.unwrap_or(recluster_core::STARTING_EPOCH),
            shard_count: self.shard_count,
            shards_reported: self.shards_reported,
            progress: self.progress,
        }
    }
}

fn storage_error(e: &StorageError) -> Response {
    let status = match e {
        StorageError::Validation(_) => StatusCode::BAD_REQUEST,
        StorageError::RunNotFound { .. } => StatusCode::NOT_FOUND,
        StorageError::AlreadyExists { .. } => StatusCode::CONFLICT,
        StorageError::ReadOnlySnapshot | StorageError::Backend(_) => {
            tracing::error!(error = %e, "run store failure");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    json_error(status, &e.to_string()).into_response()
}

/// Reject malformed projects before touching storage.
fn check_project(project: &str) -> Result<(), Response> {
    validate_project(project)
        .map_err(|e| json_error(StatusCode::BAD_REQUEST, &e.to_string()).into_response())
}

/// Fallback handler for unmatched routes.
pub(crate) async fn handle_not_found() -> impl IntoResponse {
    json_error(StatusCode::NOT_FOUND, "not found")
}

/// GET /health
pub(crate) async fn handle_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let response = serde_json::json!({
        "status": "ok",
        "algorithms_version": state.options.algorithms_version,
    });
    (StatusCode::OK, Json(response))
}

/// GET /projects/{project}/reclusteringProgress
pub(crate) async fn handle_reclustering_progress(
    State(state): State<Arc<AppState>>,
    Path(project): Path<String>,
) -> Response {
    if let Err(resp) = check_project(&project) {
        return resp;
    }
    match read_reclustering_progress(&state.storage, &project, &state.options).await {
        Ok(progress) => (StatusCode::OK, Json(progress)).into_response(),
        Err(ProgressError::Storage(e)) => {
            tracing::error!(project = %project, error = %e, "reading reclustering progress");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()).into_response()
        }
        Err(e) => json_error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()).into_response(),
    }
}

/// GET /projects/{project}/runs
pub(crate) async fn handle_list_runs(
    State(state): State<Arc<AppState>>,
    Path(project): Path<String>,
) -> Response {
    if let Err(resp) = check_project(&project) {
        return resp;
    }
    match list_runs(&state.storage, &project).await {
        Ok(runs) => (StatusCode::OK, Json(serde_json::json!({ "runs": runs }))).into_response(),
        Err(e) => storage_error(&e),
    }
}

/// GET /projects/{project}/runs/{attempt}
pub(crate) async fn handle_get_run(
    State(state): State<Arc<AppState>>,
    Path((project, attempt)): Path<(String, String)>,
) -> Response {
    if let Err(resp) = check_project(&project) {
        return resp;
    }
    let attempt_timestamp = match parse_rfc3339(&attempt) {
        Ok(ts) => ts,
        Err(e) => return json_error(StatusCode::BAD_REQUEST, &e.to_string()).into_response(),
    };
    match read_run(&state.storage, &project, attempt_timestamp).await {
        Ok(run) => (StatusCode::OK, Json(run)).into_response(),
        Err(e) => storage_error(&e),
    }
}

/// POST /projects/{project}/runs
pub(crate) async fn handle_create_run(
    State(state): State<Arc<AppState>>,
    Path(project): Path<String>,
    body: Result<Json<CreateRunRequest>, JsonRejection>,
) -> Response {
    if let Err(resp) = check_project(&project) {
        return resp;
    }
    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => {
            return json_error(StatusCode::BAD_REQUEST, &rejection.body_text()).into_response()
        }
    };
    let run = request.into_run(project);

    match create_run(&state.storage, &run).await {
        Ok(()) => (StatusCode::CREATED, Json(run)).into_response(),
        Err(e) => storage_error(&e),
    }
}

async fn list_runs<S: RunStorage>(
    storage: &S,
    project: &str,
) -> Result<Vec<ReclusteringRun>, StorageError> {
    let mut snapshot = storage.begin_snapshot(SnapshotMode::ReadOnly).await?;
    let listed = runs::list(storage, &mut snapshot, project).await;
    let _ = storage.abort_snapshot(snapshot).await;
    listed
}

async fn read_run<S: RunStorage>(
    storage: &S,
    project: &str,
    attempt_timestamp: OffsetDateTime,
) -> Result<ReclusteringRun, StorageError> {
    let mut snapshot = storage.begin_snapshot(SnapshotMode::ReadOnly).await?;
    let run = runs::read(storage, &mut snapshot, project, attempt_timestamp).await;
    let _ = storage.abort_snapshot(snapshot).await;
    run
}

async fn create_run<S: RunStorage>(storage: &S, run: &ReclusteringRun) -> Result<(), StorageError> {
    let mut snapshot = storage.begin_snapshot(SnapshotMode::ReadWrite).await?;
    if let Err(e) = runs::create(storage, &mut snapshot, run).await {
        let _ = storage.abort_snapshot(snapshot).await;
        return Err(e);
    }
    storage.commit_snapshot(snapshot).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use recluster_progress::ProgressOptions;
    use recluster_storage::{InMemoryStorage, RunBuilder};

    fn state(storage: InMemoryStorage) -> Arc<AppState> {
        Arc::new(AppState {
            storage,
            options: ProgressOptions::default(),
            api_key: None,
        })
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn progress_read_failure_is_500_without_snapshot() {
        let storage = InMemoryStorage::from_runs([RunBuilder::new(1).build()]).unwrap();
        storage.inject_read_fault(1).unwrap();

        let response = handle_reclustering_progress(
            State(state(storage)),
            Path("testproject".to_string()),
        )
        .await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(response).await;
        assert_eq!(json["error"], "storage backend error: injected read fault");
        assert!(json.get("progressPerMille").is_none());
    }

    #[tokio::test]
    async fn progress_read_succeeds_after_fault_clears() {
        let storage = InMemoryStorage::from_runs([RunBuilder::new(1).build()]).unwrap();
        storage.inject_read_fault(0).unwrap();
        let state = state(storage);

        let failed =
            handle_reclustering_progress(State(state.clone()), Path("testproject".to_string()))
                .await;
        assert_eq!(failed.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let response =
            handle_reclustering_progress(State(state), Path("testproject".to_string())).await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert!(json.get("progressPerMille").is_some());
    }
}
