use std::path::Path;

use recluster_storage::InMemoryStorage;

use crate::config::ServiceConfig;
use crate::{runs_file, serve};

pub(crate) async fn cmd_serve(
    config_path: Option<&Path>,
    port: Option<u16>,
    runs_path: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = ServiceConfig::load(config_path, port)?;
    let storage = match runs_path {
        Some(path) => {
            let runs = runs_file::load(path)?;
            tracing::info!(runs = runs.len(), path = %path.display(), "seeded run store");
            InMemoryStorage::from_runs(runs)?
        }
        None => InMemoryStorage::new(),
    };
    serve::start_server(config, storage).await
}
