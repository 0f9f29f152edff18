//! Runs JSON files: a JSON array of reclustering runs, as stored.

use std::path::Path;

use recluster_storage::ReclusteringRun;

/// Read a runs file.
pub(crate) fn load(path: &Path) -> Result<Vec<ReclusteringRun>, Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("error reading runs file '{}': {}", path.display(), e))?;
    let runs = serde_json::from_str(&text)
        .map_err(|e| format!("error parsing runs file '{}': {}", path.display(), e))?;
    Ok(runs)
}

/// Read a runs file, treating a missing file as having no runs.
pub(crate) fn load_or_empty(
    path: &Path,
) -> Result<Vec<ReclusteringRun>, Box<dyn std::error::Error>> {
    if path.exists() {
        load(path)
    } else {
        Ok(Vec::new())
    }
}

pub(crate) fn save(path: &Path, runs: &[ReclusteringRun]) -> Result<(), Box<dyn std::error::Error>> {
    let text = serde_json::to_string_pretty(runs)?;
    std::fs::write(path, text + "\n")
        .map_err(|e| format!("error writing runs file '{}': {}", path.display(), e))?;
    Ok(())
}
