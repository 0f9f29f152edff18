use std::path::Path;

use recluster_core::{format_rfc3339, validate_project, RunTargets, ALGORITHMS_VERSION};
use recluster_progress::{read_reclustering_progress, ProgressOptions, ReclusteringProgress};
use recluster_storage::InMemoryStorage;

use crate::{runs_file, OutputFormat};

pub(crate) async fn cmd_progress(
    runs_path: &Path,
    project: &str,
    algorithms_version: Option<i64>,
    output: OutputFormat,
    quiet: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    validate_project(project)?;
    let storage = InMemoryStorage::from_runs(runs_file::load(runs_path)?)?;
    let options = ProgressOptions {
        algorithms_version: algorithms_version.unwrap_or(ALGORITHMS_VERSION),
        ..ProgressOptions::default()
    };
    let progress = read_reclustering_progress(&storage, project, &options).await?;

    match output {
        OutputFormat::Json => {
            let report = serde_json::json!({
                "project": project,
                "progress": progress,
                "isReclusteringToNewAlgorithms": progress.is_reclustering_to_new_algorithms(),
                "isReclusteringToNewConfig": progress.is_reclustering_to_new_config(),
                "progressToLatestAlgorithmsVersion": progress.progress_to_latest_algorithms_version(),
                "progressToLatestConfigVersion": progress.progress_to_latest_config_version(),
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Text => print_text(project, &progress, quiet)?,
    }
    Ok(())
}

fn print_text(
    project: &str,
    progress: &ReclusteringProgress,
    quiet: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}: {}/1000", project, progress.progress_per_mille);
    if quiet {
        return Ok(());
    }
    println!("  reclustering to: {}", describe(&progress.next)?);
    println!("  last complete:   {}", describe(&progress.last)?);
    println!(
        "  algorithms: latest {}, {}",
        progress.latest_algorithms_version,
        status(
            progress.is_reclustering_to_new_algorithms(),
            progress.progress_to_latest_algorithms_version()
        )
    );
    println!(
        "  config:     latest {}, {}",
        format_rfc3339(progress.latest_config_version)?,
        status(
            progress.is_reclustering_to_new_config(),
            progress.progress_to_latest_config_version()
        )
    );
    Ok(())
}

fn describe(targets: &RunTargets) -> Result<String, Box<dyn std::error::Error>> {
    Ok(format!(
        "rules {}, config {}, algorithms {}",
        format_rfc3339(targets.rules_version)?,
        format_rfc3339(targets.config_version)?,
        targets.algorithms_version
    ))
}

fn status(reclustering: bool, per_mille: i64) -> String {
    if reclustering {
        format!("reclustering ({}/1000)", per_mille)
    } else {
        "up to date".to_string()
    }
}
