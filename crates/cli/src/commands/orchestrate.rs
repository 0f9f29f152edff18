use std::path::Path;

use recluster_core::{parse_rfc3339, validate_project, RunTargets, ALGORITHMS_VERSION, STARTING_EPOCH};
use recluster_progress::orchestrate::attempt_window;
use recluster_progress::orchestrate_project;
use recluster_storage::InMemoryStorage;
use time::OffsetDateTime;

use crate::{runs_file, OutputFormat};

pub(crate) struct OrchestrateOptions<'a> {
    pub(crate) runs_file: &'a Path,
    pub(crate) project: &'a str,
    pub(crate) workers: i64,
    pub(crate) interval_minutes: i64,
    pub(crate) rules_version: Option<&'a str>,
    pub(crate) config_version: Option<&'a str>,
    pub(crate) now: Option<&'a str>,
}

pub(crate) async fn cmd_orchestrate(
    opts: OrchestrateOptions<'_>,
    output: OutputFormat,
    quiet: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    validate_project(opts.project)?;
    let now = match opts.now {
        Some(s) => parse_rfc3339(s)?,
        None => OffsetDateTime::now_utc(),
    };
    let latest = RunTargets {
        rules_version: parse_or_epoch(opts.rules_version)?,
        config_version: parse_or_epoch(opts.config_version)?,
        algorithms_version: ALGORITHMS_VERSION,
    };

    let Some(window) = attempt_window(now, opts.interval_minutes) else {
        if !quiet {
            eprintln!(
                "not on a {}-minute interval boundary; no run created",
                opts.interval_minutes
            );
        }
        return Ok(());
    };

    let storage = InMemoryStorage::from_runs(runs_file::load_or_empty(opts.runs_file)?)?;
    let orchestration =
        orchestrate_project(&storage, opts.project, window, opts.workers, latest).await?;
    runs_file::save(opts.runs_file, &storage.runs()?)?;

    match output {
        OutputFormat::Json => {
            let report = serde_json::json!({
                "run": orchestration.run,
                "previous_progress": orchestration.previous_progress,
                "assignments": orchestration.assignments,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Text => {
            if !quiet {
                println!(
                    "created run for {} (previous run at {}/1000)",
                    opts.project, orchestration.previous_progress
                );
            }
            for task in &orchestration.assignments {
                println!(
                    "{} {} {}",
                    task.title(),
                    if task.start_chunk_id.is_empty() {
                        "-"
                    } else {
                        task.start_chunk_id.as_str()
                    },
                    task.end_chunk_id
                );
            }
        }
    }
    Ok(())
}

fn parse_or_epoch(value: Option<&str>) -> Result<OffsetDateTime, Box<dyn std::error::Error>> {
    Ok(match value {
        Some(s) => parse_rfc3339(s)?,
        None => STARTING_EPOCH,
    })
}
