mod commands;
mod config;
mod runs_file;
mod serve;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Reclustering progress tracking.
#[derive(Parser)]
#[command(name = "recluster", version, about = "Reclustering progress tracking")]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the reclustering progress HTTP API server
    Serve {
        /// Path to a TOML config file
        #[arg(long)]
        config: Option<PathBuf>,
        /// Port to listen on (overrides config and RECLUSTER_PORT)
        #[arg(long)]
        port: Option<u16>,
        /// Runs JSON file to seed the store with
        #[arg(long)]
        runs: Option<PathBuf>,
    },

    /// Print the reclustering progress of a project
    Progress {
        /// Path to the runs JSON file
        runs_file: PathBuf,
        /// Project to report on
        #[arg(long)]
        project: String,
        /// Algorithms version known to this reader (default: compiled-in version)
        #[arg(long)]
        algorithms_version: Option<i64>,
    },

    /// Create the next reclustering run of a project and assign its shards
    Orchestrate {
        /// Path to the runs JSON file; created if missing
        runs_file: PathBuf,
        /// Project to orchestrate
        #[arg(long)]
        project: String,
        /// Number of shards for the new run
        #[arg(long, value_parser = clap::value_parser!(i64).range(1..))]
        workers: i64,
        /// Length of a reclustering attempt, in minutes
        #[arg(long, default_value = "5", value_parser = clap::value_parser!(i64).range(1..))]
        interval_minutes: i64,
        /// Latest rules version (RFC 3339; default: starting epoch)
        #[arg(long)]
        rules_version: Option<String>,
        /// Latest config version (RFC 3339; default: starting epoch)
        #[arg(long)]
        config_version: Option<String>,
        /// Current time (RFC 3339; default: now)
        #[arg(long)]
        now: Option<String>,
    },

    /// Print the chunk id boundaries that split the keyspace between workers
    Splits {
        /// Number of workers
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        workers: u32,
    },
}

fn main() {
    let cli = Cli::parse();
    let (output, quiet) = (cli.output, cli.quiet);

    let default_level = match cli.command {
        Commands::Serve { .. } => "info",
        _ => "warn",
    };
    init_tracing(default_level);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            report_error(&format!("failed to create tokio runtime: {e}"), output, quiet);
            process::exit(1);
        }
    };

    let result = runtime.block_on(async {
        match cli.command {
            Commands::Serve { config, port, runs } => {
                commands::serve::cmd_serve(config.as_deref(), port, runs.as_deref()).await
            }
            Commands::Progress {
                runs_file,
                project,
                algorithms_version,
            } => {
                commands::progress::cmd_progress(
                    &runs_file,
                    &project,
                    algorithms_version,
                    output,
                    quiet,
                )
                .await
            }
            Commands::Orchestrate {
                runs_file,
                project,
                workers,
                interval_minutes,
                rules_version,
                config_version,
                now,
            } => {
                commands::orchestrate::cmd_orchestrate(
                    commands::orchestrate::OrchestrateOptions {
                        runs_file: &runs_file,
                        project: &project,
                        workers,
                        interval_minutes,
                        rules_version: rules_version.as_deref(),
                        config_version: config_version.as_deref(),
                        now: now.as_deref(),
                    },
                    output,
                    quiet,
                )
                .await
            }
            Commands::Splits { workers } => {
                commands::splits::cmd_splits(workers as usize, output);
                Ok(())
            }
        }
    });

    if let Err(e) = result {
        report_error(&e.to_string(), output, quiet);
        process::exit(1);
    }
}

/// Log to stderr, filtered by `RUST_LOG` or `default_level`.
fn init_tracing(default_level: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub(crate) fn report_error(msg: &str, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => eprintln!("error: {}", msg),
        OutputFormat::Json => eprintln!("{}", serde_json::json!({ "error": msg })),
    }
}
