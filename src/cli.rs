// src/cli.rs

//! CLI argument parsing using `clap`, plus the entry point embedding
//! binaries call with their registered project.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::error;

use crate::config::{loader, Config};
use crate::errors::{Result, TaskdagError};
use crate::fs::{FileSystem, RealFileSystem};
use crate::session::Session;
use crate::task::Project;
use crate::types::ExitCode;

/// Command-line arguments for a `taskdag`-embedding binary.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "taskdag",
    version,
    about = "Incremental task-graph build runner.",
    long_about = None
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Path to the config file (TOML).
    #[arg(long, value_name = "PATH", default_value = "Taskdag.toml")]
    pub config: String,

    /// Restrict collection to these root paths.
    #[arg(long = "paths", value_name = "PATH", num_args = 1..)]
    pub paths: Vec<PathBuf>,

    /// Keyword selector over task ids; a leading `not` negates.
    #[arg(short = 'k', value_name = "EXPR")]
    pub keyword: Option<String>,

    /// Marker selector; a leading `not` negates.
    #[arg(short = 'm', value_name = "EXPR")]
    pub marker: Option<String>,

    /// Additional ignore globs for collection.
    #[arg(long = "ignore", value_name = "GLOB")]
    pub ignore: Vec<String>,

    /// Parallelism degree.
    #[arg(short = 'n', long = "workers", value_name = "P")]
    pub workers: Option<usize>,

    /// Stop scheduling after this many failed tasks.
    #[arg(long, value_name = "N")]
    pub max_failures: Option<usize>,

    #[arg(short, long)]
    pub verbose: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `TASKDAG_LOG` or the default level is used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Write the machine-readable run report (JSON) to this path.
    #[arg(long, value_name = "PATH")]
    pub report: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Run out-of-date tasks (the default).
    Build,
    /// Collect and resolve, printing task ids without executing.
    Collect,
    /// Drop state records of tasks that no longer exist.
    Clean,
    /// List known markers.
    Markers,
    /// Print the resolved DAG grouped by execution wave.
    Dag,
    /// Print last recorded task durations.
    Profile,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

/// Merge defaults, the optional config file, and CLI overrides.
pub fn merge_config(args: &CliArgs) -> Result<Config> {
    let fs = RealFileSystem;
    let mut cfg = Config::default();
    if let Some(raw) = loader::load_optional(&fs, &args.config)? {
        cfg.apply_file(&raw);
    }

    if !args.paths.is_empty() {
        cfg.roots = args.paths.clone();
    }
    cfg.ignore_globs.extend(args.ignore.iter().cloned());
    if let Some(expr) = &args.keyword {
        cfg.keyword_expr = Some(expr.clone());
    }
    if let Some(expr) = &args.marker {
        cfg.marker_expr = Some(expr.clone());
    }
    if let Some(workers) = args.workers {
        cfg.workers = workers;
    }
    if let Some(max_failures) = args.max_failures {
        cfg.max_failures = Some(max_failures);
    }
    if args.verbose {
        cfg.verbose = true;
    }
    Ok(cfg)
}

/// Run the project under the parsed arguments; returns the process exit
/// code per the reporting table.
pub async fn run_cli(project: Project, args: CliArgs) -> i32 {
    let level = args
        .log_level
        .or(if args.verbose { Some(LogLevel::Debug) } else { None });
    let _ = crate::logging::init_logging(level);

    let config = match merge_config(&args) {
        Ok(config) => config,
        Err(error) => {
            error!(%error, "configuration is invalid");
            return ExitCode::ConfigurationFailed.code();
        }
    };

    let session = match Session::new(project, config) {
        Ok(session) => session,
        Err(error) => {
            error!(%error, "configuration is invalid");
            return ExitCode::ConfigurationFailed.code();
        }
    };

    match args.command.unwrap_or(Command::Build) {
        Command::Build => {
            let run = session.build().await;
            if let Some(path) = &args.report {
                let text = serde_json::to_string_pretty(&run.to_json())
                    .unwrap_or_else(|_| "{}".to_string());
                if let Err(error) = RealFileSystem.write(path, text.as_bytes()) {
                    error!(%error, path = %path.display(), "writing run report failed");
                }
            }
            run.exit.code()
        }
        Command::Collect => {
            let (run, ids) = session.collect_only();
            for id in ids {
                println!("{id}");
            }
            run.exit.code()
        }
        Command::Clean => match session.clean() {
            Ok(dropped) => {
                for id in dropped {
                    println!("dropped {id}");
                }
                ExitCode::Ok.code()
            }
            Err(error) => {
                error!(%error, "clean failed");
                exit_code_for(&error).code()
            }
        },
        Command::Markers => {
            for (name, description) in session.markers() {
                println!("{name}: {description}");
            }
            ExitCode::Ok.code()
        }
        Command::Dag => match session.dag_text() {
            Ok(text) => {
                print!("{text}");
                ExitCode::Ok.code()
            }
            Err(error) => {
                error!(%error, "dag rendering failed");
                exit_code_for(&error).code()
            }
        },
        Command::Profile => {
            for (id, duration) in session.profile() {
                println!("{duration:>10.3}s  {id}");
            }
            ExitCode::Ok.code()
        }
    }
}

fn exit_code_for(error: &TaskdagError) -> ExitCode {
    match error {
        TaskdagError::Configuration(_) => ExitCode::ConfigurationFailed,
        TaskdagError::Collection(_) | TaskdagError::NodeNotCollected(_) => {
            ExitCode::CollectionFailed
        }
        TaskdagError::ResolvingDependencies(_) => ExitCode::ResolutionFailed,
        _ => ExitCode::Failed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse_without_a_subcommand() {
        let args = CliArgs::parse_from(["taskdag"]);
        assert!(args.command.is_none());
        assert_eq!(args.config, "Taskdag.toml");
        assert!(args.workers.is_none());
    }

    #[test]
    fn flags_map_onto_the_config() {
        let args = CliArgs::parse_from([
            "taskdag",
            "-n",
            "4",
            "-k",
            "report",
            "--ignore",
            "**/old/**",
            "--max-failures",
            "1",
        ]);
        let cfg = merge_config(&args).unwrap();
        assert_eq!(cfg.workers, 4);
        assert_eq!(cfg.keyword_expr.as_deref(), Some("report"));
        assert_eq!(cfg.ignore_globs, vec!["**/old/**".to_string()]);
        assert_eq!(cfg.max_failures, Some(1));
    }

    #[test]
    fn subcommands_parse() {
        let args = CliArgs::parse_from(["taskdag", "markers"]);
        assert_eq!(args.command, Some(Command::Markers));
        let args = CliArgs::parse_from(["taskdag", "dag"]);
        assert_eq!(args.command, Some(Command::Dag));
    }
}
