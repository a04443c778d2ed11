//! Stampt CLI - inspect and validate stampgc layout artifacts.
//!
//! The layout tool emits one JSON artifact per build describing every
//! heap-allocatable class. Stampt rebuilds the collector's tables from such
//! an artifact so numbering, layouts and dispatch entries can be checked
//! and queried without starting the runtime.

mod commands;
mod config;
mod error;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::common::OutputFormat;
use commands::{
    run_check, run_classify, run_dump, run_export, run_is_a, CheckArgs, ClassifyArgs, DumpArgs,
    ExportArgs, IsAArgs,
};
use config::Config;
use error::StamptError;

/// Stampt - type stamp and GC metadata inspector
#[derive(Parser, Debug)]
#[command(name = "stampt")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Inspect and validate stampgc layout artifacts", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true, env = "STAMPT_VERBOSE")]
    verbose: bool,

    /// Path to configuration file
    #[arg(short, long, global = true, env = "STAMPT_CONFIG")]
    config: Option<PathBuf>,

    /// Disable color output
    #[arg(long, global = true, env = "STAMPT_NO_COLOR")]
    no_color: bool,

    /// Output format (default: from config)
    #[arg(short = 'F', long, global = true, value_enum)]
    format: Option<OutputFormat>,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands for the stampt CLI.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Rebuild every table from an artifact and report a summary
    ///
    /// Fails with the same error the runtime would raise at startup when
    /// numbering, layouts or dispatch entries are inconsistent.
    Check(CheckCommand),

    /// Print the numbering, scan and dispatch tables of an artifact
    Dump(DumpCommand),

    /// Decode a stamp (or class name) into its class and ancestry
    Classify(ClassifyCommand),

    /// Evaluate the runtime type test `class is-a target`
    IsA(IsACommand),

    /// Write the standard hierarchy as a layout artifact
    Export(ExportCommand),
}

/// Arguments for the check subcommand.
#[derive(Parser, Debug)]
struct CheckCommand {
    /// Layout artifact to check
    artifact: PathBuf,

    /// Fail unless the artifact was produced by this build
    #[arg(long)]
    expect_build_id: Option<String>,
}

/// Arguments for the dump subcommand.
#[derive(Parser, Debug)]
struct DumpCommand {
    /// Layout artifact to dump
    artifact: PathBuf,

    /// Only dump this class (name or stamp)
    #[arg(long)]
    class: Option<String>,
}

/// Arguments for the classify subcommand.
#[derive(Parser, Debug)]
struct ClassifyCommand {
    /// Layout artifact
    artifact: PathBuf,

    /// Stamp (`12` or `#12`) or class name
    class: String,
}

/// Arguments for the is-a subcommand.
#[derive(Parser, Debug)]
struct IsACommand {
    /// Layout artifact
    artifact: PathBuf,

    /// Class under test (name or stamp)
    class: String,

    /// Class tested against (name or stamp)
    target: String,
}

/// Arguments for the export subcommand.
#[derive(Parser, Debug)]
struct ExportCommand {
    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Build id recorded in the artifact
    #[arg(long, default_value = "standard")]
    build_id: String,

    /// Overwrite an existing output file
    #[arg(short, long)]
    force: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.no_color)?;

    let config = load_config(cli.config.as_deref())
        .with_context(|| match &cli.config {
            Some(path) => format!("loading {}", path.display()),
            None => "loading stampt.toml".to_string(),
        })?;

    let format = cli.format.unwrap_or(config.output.format);
    execute_command(cli.command, cli.verbose, format, &config)?;
    Ok(())
}

/// Initialize the logging system.
///
/// `RUST_LOG` overrides the level chosen by `--verbose`. Events from the
/// metadata layer arrive through the `log` bridge.
fn init_logging(verbose: bool, no_color: bool) -> Result<(), StamptError> {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let subscriber = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(!no_color)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false);

    tracing_subscriber::registry()
        .with(filter)
        .with(subscriber)
        .try_init()
        .map_err(|e| StamptError::Config(format!("Failed to initialize logging: {}", e)))?;

    Ok(())
}

fn load_config(config_path: Option<&std::path::Path>) -> Result<Config, StamptError> {
    match config_path {
        Some(path) => Config::load_from_path(path),
        None => Config::load(),
    }
}

fn execute_command(
    command: Commands,
    verbose: bool,
    format: OutputFormat,
    config: &Config,
) -> Result<(), StamptError> {
    match command {
        Commands::Check(args) => run_check(
            CheckArgs {
                artifact: args.artifact,
                expect_build_id: args.expect_build_id,
                format,
                verbose,
            },
            config,
        ),
        Commands::Dump(args) => run_dump(
            DumpArgs {
                artifact: args.artifact,
                class: args.class,
                format,
            },
            config,
        ),
        Commands::Classify(args) => run_classify(
            ClassifyArgs {
                artifact: args.artifact,
                class: args.class,
                format,
            },
            config,
        ),
        Commands::IsA(args) => run_is_a(
            IsAArgs {
                artifact: args.artifact,
                class: args.class,
                target: args.target,
                format,
            },
            config,
        ),
        Commands::Export(args) => run_export(
            ExportArgs {
                output: args.output,
                build_id: args.build_id,
                force: args.force,
            },
            config,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_check() {
        let cli = Cli::parse_from(["stampt", "check", "layout.json"]);
        if let Commands::Check(args) = cli.command {
            assert_eq!(args.artifact, PathBuf::from("layout.json"));
            assert!(args.expect_build_id.is_none());
        } else {
            panic!("Expected Check command");
        }
    }

    #[test]
    fn test_cli_parse_check_with_build_id() {
        let cli = Cli::parse_from(["stampt", "check", "layout.json", "--expect-build-id", "b42"]);
        if let Commands::Check(args) = cli.command {
            assert_eq!(args.expect_build_id, Some("b42".to_string()));
        } else {
            panic!("Expected Check command");
        }
    }

    #[test]
    fn test_cli_parse_dump_with_class() {
        let cli = Cli::parse_from(["stampt", "dump", "layout.json", "--class", "Cons"]);
        if let Commands::Dump(args) = cli.command {
            assert_eq!(args.class, Some("Cons".to_string()));
        } else {
            panic!("Expected Dump command");
        }
    }

    #[test]
    fn test_cli_parse_classify() {
        let cli = Cli::parse_from(["stampt", "classify", "layout.json", "#7"]);
        if let Commands::Classify(args) = cli.command {
            assert_eq!(args.class, "#7");
        } else {
            panic!("Expected Classify command");
        }
    }

    #[test]
    fn test_cli_parse_is_a() {
        let cli = Cli::parse_from(["stampt", "is-a", "layout.json", "Vector", "Sequence"]);
        if let Commands::IsA(args) = cli.command {
            assert_eq!(args.class, "Vector");
            assert_eq!(args.target, "Sequence");
        } else {
            panic!("Expected IsA command");
        }
    }

    #[test]
    fn test_cli_parse_export_defaults() {
        let cli = Cli::parse_from(["stampt", "export"]);
        if let Commands::Export(args) = cli.command {
            assert!(args.output.is_none());
            assert_eq!(args.build_id, "standard");
            assert!(!args.force);
        } else {
            panic!("Expected Export command");
        }
    }

    #[test]
    fn test_cli_parse_global_format() {
        let cli = Cli::parse_from(["stampt", "dump", "layout.json", "--format", "json"]);
        assert_eq!(cli.format, Some(OutputFormat::Json));
    }

    #[test]
    fn test_cli_parse_global_verbose() {
        let cli = Cli::parse_from(["stampt", "-v", "check", "layout.json"]);
        assert!(cli.verbose);
    }

    #[test]
    fn test_cli_requires_artifact() {
        assert!(Cli::try_parse_from(["stampt", "check"]).is_err());
    }
}
