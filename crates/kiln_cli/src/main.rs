//! The `kiln` command-line interface.
//!
//! Provides `kiln cache head` to print the configuration snapshot stored with
//! a build graph, `kiln cache check` to tell whether the stored graph is still
//! valid for the current configuration, and `kiln cache clean` to discard it.

#![warn(missing_docs)]

mod cache;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::level_filters::LevelFilter;

/// Kiln, a build tool with a persistent build graph.
#[derive(Parser, Debug)]
#[command(name = "kiln", version, about = "Kiln build tool")]
pub struct Cli {
    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable verbose (debug-level) output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to a custom `kiln.toml` configuration file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// The subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Inspect or discard the cached build graph.
    #[command(subcommand)]
    Cache(CacheCommand),
}

/// Subcommands of `kiln cache`.
#[derive(Subcommand, Debug)]
pub enum CacheCommand {
    /// Print the head metadata of a build graph file.
    Head(HeadArgs),
    /// Check whether the stored build graph matches the current configuration.
    ///
    /// Exits with 0 if it does, 2 if it is stale, and 3 if there is none.
    Check(CheckArgs),
    /// Delete the configured build graph file.
    Clean,
}

/// Arguments for the `kiln cache head` subcommand.
#[derive(Parser, Debug)]
pub struct HeadArgs {
    /// Build graph file. Defaults to the file configured in `kiln.toml`.
    pub file: Option<PathBuf>,

    /// Output format.
    #[arg(short, long, value_enum, default_value_t = ReportFormat::Text)]
    pub format: ReportFormat,
}

/// Arguments for the `kiln cache check` subcommand.
#[derive(Parser, Debug)]
pub struct CheckArgs {
    /// Build graph file. Defaults to the file configured in `kiln.toml`.
    pub file: Option<PathBuf>,
}

/// Output format for reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    /// Human-readable terminal output.
    Text,
    /// Machine-readable JSON output.
    Json,
}

/// Global settings derived from CLI flags.
pub struct GlobalArgs {
    /// Whether to suppress non-error output.
    pub quiet: bool,
    /// Optional path to a custom config file.
    pub config: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.quiet, cli.verbose);

    let global = GlobalArgs {
        quiet: cli.quiet,
        config: cli.config,
    };

    let result = match cli.command {
        Command::Cache(CacheCommand::Head(ref args)) => cache::head(args, &global),
        Command::Cache(CacheCommand::Check(ref args)) => cache::check(args, &global),
        Command::Cache(CacheCommand::Clean) => cache::clean(&global),
    };

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    }
}

/// Installs the log subscriber, writing to stderr.
fn init_logging(quiet: bool, verbose: bool) {
    tracing_subscriber::fmt()
        .with_max_level(log_level(quiet, verbose))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn log_level(quiet: bool, verbose: bool) -> LevelFilter {
    if quiet {
        LevelFilter::ERROR
    } else if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::WARN
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn parse_head_default() {
        let cli = Cli::parse_from(["kiln", "cache", "head"]);
        match cli.command {
            Command::Cache(CacheCommand::Head(ref args)) => {
                assert!(args.file.is_none());
                assert_eq!(args.format, ReportFormat::Text);
            }
            _ => panic!("expected cache head command"),
        }
    }

    #[test]
    fn parse_head_with_file_and_format() {
        let cli = Cli::parse_from(["kiln", "cache", "head", "graph.bin", "--format", "json"]);
        match cli.command {
            Command::Cache(CacheCommand::Head(ref args)) => {
                assert_eq!(args.file.as_deref(), Some(std::path::Path::new("graph.bin")));
                assert_eq!(args.format, ReportFormat::Json);
            }
            _ => panic!("expected cache head command"),
        }
    }

    #[test]
    fn parse_check_with_config() {
        let cli = Cli::parse_from(["kiln", "cache", "check", "--config", "app/kiln.toml"]);
        assert_eq!(cli.config, Some(PathBuf::from("app/kiln.toml")));
        match cli.command {
            Command::Cache(CacheCommand::Check(ref args)) => assert!(args.file.is_none()),
            _ => panic!("expected cache check command"),
        }
    }

    #[test]
    fn parse_clean() {
        let cli = Cli::parse_from(["kiln", "--quiet", "cache", "clean"]);
        assert!(cli.quiet);
        assert!(matches!(cli.command, Command::Cache(CacheCommand::Clean)));
    }

    #[test]
    fn missing_subcommand_is_rejected() {
        assert!(Cli::try_parse_from(["kiln", "cache"]).is_err());
        assert!(Cli::try_parse_from(["kiln", "cache", "head", "--format", "yaml"]).is_err());
    }

    #[test]
    fn log_levels() {
        assert_eq!(log_level(false, false), LevelFilter::WARN);
        assert_eq!(log_level(false, true), LevelFilter::DEBUG);
        assert_eq!(log_level(true, true), LevelFilter::ERROR);
    }
}
