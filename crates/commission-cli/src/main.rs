//! # commission CLI entry point
//!
//! Parses command-line arguments, installs logging, loads the engine
//! configuration, and dispatches to the subcommand handlers.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commission_cli::calc::{run_calc, CalcArgs};
use commission_cli::config_check::{run_config_check, ConfigCheckArgs};
use commission_cli::load_config;
use commission_cli::validate::{run_validate, ValidateArgs};

/// Commission engine tooling.
///
/// Calculates and validates commission bundles over order snapshots and
/// checks engine configuration files.
#[derive(Parser, Debug)]
#[command(name = "commission", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Engine configuration file (YAML, or JSON by extension).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compute the commission breakdown of an order document.
    Calc(CalcArgs),

    /// Check an order document against every allocation rule.
    Validate(ValidateArgs),

    /// Load and validate an engine configuration file.
    ConfigCheck(ConfigCheckArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Calc(args) => load_config(cli.config.as_deref()).and_then(|config| run_calc(&args, &config)),
        Commands::Validate(args) => {
            load_config(cli.config.as_deref()).and_then(|config| run_validate(&args, &config))
        }
        Commands::ConfigCheck(args) => run_config_check(&args),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_calc_with_format() {
        let cli = Cli::try_parse_from(["commission", "calc", "order.yaml", "--format", "json"]).unwrap();
        let Commands::Calc(args) = cli.command else {
            panic!("expected calc");
        };
        assert_eq!(args.document, PathBuf::from("order.yaml"));
        assert_eq!(args.format, commission_cli::OutputFormat::Json);
    }

    #[test]
    fn parse_validate_hard_only_with_global_flags() {
        let cli = Cli::try_parse_from([
            "commission",
            "-vv",
            "validate",
            "--hard-only",
            "order.json",
            "--config",
            "engine.yaml",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.config, Some(PathBuf::from("engine.yaml")));
        let Commands::Validate(args) = cli.command else {
            panic!("expected validate");
        };
        assert!(args.hard_only);
    }

    #[test]
    fn parse_config_check() {
        let cli = Cli::try_parse_from(["commission", "config-check", "engine.yaml"]).unwrap();
        assert!(matches!(cli.command, Commands::ConfigCheck(_)));
    }

    #[test]
    fn document_is_required() {
        assert!(Cli::try_parse_from(["commission", "calc"]).is_err());
    }
}
