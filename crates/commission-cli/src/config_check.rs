//! # Config Check Subcommand
//!
//! Loads an engine configuration, validates it, and prints the effective
//! settings with every default filled in.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use commission_core::EngineConfig;

use crate::{render, OutputFormat};

/// Arguments for the `commission config-check` subcommand.
#[derive(Args, Debug)]
pub struct ConfigCheckArgs {
    /// Configuration file (YAML, or JSON by extension).
    pub path: PathBuf,

    /// Output format of the effective configuration.
    #[arg(long, value_enum, default_value_t = OutputFormat::Yaml)]
    pub format: OutputFormat,
}

/// Execute the config-check subcommand.
pub fn run_config_check(args: &ConfigCheckArgs) -> Result<u8> {
    let config = EngineConfig::from_path(&args.path)
        .with_context(|| format!("checking configuration: {}", args.path.display()))?;
    match render(&config, args.format)? {
        Some(out) => println!("{out}"),
        None => println!("{}: OK", args.path.display()),
    }
    Ok(0)
}
