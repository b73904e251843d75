//! # Validate Subcommand
//!
//! Runs every allocation rule against an order document, including the
//! over-allocation check applied at confirmation.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use commission_calc::{Calculator, Validator};
use commission_core::EngineConfig;
use serde::Serialize;

use crate::{load_document, render, OutputFormat};

/// Arguments for the `commission validate` subcommand.
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Order document (YAML or JSON).
    pub document: PathBuf,

    /// Only check the rules enforced while the bundle is editable.
    #[arg(long)]
    pub hard_only: bool,

    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

/// One reported violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub code: &'static str,
    pub message: String,
    pub deferrable: bool,
}

/// Execute the validate subcommand. Exits 2 when any rule is broken.
pub fn run_validate(args: &ValidateArgs, config: &EngineConfig) -> Result<u8> {
    let doc = load_document(&args.document)?;
    let breakdown = Calculator::from_config(config).calculate(&doc.order, &doc.commission);
    let findings: Vec<Finding> = Validator::from_config(config)
        .violations(&breakdown)
        .into_iter()
        .filter(|v| !args.hard_only || !v.is_deferrable())
        .map(|v| Finding {
            code: v.code(),
            message: v.to_string(),
            deferrable: v.is_deferrable(),
        })
        .collect();

    match render(&findings, args.format)? {
        Some(out) => println!("{out}"),
        None if findings.is_empty() => println!("{}: OK ({})", doc.order.name, breakdown.allocation_status),
        None => {
            for f in &findings {
                println!("{}: {} {}", doc.order.name, f.code, f.message);
            }
        }
    }
    Ok(if findings.is_empty() { 0 } else { 2 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    fn args(content: &str, hard_only: bool) -> (tempfile::NamedTempFile, ValidateArgs) {
        let file = fixtures::write(content, ".yaml");
        let args = ValidateArgs {
            document: file.path().to_path_buf(),
            hard_only,
            format: OutputFormat::Json,
        };
        (file, args)
    }

    #[test]
    fn clean_document_passes() {
        let (_file, args) = args(fixtures::SINGLE_BROKER, false);
        assert_eq!(run_validate(&args, &EngineConfig::default()).unwrap(), 0);
    }

    #[test]
    fn over_allocation_fails_full_validation() {
        let (_file, args) = args(fixtures::OVER_ALLOCATED, false);
        assert_eq!(run_validate(&args, &EngineConfig::default()).unwrap(), 2);
    }

    #[test]
    fn over_allocation_is_deferrable() {
        let (_file, args) = args(fixtures::OVER_ALLOCATED, true);
        assert_eq!(run_validate(&args, &EngineConfig::default()).unwrap(), 0);
    }
}
