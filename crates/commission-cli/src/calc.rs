//! # Calc Subcommand
//!
//! Computes the breakdown of an order document without touching any state.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use commission_calc::{Calculator, CommissionBreakdown, Validator};
use commission_core::EngineConfig;

use crate::{load_document, render, OutputFormat};

/// Arguments for the `commission calc` subcommand.
#[derive(Args, Debug)]
pub struct CalcArgs {
    /// Order document (YAML or JSON).
    pub document: PathBuf,

    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

/// Execute the calc subcommand.
///
/// Exits 1 when the inputs break a hard rule, since such a bundle could
/// never be stored.
pub fn run_calc(args: &CalcArgs, config: &EngineConfig) -> Result<u8> {
    let doc = load_document(&args.document)?;
    let breakdown = Calculator::from_config(config).calculate(&doc.order, &doc.commission);
    tracing::debug!(order = %doc.order.name, slots = breakdown.slots.len(), "calculated");

    match render(&breakdown, args.format)? {
        Some(out) => println!("{out}"),
        None => print!("{}", text_report(&doc.order.name, &breakdown)),
    }

    match Validator::from_config(config).validate_hard(&breakdown) {
        Ok(()) => Ok(0),
        Err(violations) => {
            for message in violations.messages() {
                tracing::error!("{message}");
            }
            Ok(1)
        }
    }
}

/// Plain-text table of a breakdown.
pub fn text_report(name: &str, b: &CommissionBreakdown) -> String {
    let mut out = format!("{name}: untaxed {:.2}\n", b.untaxed_total);
    for entry in &b.slots {
        let rate = entry
            .rate
            .map_or_else(|| "-".to_string(), |r| format!("{}%", r.normalize()));
        out.push_str(&format!(
            "  {:<16} {:<14} {:>8} {:>12.2}\n",
            entry.slot.label(),
            entry.commission_type,
            rate,
            entry.amount
        ));
    }
    out.push_str(&format!("  external {:.2}  internal {:.2}\n", b.total_external, b.total_internal));
    out.push_str(&format!(
        "  total {:.2} ({:.2}%)  company share {:.2}  {}\n",
        b.total_commission, b.commission_percentage, b.company_share, b.allocation_status
    ));
    out
}
