//! # commission-cli
//!
//! Offline tooling over the calculator and validator. Every subcommand
//! reads one order document, YAML or JSON:
//!
//! ```yaml
//! order:
//!   name: S00042
//!   lines:
//!     - price_unit: "1000.00"
//!   untaxed_total: "1000.00"
//!   currency: AED
//! commission:
//!   slots:
//!     BROKER: { partner: 6f1c…, commission_type: UNTAXED_TOTAL, rate: "3" }
//! ```
//!
//! ## Subcommands
//!
//! - `calc` prints the breakdown of a document.
//! - `validate` lists every allocation violation; exit code 2 when any.
//! - `config-check` loads and validates an engine configuration.
//!
//! Handlers parse arguments and delegate to the domain crates.

pub mod calc;
pub mod config_check;
pub mod validate;

use std::path::Path;

use anyhow::{Context, Result};
use clap::ValueEnum;
use commission_calc::{CommissionInputs, OrderSnapshot};
use commission_core::EngineConfig;
use serde::{Deserialize, Serialize};

/// An order snapshot with its commission inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDocument {
    pub order: OrderSnapshot,
    #[serde(default)]
    pub commission: CommissionInputs,
}

/// Output encoding of command results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Yaml,
}

/// Read an order document; `.json` files are parsed as JSON, anything
/// else as YAML.
pub fn load_document(path: &Path) -> Result<OrderDocument> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading order document: {}", path.display()))?;
    if is_json(path) {
        serde_json::from_str(&content).with_context(|| format!("invalid JSON in {}", path.display()))
    } else {
        serde_yaml::from_str(&content).with_context(|| format!("invalid YAML in {}", path.display()))
    }
}

/// The configuration at `path`, or the defaults when none is given.
pub fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::from_path(path)
            .with_context(|| format!("loading configuration: {}", path.display())),
        None => Ok(EngineConfig::default()),
    }
}

/// Render `value` in a structured format. `None` for [`OutputFormat::Text`].
pub fn render<T: Serialize>(value: &T, format: OutputFormat) -> Result<Option<String>> {
    match format {
        OutputFormat::Text => Ok(None),
        OutputFormat::Json => Ok(Some(serde_json::to_string_pretty(value)?)),
        OutputFormat::Yaml => Ok(Some(serde_yaml::to_string(value)?)),
    }
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}
