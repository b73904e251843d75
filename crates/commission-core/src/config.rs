//! # Engine Configuration
//!
//! Recognised settings for the calculator, lifecycle controller, payout
//! materialiser and voucher workflow. Every field has a default, so an
//! empty YAML document is a valid configuration.
//!
//! ```yaml
//! internal_base_mode: COMPANY_SHARE_AFTER_EXTERNAL
//! strict_single_order_line: false
//! calc_tolerance: "0.01"
//! auto_calculate_on_confirm: true
//! require_posted_invoices_for_payout: true
//! ```

use std::path::Path;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::money::default_tolerance;

/// Which base internal `UNTAXED_TOTAL` slots are computed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InternalBaseMode {
    /// The order's untaxed total.
    #[default]
    OrderTotal,
    /// `max(untaxed_total - total_external, 0)`.
    CompanyShareAfterExternal,
}

/// Errors raised while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid YAML configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid JSON configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid configuration:\n- {}", .0.join("\n- "))]
    Invalid(Vec<String>),
}

/// Engine-wide settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Base for internal `UNTAXED_TOTAL` slots.
    pub internal_base_mode: InternalBaseMode,
    /// Reject orders with more than one line and use the first line's unit
    /// price as the price-unit base.
    pub strict_single_order_line: bool,
    /// Rounding tolerance ε.
    pub calc_tolerance: Decimal,
    /// Run `calc` when the host confirms the order.
    pub auto_calculate_on_confirm: bool,
    /// Gate `pay` on posted and fully invoiced customer invoices.
    pub require_posted_invoices_for_payout: bool,
    /// Legacy: clamp the published total of a CALCULATED bundle to the
    /// untaxed total. Never applied at confirm.
    pub clamp_over_allocation: bool,
    /// Prefix of the commission sequence.
    pub commission_sequence_prefix: String,
    /// Zero padding of sequence numbers.
    pub sequence_padding: usize,
    /// Base of voucher verification URLs.
    pub verification_base_url: String,
    /// Name of the synthetic service product used on payout lines.
    pub commission_service_name: String,
    /// Accept voucher payment dates in the past at submit.
    pub allow_past_payment_date: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            internal_base_mode: InternalBaseMode::OrderTotal,
            strict_single_order_line: true,
            calc_tolerance: default_tolerance(),
            auto_calculate_on_confirm: true,
            require_posted_invoices_for_payout: true,
            clamp_over_allocation: false,
            commission_sequence_prefix: "COMM".to_string(),
            sequence_padding: 5,
            verification_base_url: "https://localhost".to_string(),
            commission_service_name: "Commission Service".to_string(),
            allow_past_payment_date: false,
        }
    }
}

impl EngineConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a file; `.json` is parsed as JSON, anything else as YAML.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json_str(&content)
        } else {
            Self::from_yaml_str(&content)
        }
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();
        if self.calc_tolerance.is_sign_negative() {
            problems.push(format!(
                "calc_tolerance must not be negative (got {})",
                self.calc_tolerance
            ));
        }
        if self.sequence_padding < 5 {
            problems.push(format!(
                "sequence_padding must be at least 5 (got {})",
                self.sequence_padding
            ));
        }
        if self.commission_sequence_prefix.trim().is_empty() {
            problems.push("commission_sequence_prefix must not be empty".to_string());
        }
        if self.verification_base_url.trim().is_empty() {
            problems.push("verification_base_url must not be empty".to_string());
        }
        if self.commission_service_name.trim().is_empty() {
            problems.push("commission_service_name must not be empty".to_string());
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems))
        }
    }
}
