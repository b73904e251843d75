//! # Verification Token and QR Payload
//!
//! The token is 32 bytes from the OS CSPRNG, URL-safe base64 without
//! padding (43 characters). The QR payload is a deterministic rendering of
//! the voucher:
//!
//! ```text
//! <number>|<amount>|<partner>|<payment date>|<base>/payment/verify/<token>
//! ```
//!
//! The payload is advisory. Verification always resolves the token against
//! the stored voucher; a forged payload either names an unknown token or
//! fails the fingerprint comparison.

use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::NaiveDate;
use commission_core::money::format_amount;
use commission_core::PartnerId;
use rand::rngs::OsRng;
use rand::RngCore;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Raw token length in bytes.
pub const TOKEN_BYTES: usize = 32;

const VERIFY_PATH: &str = "/payment/verify/";

/// Opaque verification token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VerificationToken(String);

impl VerificationToken {
    /// Mint a fresh token.
    pub fn mint() -> Self {
        let mut bytes = [0u8; TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Self(URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Wrap a token received from outside, e.g. a verification URL.
    pub fn from_string(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VerificationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The fields rendered into a QR payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrPayload<'a> {
    pub number: &'a str,
    pub amount: Decimal,
    pub partner: Option<PartnerId>,
    pub payment_date: Option<NaiveDate>,
    pub base_url: &'a str,
    pub token: &'a VerificationToken,
}

impl QrPayload<'_> {
    /// The verification URL embedded in the payload.
    pub fn verification_url(&self) -> String {
        format!("{}{VERIFY_PATH}{}", self.base_url.trim_end_matches('/'), self.token)
    }

    pub fn render(&self) -> String {
        let partner = self.partner.map(|p| p.to_string()).unwrap_or_default();
        let date = self
            .payment_date
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_default();
        format!(
            "{}|{}|{}|{}|{}",
            self.number,
            format_amount(self.amount),
            partner,
            date,
            self.verification_url()
        )
    }
}

/// Extract the token from a scanned payload or verification URL.
pub fn token_from_payload(payload: &str) -> Option<VerificationToken> {
    let (_, token) = payload.rsplit_once(VERIFY_PATH)?;
    let token = token.trim();
    if token.is_empty() || token.contains(['/', '|', '?']) {
        None
    } else {
        Some(VerificationToken::from_string(token))
    }
}

/// Lowercase hex SHA-256 of `payload`.
pub fn fingerprint(payload: &str) -> String {
    Sha256::digest(payload.as_bytes())
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minted_tokens_are_url_safe_and_unique() {
        let a = VerificationToken::mint();
        let b = VerificationToken::mint();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 43);
        assert!(a
            .as_str()
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn payload_is_deterministic() {
        let token = VerificationToken::from_string("abc");
        let partner = PartnerId::new();
        let payload = QrPayload {
            number: "PV00001",
            amount: Decimal::ONE_HUNDRED,
            partner: Some(partner),
            payment_date: NaiveDate::from_ymd_opt(2026, 10, 18),
            base_url: "https://pay.example.com/",
            token: &token,
        };
        let rendered = payload.render();
        assert_eq!(
            rendered,
            format!("PV00001|100.00|{partner}|2026-10-18|https://pay.example.com/payment/verify/abc")
        );
        assert_eq!(rendered, payload.render());
    }

    #[test]
    fn token_is_recovered_from_payload() {
        let payload = "PV00001|1.00||2026-01-01|https://x/payment/verify/tok_123";
        assert_eq!(token_from_payload(payload), Some(VerificationToken::from_string("tok_123")));
        assert_eq!(token_from_payload("PV00001|1.00"), None);
        assert_eq!(token_from_payload("https://x/payment/verify/"), None);
    }

    #[test]
    fn fingerprint_is_sha256_hex() {
        assert_eq!(
            fingerprint(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
