//! # Temporal Types — UTC-Only Timestamps
//!
//! Defines `Timestamp`, a UTC-only instant truncated to microseconds.
//! Non-UTC inputs are **rejected at construction** by [`Timestamp::parse`].
//!
//! Append-only histories (workflow history, commission transitions) require
//! strictly increasing timestamps even when several transitions land in the
//! same microsecond; [`Timestamp::strictly_after`] provides that successor.

use chrono::{DateTime, Duration, NaiveDate, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CommissionError;

/// A UTC-only timestamp with microsecond precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// The current UTC time, truncated to microseconds.
    pub fn now() -> Self {
        Self(Utc::now().trunc_subsecs(6))
    }

    /// From a `DateTime<Utc>`, truncating below microseconds.
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(dt.trunc_subsecs(6))
    }

    /// Parse an RFC 3339 string. Only the `Z` suffix is accepted.
    pub fn parse(s: &str) -> Result<Self, CommissionError> {
        if !s.ends_with('Z') {
            return Err(CommissionError::validation(
                "timestamp parse",
                s,
                vec!["timestamp must use Z suffix (UTC only)".to_string()],
            ));
        }
        let dt = DateTime::parse_from_rfc3339(s).map_err(|e| {
            CommissionError::validation(
                "timestamp parse",
                s,
                vec![format!("invalid RFC 3339 timestamp: {e}")],
            )
        })?;
        Ok(Self::from_utc(dt.with_timezone(&Utc)))
    }

    /// The current time, or one microsecond after `previous` if the clock
    /// has not advanced past it.
    pub fn strictly_after(previous: Option<Timestamp>) -> Self {
        let now = Self::now();
        match previous {
            Some(prev) if now <= prev => Self(prev.0 + Duration::microseconds(1)),
            _ => now,
        }
    }

    /// Access the inner `DateTime<Utc>`.
    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// The calendar date (UTC).
    pub fn date(&self) -> NaiveDate {
        self.0.date_naive()
    }

    /// Render as RFC 3339 with microseconds and `Z` suffix.
    pub fn to_rfc3339(&self) -> String {
        self.0.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_rfc3339())
    }
}
