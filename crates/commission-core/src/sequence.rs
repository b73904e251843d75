//! # Monotonic Sequences
//!
//! Two sequences are shared across the engine: the commission number
//! (allocated on first confirm) and the voucher number (allocated at
//! voucher creation, one counter per `PV`/`RV` prefix). The atomic
//! next-value operation is the only serialisation point; no application
//! level lock is taken.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use rand::Rng;

use crate::error::CommissionError;

/// Atomic next-value source keyed by sequence code.
pub trait SequenceAllocator: Send + Sync {
    /// Allocate the next value of sequence `code`. Values start at 1 and
    /// are never reused.
    fn next_value(&self, code: &str) -> Result<u64, CommissionError>;
}

/// In-process sequences backed by atomic counters.
#[derive(Debug, Default)]
pub struct AtomicSequences {
    counters: DashMap<String, AtomicU64>,
}

impl AtomicSequences {
    /// Create an empty set of sequences.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume sequence `code` so the next allocation returns `last + 1`.
    ///
    /// Used when hydrating from a persisted store; never moves a counter
    /// backwards.
    pub fn resume(&self, code: &str, last: u64) {
        let entry = self
            .counters
            .entry(code.to_string())
            .or_insert_with(|| AtomicU64::new(0));
        entry.fetch_max(last, Ordering::SeqCst);
    }

    /// The last value handed out for `code`, if any.
    pub fn current(&self, code: &str) -> Option<u64> {
        self.counters
            .get(code)
            .map(|c| c.load(Ordering::SeqCst))
            .filter(|v| *v > 0)
    }
}

impl SequenceAllocator for AtomicSequences {
    fn next_value(&self, code: &str) -> Result<u64, CommissionError> {
        if let Some(counter) = self.counters.get(code) {
            return bump(&counter, code);
        }
        let counter = self
            .counters
            .entry(code.to_string())
            .or_insert_with(|| AtomicU64::new(0));
        bump(&counter, code)
    }
}

fn bump(counter: &AtomicU64, code: &str) -> Result<u64, CommissionError> {
    let previous = counter.fetch_add(1, Ordering::SeqCst);
    previous
        .checked_add(1)
        .ok_or_else(|| CommissionError::Integrity(format!("sequence {code} exhausted")))
}

/// Allocate from `allocator`, retrying an integrity failure exactly once
/// after a short random delay.
pub fn next_with_retry(
    allocator: &dyn SequenceAllocator,
    code: &str,
) -> Result<u64, CommissionError> {
    match allocator.next_value(code) {
        Err(err) if err.is_retryable() => {
            let jitter = Duration::from_millis(rand::thread_rng().gen_range(5..=25));
            tracing::warn!(sequence = code, error = %err, "sequence allocation failed, retrying in {jitter:?}");
            std::thread::sleep(jitter);
            allocator.next_value(code)
        }
        other => other,
    }
}

/// Rendering of a sequence value as `<prefix><zero-padded number>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceFormat {
    /// Leading text, e.g. `PV` or `COMM`.
    pub prefix: String,
    /// Minimum digit count.
    pub padding: usize,
}

impl SequenceFormat {
    /// A format with the given prefix and padding.
    pub fn new(prefix: impl Into<String>, padding: usize) -> Self {
        Self {
            prefix: prefix.into(),
            padding,
        }
    }

    /// Render `value`.
    pub fn render(&self, value: u64) -> String {
        format!("{}{:0width$}", self.prefix, value, width = self.padding)
    }
}
