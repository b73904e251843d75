//! # Audit Log
//!
//! Every successful transition of a commission, payout or voucher writes
//! exactly one [`AuditEntry`]. Failed transitions write nothing. The
//! transport is pluggable through [`AuditSink`]; [`InMemoryAuditLog`] keeps
//! an append-only vector.

use std::fmt;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::capability::Actor;
use crate::error::CommissionError;
use crate::identity::UserId;
use crate::temporal::Timestamp;

/// The kind of object an entry is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditObject {
    Commission,
    Payout,
    Voucher,
}

impl fmt::Display for AuditObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Commission => "commission",
            Self::Payout => "payout",
            Self::Voucher => "voucher",
        })
    }
}

/// One audit line: who moved what from where to where, and when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub at: Timestamp,
    pub kind: AuditObject,
    /// Display reference of the object (order name, payout name, voucher number).
    pub object: String,
    /// The operation, e.g. `confirm` or `mark_paid`.
    pub transition: String,
    pub from: String,
    pub to: String,
    pub actor: UserId,
    pub actor_name: String,
    pub note: Option<String>,
}

impl AuditEntry {
    pub fn new(
        kind: AuditObject,
        object: impl Into<String>,
        transition: impl Into<String>,
        from: impl fmt::Display,
        to: impl fmt::Display,
        actor: &Actor,
    ) -> Self {
        Self {
            at: Timestamp::now(),
            kind,
            object: object.into(),
            transition: transition.into(),
            from: from.to_string(),
            to: to.to_string(),
            actor: actor.user,
            actor_name: actor.name.clone(),
            note: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        let note = note.into();
        if !note.is_empty() {
            self.note = Some(note);
        }
        self
    }

    pub fn with_timestamp(mut self, at: Timestamp) -> Self {
        self.at = at;
        self
    }
}

impl fmt::Display for AuditEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}: {} -> {} by {}",
            self.at, self.kind, self.object, self.transition, self.from, self.to, self.actor_name
        )?;
        if let Some(note) = &self.note {
            write!(f, " ({note})")?;
        }
        Ok(())
    }
}

/// Destination of audit entries.
pub trait AuditSink: Send + Sync {
    fn record(&self, entry: AuditEntry) -> Result<(), CommissionError>;
}

/// Append-only in-memory audit log.
#[derive(Debug, Default)]
pub struct InMemoryAuditLog {
    entries: Mutex<Vec<AuditEntry>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of every entry, oldest first.
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().clone()
    }

    /// Entries about `object`, oldest first.
    pub fn for_object(&self, object: &str) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.object == object)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditSink for InMemoryAuditLog {
    fn record(&self, entry: AuditEntry) -> Result<(), CommissionError> {
        tracing::debug!(object = %entry.object, transition = %entry.transition, "audit entry recorded");
        self.entries.lock().push(entry);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_are_appended_in_order() {
        let log = InMemoryAuditLog::new();
        let actor = Actor::system();
        log.record(AuditEntry::new(AuditObject::Commission, "S1", "calc", "DRAFT", "CALCULATED", &actor))
            .unwrap();
        log.record(
            AuditEntry::new(AuditObject::Voucher, "PV00001", "submit", "DRAFT", "REVIEW", &actor)
                .with_note("please review"),
        )
        .unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log.for_object("S1").len(), 1);
        let line = log.entries()[1].to_string();
        assert!(line.contains("voucher PV00001 submit: DRAFT -> REVIEW by system (please review)"));
    }

    #[test]
    fn empty_note_is_dropped() {
        let entry = AuditEntry::new(AuditObject::Payout, "P", "send", "DRAFT", "SENT", &Actor::system())
            .with_note("");
        assert!(entry.note.is_none());
    }
}
