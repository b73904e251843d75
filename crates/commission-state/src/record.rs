//! Transition log entries shared by every state machine.

use commission_core::{Actor, Timestamp, UserId};
use serde::{Deserialize, Serialize};

/// Record of one state transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord<S> {
    /// State before the transition.
    pub from_state: S,
    /// State after the transition.
    pub to_state: S,
    /// Strictly later than the previous record's timestamp.
    pub timestamp: Timestamp,
    /// Who performed the transition.
    pub actor: UserId,
    /// Display name of the actor at the time.
    pub actor_name: String,
    /// Free-text reason or note.
    pub reason: String,
}

/// Append a record to `log`, keeping timestamps strictly increasing.
pub(crate) fn append<S: Copy>(
    log: &mut Vec<TransitionRecord<S>>,
    from: S,
    to: S,
    actor: &Actor,
    reason: &str,
) -> TransitionRecord<S> {
    let record = TransitionRecord {
        from_state: from,
        to_state: to,
        timestamp: Timestamp::strictly_after(log.last().map(|r| r.timestamp)),
        actor: actor.user,
        actor_name: actor.name.clone(),
        reason: reason.to_string(),
    };
    log.push(record.clone());
    record
}
