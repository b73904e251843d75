//! # Activities and Notifications
//!
//! Entering a workflow state opens one activity per user who acts next and
//! sends one notification. Every successful transition first closes the
//! voucher's open activities, so a stale to-do never outlives its stage.

use commission_core::{Actor, Capability, CommissionError, Timestamp, UserId, VoucherId};
use commission_state::VoucherState;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// A to-do assigned to one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    pub voucher: VoucherId,
    pub assignee: UserId,
    /// The state whose entry opened this activity.
    pub state: VoucherState,
    pub summary: String,
    pub opened_at: Timestamp,
    pub closed_at: Option<Timestamp>,
}

impl Activity {
    pub fn is_open(&self) -> bool {
        self.closed_at.is_none()
    }
}

/// A templated message sent on state entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub voucher: VoucherId,
    pub number: String,
    pub state: VoucherState,
    pub recipients: Vec<UserId>,
    pub subject: String,
    pub body: String,
}

impl Notification {
    /// The message for `number` entering `state`.
    pub fn for_state(
        voucher: VoucherId,
        number: &str,
        state: VoucherState,
        recipients: Vec<UserId>,
        actor: &Actor,
    ) -> Self {
        let action = match state {
            VoucherState::Draft => "is back in draft",
            VoucherState::Review => "awaits review",
            VoucherState::Approve => "awaits approval",
            VoucherState::Authorize => "awaits payment",
            VoucherState::Paid => "has been paid",
            VoucherState::Cancel => "has been cancelled",
        };
        Self {
            voucher,
            number: number.to_string(),
            state,
            recipients,
            subject: format!("Payment voucher {number} {action}"),
            body: format!("{} moved payment voucher {number} to {state}.", actor.name),
        }
    }
}

/// Delivers notifications.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: &Notification) -> Result<(), CommissionError>;
}

/// Notifier that keeps every message in memory.
#[derive(Debug, Default)]
pub struct InMemoryNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl InMemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().clone()
    }
}

impl Notifier for InMemoryNotifier {
    fn notify(&self, notification: &Notification) -> Result<(), CommissionError> {
        self.sent.lock().push(notification.clone());
        Ok(())
    }
}

/// Resolves which users hold a capability.
pub trait UserDirectory: Send + Sync {
    fn holders(&self, capability: Capability) -> Vec<UserId>;
}

/// Directory over a fixed list of actors.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    users: Mutex<Vec<Actor>>,
}

impl InMemoryDirectory {
    pub fn new(users: impl IntoIterator<Item = Actor>) -> Self {
        Self {
            users: Mutex::new(users.into_iter().collect()),
        }
    }

    pub fn add(&self, actor: Actor) {
        self.users.lock().push(actor);
    }
}

impl UserDirectory for InMemoryDirectory {
    fn holders(&self, capability: Capability) -> Vec<UserId> {
        self.users
            .lock()
            .iter()
            .filter(|a| a.has(capability))
            .map(|a| a.user)
            .collect()
    }
}

/// Per-voucher activities.
#[derive(Debug, Default)]
pub struct ActivityBoard {
    activities: DashMap<VoucherId, Vec<Activity>>,
}

impl ActivityBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Close every open activity of `voucher`. Returns how many were closed.
    pub fn close_open(&self, voucher: VoucherId) -> usize {
        let Some(mut entry) = self.activities.get_mut(&voucher) else {
            return 0;
        };
        let now = Timestamp::now();
        let mut closed = 0;
        for activity in entry.iter_mut().filter(|a| a.is_open()) {
            activity.closed_at = Some(now);
            closed += 1;
        }
        closed
    }

    /// Open one activity per assignee.
    pub fn schedule(&self, voucher: VoucherId, state: VoucherState, number: &str, assignees: &[UserId]) {
        if assignees.is_empty() {
            return;
        }
        let now = Timestamp::now();
        let summary = match state.next_capability() {
            Some(capability) => format!("{capability}: act on payment voucher {number}"),
            None => format!("Complete payment voucher {number}"),
        };
        let mut entry = self.activities.entry(voucher).or_default();
        for assignee in assignees {
            entry.push(Activity {
                voucher,
                assignee: *assignee,
                state,
                summary: summary.clone(),
                opened_at: now,
                closed_at: None,
            });
        }
    }

    /// Open activities of `voucher`.
    pub fn open_for(&self, voucher: VoucherId) -> Vec<Activity> {
        self.activities
            .get(&voucher)
            .map(|list| list.iter().filter(|a| a.is_open()).cloned().collect())
            .unwrap_or_default()
    }

    /// Every activity of `voucher`, open or closed.
    pub fn all_for(&self, voucher: VoucherId) -> Vec<Activity> {
        self.activities
            .get(&voucher)
            .map(|list| list.clone())
            .unwrap_or_default()
    }

    /// Open activities assigned to `user` across all vouchers.
    pub fn open_for_user(&self, user: UserId) -> Vec<Activity> {
        self.activities
            .iter()
            .flat_map(|list| {
                list.iter()
                    .filter(|a| a.is_open() && a.assignee == user)
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .collect()
    }
}
