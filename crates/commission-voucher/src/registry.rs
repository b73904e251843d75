//! # Voucher Registry
//!
//! The voucher service. Owns every voucher, the token index and the
//! number index, and runs each workflow action through the same pipeline:
//!
//! 1. table validity (precondition), then capability (permission);
//! 2. business guards (submit only);
//! 3. host side effects (payment creation on authorisation);
//! 4. commit, history entry, stage stamps, audit entry;
//! 5. write-back, then activity rotation and notification.
//!
//! Steps 1 to 4 run on a copy of the voucher under the map's shard lock; a
//! failure anywhere leaves the stored voucher untouched.

use std::fmt;
use std::sync::Arc;

use chrono::NaiveDate;
use commission_core::sequence::next_with_retry;
use commission_core::{
    Actor, AuditEntry, AuditObject, AuditSink, Capability, CommissionError, CurrencyCode,
    EngineConfig, JournalId, PartnerId, PayoutId, SequenceAllocator, SequenceFormat, Timestamp,
    UserId, VoucherId,
};
use commission_state::{VoucherAction, VoucherState};
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::activity::{Activity, ActivityBoard, InMemoryDirectory, InMemoryNotifier, Notification, Notifier, UserDirectory};
use crate::gateway::{InMemoryPaymentGateway, PaymentGateway, PaymentRef};
use crate::token::{fingerprint, token_from_payload, VerificationToken};
use crate::voucher::{NewVoucher, PaymentVoucher, VoucherDirection, WorkflowHistoryEntry};

// ─── Settings ────────────────────────────────────────────────────────

/// Registry settings, usually derived from [`EngineConfig`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoucherSettings {
    /// Base of verification URLs.
    pub base_url: String,
    /// Accept past payment dates at submit for every voucher.
    pub allow_past_payment_date: bool,
    /// Zero padding of voucher numbers.
    pub padding: usize,
}

impl Default for VoucherSettings {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for VoucherSettings {
    fn from(config: &EngineConfig) -> Self {
        Self {
            base_url: config.verification_base_url.clone(),
            allow_past_payment_date: config.allow_past_payment_date,
            padding: config.sequence_padding,
        }
    }
}

// ─── Requests and Views ──────────────────────────────────────────────

/// Edits to a DRAFT voucher. `None` leaves a field unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VoucherPatch {
    pub partner: Option<PartnerId>,
    pub amount: Option<Decimal>,
    pub currency: Option<CurrencyCode>,
    pub payment_date: Option<NaiveDate>,
    pub reference: Option<String>,
    pub memo: Option<String>,
    pub journal: Option<JournalId>,
    pub backdate_override: Option<bool>,
}

/// Request metadata recorded on the history entry.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TransitionContext {
    pub note: String,
    pub ip: Option<String>,
}

impl TransitionContext {
    pub fn with_note(note: impl Into<String>) -> Self {
        Self {
            note: note.into(),
            ip: None,
        }
    }

    pub fn from_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }
}

/// What a verification lookup discloses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoucherView {
    pub number: String,
    pub direction: VoucherDirection,
    pub partner: Option<PartnerId>,
    pub amount: Decimal,
    pub currency: Option<CurrencyCode>,
    pub payment_date: Option<NaiveDate>,
    pub state: VoucherState,
}

impl From<&PaymentVoucher> for VoucherView {
    fn from(voucher: &PaymentVoucher) -> Self {
        Self {
            number: voucher.number.clone(),
            direction: voucher.direction,
            partner: voucher.partner,
            amount: voucher.amount,
            currency: voucher.currency.clone(),
            payment_date: voucher.payment_date,
            state: voucher.state(),
        }
    }
}

/// Result of verifying a token or scanned payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum VerificationOutcome {
    Verified(VoucherView),
    /// No voucher carries the token.
    Unknown,
    /// The token resolves but the payload does not match the voucher.
    Mismatch { number: String },
}

impl VerificationOutcome {
    pub fn is_verified(&self) -> bool {
        matches!(self, Self::Verified(_))
    }
}

// ─── Submit Guards ───────────────────────────────────────────────────

/// A business condition that blocks DRAFT → REVIEW.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmitBlocker {
    #[error("partner is required")]
    MissingPartner,

    #[error("amount must be positive, got {amount:.2}")]
    NonPositiveAmount { amount: Decimal },

    #[error("journal is required")]
    MissingJournal,

    #[error("payment date is required")]
    MissingPaymentDate,

    #[error("payment date {date} is in the past (today is {today})")]
    PaymentDateInPast { date: NaiveDate, today: NaiveDate },
}

// ─── Registry ────────────────────────────────────────────────────────

/// Owns vouchers and runs their workflow.
pub struct VoucherRegistry {
    settings: VoucherSettings,
    vouchers: DashMap<VoucherId, PaymentVoucher>,
    tokens: DashMap<VerificationToken, VoucherId>,
    numbers: DashMap<String, VoucherId>,
    sequences: Arc<dyn SequenceAllocator>,
    audit: Arc<dyn AuditSink>,
    activities: ActivityBoard,
    notifier: Arc<dyn Notifier>,
    directory: Arc<dyn UserDirectory>,
    gateway: Arc<dyn PaymentGateway>,
}

impl VoucherRegistry {
    /// A registry with in-memory notifier, empty directory and in-memory
    /// payment gateway.
    pub fn new(
        settings: VoucherSettings,
        sequences: Arc<dyn SequenceAllocator>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            settings,
            vouchers: DashMap::new(),
            tokens: DashMap::new(),
            numbers: DashMap::new(),
            sequences,
            audit,
            activities: ActivityBoard::new(),
            notifier: Arc::new(InMemoryNotifier::new()),
            directory: Arc::new(InMemoryDirectory::default()),
            gateway: Arc::new(InMemoryPaymentGateway::new()),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_directory(mut self, directory: Arc<dyn UserDirectory>) -> Self {
        self.directory = directory;
        self
    }

    pub fn with_gateway(mut self, gateway: Arc<dyn PaymentGateway>) -> Self {
        self.gateway = gateway;
        self
    }

    pub fn settings(&self) -> &VoucherSettings {
        &self.settings
    }

    // ── Creation and edits ──────────────────────────────────────────

    /// Draft a voucher. Allocates the number, mints the token and writes
    /// the first history entry.
    pub fn create(&self, draft: NewVoucher, actor: &Actor) -> Result<PaymentVoucher, CommissionError> {
        if draft.amount < Decimal::ZERO {
            return Err(CommissionError::validation(
                "voucher create",
                draft.direction.prefix(),
                vec![format!("amount must not be negative, got {:.2}", draft.amount)],
            ));
        }

        let prefix = draft.direction.prefix();
        let value = next_with_retry(self.sequences.as_ref(), prefix)?;
        let number = SequenceFormat::new(prefix, self.settings.padding).render(value);
        if self.numbers.contains_key(&number) {
            return Err(CommissionError::Integrity(format!("voucher number {number} already issued")));
        }

        let mut token = VerificationToken::mint();
        while self.tokens.contains_key(&token) {
            token = VerificationToken::mint();
        }

        let mut voucher = PaymentVoucher {
            id: VoucherId::new(),
            number,
            direction: draft.direction,
            partner: draft.partner,
            amount: draft.amount,
            currency: draft.currency,
            payment_date: draft.payment_date,
            reference: draft.reference,
            memo: draft.memo,
            journal: draft.journal,
            payout: draft.payout,
            backdate_override: draft.backdate_override,
            workflow: Default::default(),
            creator: actor.user,
            reviewer: None,
            approver: None,
            authorizer: None,
            created_at: Timestamp::now(),
            submitted_at: None,
            reviewed_at: None,
            approved_at: None,
            paid_at: None,
            cancelled_at: None,
            verification_token: token,
            qr_payload: String::new(),
            payment_ref: None,
            history: Vec::new(),
        };
        voucher.qr_payload = voucher.render_qr(&self.settings.base_url);
        let at = voucher.push_history(None, VoucherState::Draft, actor.user, Some("Voucher created".to_string()), None);
        voucher.created_at = at;

        self.audit.record(
            AuditEntry::new(AuditObject::Voucher, &voucher.number, "create", "-", VoucherState::Draft, actor)
                .with_timestamp(at),
        )?;

        self.tokens.insert(voucher.verification_token.clone(), voucher.id);
        self.numbers.insert(voucher.number.clone(), voucher.id);
        self.vouchers.insert(voucher.id, voucher.clone());
        self.enter_state(&voucher, actor);

        tracing::info!(
            voucher = %voucher.number,
            direction = %voucher.direction,
            actor = %actor.name,
            "voucher created"
        );
        Ok(voucher)
    }

    /// Edit a DRAFT voucher. The QR payload is re-derived; the token stays.
    pub fn update_draft(
        &self,
        id: VoucherId,
        patch: VoucherPatch,
        actor: &Actor,
    ) -> Result<PaymentVoucher, CommissionError> {
        let mut entry = self
            .vouchers
            .get_mut(&id)
            .ok_or_else(|| CommissionError::NotFound(id.to_string()))?;
        let object = entry.number.clone();

        if entry.state() != VoucherState::Draft {
            return Err(CommissionError::precondition(
                "voucher edit",
                &object,
                format!("voucher is {}; only DRAFT vouchers can be edited", entry.state()),
            ));
        }
        if actor.user != entry.creator && !actor.has(Capability::Manager) {
            return Err(CommissionError::permission(
                "voucher edit",
                &object,
                format!("{} is neither the creator nor a MANAGER", actor.name),
            ));
        }
        if let Some(amount) = patch.amount {
            if amount < Decimal::ZERO {
                return Err(CommissionError::validation(
                    "voucher edit",
                    &object,
                    vec![format!("amount must not be negative, got {amount:.2}")],
                ));
            }
        }

        let mut voucher = entry.clone();
        if let Some(partner) = patch.partner {
            voucher.partner = Some(partner);
        }
        if let Some(amount) = patch.amount {
            voucher.amount = amount;
        }
        if let Some(currency) = patch.currency {
            voucher.currency = Some(currency);
        }
        if let Some(date) = patch.payment_date {
            voucher.payment_date = Some(date);
        }
        if let Some(reference) = patch.reference {
            voucher.reference = Some(reference);
        }
        if let Some(memo) = patch.memo {
            voucher.memo = Some(memo);
        }
        if let Some(journal) = patch.journal {
            voucher.journal = Some(journal);
        }
        if let Some(flag) = patch.backdate_override {
            voucher.backdate_override = flag;
        }
        voucher.qr_payload = voucher.render_qr(&self.settings.base_url);

        *entry = voucher.clone();
        tracing::debug!(voucher = %object, "voucher draft updated");
        Ok(voucher)
    }

    // ── Workflow ────────────────────────────────────────────────────

    /// Run `action` on voucher `id` for `actor`.
    pub fn apply(
        &self,
        id: VoucherId,
        action: VoucherAction,
        actor: &Actor,
        context: TransitionContext,
    ) -> Result<PaymentVoucher, CommissionError> {
        let mut entry = self
            .vouchers
            .get_mut(&id)
            .ok_or_else(|| CommissionError::NotFound(id.to_string()))?;
        let mut voucher = entry.clone();
        let object = voucher.number.clone();
        let from = voucher.state();

        let to = voucher.workflow.check(action, actor, voucher.creator, &object)?;

        if action == VoucherAction::Submit {
            let blockers = self.submit_blockers(&voucher);
            if !blockers.is_empty() {
                return Err(CommissionError::validation(
                    "voucher submit",
                    &object,
                    blockers.iter().map(ToString::to_string).collect(),
                ));
            }
        }

        // Ledger side effects come first and are compensated on failure.
        let mut created = None;
        let mut voided = false;
        if to == VoucherState::Authorize && voucher.payment_ref.is_none() {
            let payment = self
                .gateway
                .create_payment(&voucher)
                .map_err(|err| CommissionError::upstream(format!("payment gateway for {object}"), err))?;
            voucher.payment_ref = Some(payment.0.clone());
            created = Some(payment);
        } else if from == VoucherState::Authorize && to != VoucherState::Paid {
            if let Some(reference) = voucher.payment_ref.take() {
                self.gateway
                    .void_payment(&PaymentRef(reference))
                    .map_err(|err| CommissionError::upstream(format!("payment gateway for {object}"), err))?;
                voided = true;
            }
        }

        if let Err(err) = self.commit(&mut voucher, action, from, to, actor, context) {
            if let Some(payment) = created {
                if let Err(void_err) = self.gateway.void_payment(&payment) {
                    tracing::error!(
                        voucher = %object,
                        payment = %payment.0,
                        error = %void_err,
                        "payment created for a failed authorisation could not be voided"
                    );
                }
            }
            if voided {
                // The ledger no longer knows the payment; forget it even
                // though the transition itself is rolled back.
                entry.payment_ref = None;
            }
            return Err(err);
        }

        *entry = voucher.clone();
        drop(entry);

        self.activities.close_open(id);
        self.enter_state(&voucher, actor);

        tracing::info!(
            voucher = %object,
            from = %from,
            to = %to,
            actor = %actor.name,
            "voucher {action}"
        );
        Ok(voucher)
    }

    /// Commit the state change, its history entry, stage stamps and audit
    /// entry on the working copy.
    fn commit(
        &self,
        voucher: &mut PaymentVoucher,
        action: VoucherAction,
        from: VoucherState,
        to: VoucherState,
        actor: &Actor,
        context: TransitionContext,
    ) -> Result<(), CommissionError> {
        let object = voucher.number.clone();
        voucher.workflow.commit(to, actor, &object, &context.note)?;
        let note = (!context.note.is_empty()).then(|| context.note.clone());
        let at = voucher.push_history(Some(from), to, actor.user, note, context.ip);
        stamp(voucher, from, to, actor.user, at);

        self.audit.record(
            AuditEntry::new(AuditObject::Voucher, &object, action.name(), from, to, actor)
                .with_note(context.note)
                .with_timestamp(at),
        )
    }

    /// Move voucher `id` to `to`, resolving the action from the table.
    pub fn transition_to(
        &self,
        id: VoucherId,
        to: VoucherState,
        actor: &Actor,
        context: TransitionContext,
    ) -> Result<PaymentVoucher, CommissionError> {
        let action = {
            let voucher = self
                .vouchers
                .get(&id)
                .ok_or_else(|| CommissionError::NotFound(id.to_string()))?;
            voucher.workflow.check_target(to, &voucher.number)?
        };
        self.apply(id, action, actor, context)
    }

    fn submit_blockers(&self, voucher: &PaymentVoucher) -> Vec<SubmitBlocker> {
        let mut blockers = Vec::new();
        if voucher.partner.is_none() {
            blockers.push(SubmitBlocker::MissingPartner);
        }
        if voucher.amount <= Decimal::ZERO {
            blockers.push(SubmitBlocker::NonPositiveAmount { amount: voucher.amount });
        }
        if voucher.journal.is_none() {
            blockers.push(SubmitBlocker::MissingJournal);
        }
        match voucher.payment_date {
            None => blockers.push(SubmitBlocker::MissingPaymentDate),
            Some(date) => {
                let today = Timestamp::now().date();
                let backdating_allowed = voucher.backdate_override || self.settings.allow_past_payment_date;
                if date < today && !backdating_allowed {
                    blockers.push(SubmitBlocker::PaymentDateInPast { date, today });
                }
            }
        }
        blockers
    }

    /// Open activities for the users who act next and notify them.
    fn enter_state(&self, voucher: &PaymentVoucher, actor: &Actor) {
        let state = voucher.state();
        let assignees = match state.next_capability() {
            Some(capability) => self.directory.holders(capability),
            None if state == VoucherState::Draft => vec![voucher.creator],
            None => Vec::new(),
        };
        if assignees.is_empty() && state.next_capability().is_some() {
            tracing::warn!(voucher = %voucher.number, state = %state, "no user holds the next-step capability");
        }
        self.activities.schedule(voucher.id, state, &voucher.number, &assignees);

        let recipients = if assignees.is_empty() {
            vec![voucher.creator]
        } else {
            assignees
        };
        let notification = Notification::for_state(voucher.id, &voucher.number, state, recipients, actor);
        if let Err(err) = self.notifier.notify(&notification) {
            tracing::warn!(voucher = %voucher.number, error = %err, "notification failed");
        }
    }

    // ── Queries ─────────────────────────────────────────────────────

    pub fn get(&self, id: VoucherId) -> Option<PaymentVoucher> {
        self.vouchers.get(&id).map(|v| v.clone())
    }

    pub fn by_number(&self, number: &str) -> Option<PaymentVoucher> {
        let id = *self.numbers.get(number)?;
        self.get(id)
    }

    /// Vouchers drafted from payout `payout`.
    pub fn for_payout(&self, payout: PayoutId) -> Vec<PaymentVoucher> {
        let mut found: Vec<_> = self
            .vouchers
            .iter()
            .filter(|v| v.payout == Some(payout))
            .map(|v| v.clone())
            .collect();
        found.sort_by(|a, b| a.number.cmp(&b.number));
        found
    }

    pub fn history(&self, id: VoucherId) -> Vec<WorkflowHistoryEntry> {
        self.vouchers
            .get(&id)
            .map(|v| v.history.clone())
            .unwrap_or_default()
    }

    /// Open activities of voucher `id`.
    pub fn activities(&self, id: VoucherId) -> Vec<Activity> {
        self.activities.open_for(id)
    }

    /// Open activities assigned to `user`.
    pub fn inbox(&self, user: UserId) -> Vec<Activity> {
        self.activities.open_for_user(user)
    }

    pub fn len(&self) -> usize {
        self.vouchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vouchers.is_empty()
    }

    // ── Verification ────────────────────────────────────────────────

    /// Resolve a verification token.
    pub fn verify(&self, token: &str) -> VerificationOutcome {
        let token = VerificationToken::from_string(token.trim());
        let outcome = self
            .tokens
            .get(&token)
            .and_then(|id| self.vouchers.get(&*id).map(|v| VoucherView::from(&*v)))
            .map_or(VerificationOutcome::Unknown, VerificationOutcome::Verified);
        tracing::debug!(verified = outcome.is_verified(), "voucher token lookup");
        outcome
    }

    /// Verify a scanned QR payload against the stored voucher.
    pub fn verify_payload(&self, payload: &str) -> VerificationOutcome {
        let payload = payload.trim();
        let Some(token) = token_from_payload(payload) else {
            return VerificationOutcome::Unknown;
        };
        let Some(id) = self.tokens.get(&token).map(|id| *id) else {
            return VerificationOutcome::Unknown;
        };
        let Some(voucher) = self.get(id) else {
            return VerificationOutcome::Unknown;
        };
        let expected = voucher.render_qr(&self.settings.base_url);
        if fingerprint(&expected) == fingerprint(payload) {
            VerificationOutcome::Verified(VoucherView::from(&voucher))
        } else {
            tracing::warn!(voucher = %voucher.number, "scanned payload does not match voucher");
            VerificationOutcome::Mismatch {
                number: voucher.number,
            }
        }
    }
}

/// Record who moved the voucher through each stage, and when.
fn stamp(voucher: &mut PaymentVoucher, from: VoucherState, to: VoucherState, user: UserId, at: Timestamp) {
    use VoucherState::*;
    match (from, to) {
        (Draft, Review) => voucher.submitted_at = Some(at),
        (Review, Approve) => {
            voucher.reviewer = Some(user);
            voucher.reviewed_at = Some(at);
        }
        (Approve, Authorize) => {
            voucher.approver = Some(user);
            voucher.approved_at = Some(at);
        }
        (Authorize, Paid) => {
            voucher.authorizer = Some(user);
            voucher.paid_at = Some(at);
        }
        (_, Cancel) => voucher.cancelled_at = Some(at),
        (_, Draft) => voucher.clear_approvals(),
        _ => {}
    }
}

impl fmt::Debug for VoucherRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VoucherRegistry")
            .field("settings", &self.settings)
            .field("vouchers", &self.vouchers.len())
            .finish_non_exhaustive()
    }
}
