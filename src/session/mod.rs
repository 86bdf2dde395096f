//! Conversation Session
//!
//! Orchestrates one usage-gated conversation: accepts user input, consults
//! the quota tracker, calls the remote agent when allowed, and reconciles
//! local state with server-reported truth. Owns the transcript and the
//! active identity for the lifetime of the session.

pub mod gate;
pub mod quota;

use std::sync::Arc;

use tracing::warn;

use crate::error::SessionError;
use crate::store::Store;
use crate::types::{
    AgentClient, ConversationOutcome, Identity, MessageBody, TranscriptEntry, TransferSigner,
};

pub use gate::{GateState, PaymentGate};
pub use quota::{QuotaTracker, FREE_MESSAGE_LIMIT};

/// Appended to the transcript when an exchange fails in transit.
/// The quota is left untouched so a failed attempt costs nothing.
pub const FAILURE_MESSAGE: &str = "Sorry, something went wrong. Please try again.";

/// Whether an exchange is currently in flight. Exactly one exchange is
/// processed at a time; `Sending` rejects further input instead of
/// relying on a forgettable boolean flag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Idle,
    Sending,
}

/// What a `send` call amounted to, for the presentation layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    /// Empty input, or an exchange was already in flight. Nothing happened.
    Ignored,
    /// Quota exhausted; the gate is prompting. No network call was made
    /// unless the server itself signalled the limit.
    Blocked,
    /// A reply was appended to the transcript.
    Replied,
    /// The exchange failed in transit; an apologetic entry was appended.
    Failed,
}

pub struct Session {
    identity: Identity,
    transcript: Vec<TranscriptEntry>,
    phase: Phase,
    quota: QuotaTracker,
    gate: PaymentGate,
    client: Arc<dyn AgentClient>,
    store: Store,
}

impl Session {
    pub fn new(
        identity: Identity,
        client: Arc<dyn AgentClient>,
        store: Store,
        payment_recipient: &str,
    ) -> Self {
        Self {
            identity,
            transcript: Vec::new(),
            phase: Phase::Idle,
            quota: QuotaTracker::default(),
            gate: PaymentGate::new(payment_recipient),
            client,
            store,
        }
    }

    // ── Accessors ────────────────────────────────────────────────

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// The append-only transcript. Entries are never mutated or removed.
    pub fn transcript(&self) -> &[TranscriptEntry] {
        &self.transcript
    }

    pub fn gate_state(&self) -> &GateState {
        self.gate.state()
    }

    pub fn is_busy(&self) -> bool {
        self.phase == Phase::Sending
    }

    /// Whether another exchange may start right now. A settled payment
    /// bypasses quota for the rest of the session, including for
    /// anonymous payers whose identity carries no paid flag.
    pub fn can_send(&self) -> bool {
        self.gate.is_paid() || self.quota.can_send(&self.identity)
    }

    // ── Operations ───────────────────────────────────────────────

    /// Single entry point for one user exchange.
    pub async fn send(&mut self, raw: &str) -> SendOutcome {
        let message = raw.trim().to_string();
        if message.is_empty() || self.phase == Phase::Sending {
            return SendOutcome::Ignored;
        }

        // Optimistic: the user's message lands in the transcript first
        self.transcript.push(TranscriptEntry::user(&message));

        if !self.can_send() {
            self.gate.trip();
            return SendOutcome::Blocked;
        }

        // The phase is restored on every path out of the dispatch;
        // nothing returns between these two assignments.
        self.phase = Phase::Sending;
        let result = self.client.converse(&message, Some(&self.identity)).await;
        self.phase = Phase::Idle;

        match result {
            Err(e) => {
                warn!("exchange failed: {e}");
                self.transcript
                    .push(TranscriptEntry::bot(MessageBody::Text(
                        FAILURE_MESSAGE.to_string(),
                    )));
                SendOutcome::Failed
            }
            Ok(res) => {
                self.identity.reconcile_flags(res.paid, res.free);

                match res.outcome {
                    ConversationOutcome::LimitReached { partial } => {
                        if let Some(body) = partial {
                            self.transcript.push(TranscriptEntry::bot(body));
                        }
                        // Server truth wins over the cached counter
                        self.quota.mark_exhausted();
                        self.gate.trip();
                        SendOutcome::Blocked
                    }
                    ConversationOutcome::Reply(body) => {
                        self.transcript.push(TranscriptEntry::bot(body));
                        if let Err(e) = self.quota.record_exchange(&mut self.identity, &self.store)
                        {
                            warn!("failed to persist usage counter: {e:#}");
                        }
                        SendOutcome::Replied
                    }
                }
            }
        }
    }

    /// Complete a sign-in with a fresh credential. On success the
    /// authenticated identity replaces the anonymous one, the anonymous
    /// counter is cleared, and the gate reopens when the server reports
    /// remaining quota.
    pub async fn sign_in(&mut self, token: &str) -> Result<(), SessionError> {
        let verification = self.client.verify_identity(token).await?;

        if let Err(e) = self.store.set_auth_token(token) {
            warn!("failed to persist credential token: {e:#}");
        }
        if let Err(e) = self.store.clear_anon_count() {
            warn!("failed to clear anonymous counter: {e:#}");
        }

        self.identity = Identity::Authenticated {
            token: token.to_string(),
            user_id: verification.user_id,
            usage_count: verification.usage_count,
            is_free: verification.is_free,
            is_paid: verification.is_paid,
        };
        self.quota.reset();

        if self.can_send() {
            self.gate.reopen();
        }

        Ok(())
    }

    /// Pay to lift the gate. The selected amount is transferred on-chain
    /// via the external signer; on success the identity flags flip to
    /// paid and the backend confirmation path is exercised. A confirmation
    /// failure is logged, not fatal: the chain transfer already settled.
    pub async fn pay(
        &mut self,
        amount_native: f64,
        signer: &dyn TransferSigner,
    ) -> Result<String, SessionError> {
        let signature = self.gate.submit_payment(amount_native, signer).await?;

        self.identity.mark_paid();

        if let Identity::Authenticated {
            user_id: Some(user_id),
            ..
        } = &self.identity
        {
            if let Err(e) = self.client.confirm_payment(user_id).await {
                warn!("backend payment confirmation failed: {e}");
            }
        }

        Ok(signature)
    }
}
