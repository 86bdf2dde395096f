//! Strom Client - Type Definitions
//!
//! Shared types for the usage-gated conversational session:
//! identities, transcript entries, agent responses, and the
//! traits the session depends on.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SessionError;

// ─── Identity ────────────────────────────────────────────────────

/// The actor whose usage is metered. Exactly one is active per session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum Identity {
    Anonymous {
        usage_count: u32,
    },
    Authenticated {
        token: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        user_id: Option<String>,
        usage_count: u32,
        is_free: bool,
        is_paid: bool,
    },
}

impl Identity {
    pub fn anonymous(usage_count: u32) -> Self {
        Identity::Anonymous { usage_count }
    }

    pub fn usage_count(&self) -> u32 {
        match self {
            Identity::Anonymous { usage_count } => *usage_count,
            Identity::Authenticated { usage_count, .. } => *usage_count,
        }
    }

    /// Paid status. Anonymous identities are never paid; a paid session for
    /// an anonymous payer is carried by the payment gate instead.
    pub fn is_paid(&self) -> bool {
        match self {
            Identity::Anonymous { .. } => false,
            Identity::Authenticated { is_paid, .. } => *is_paid,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Identity::Authenticated { .. })
    }

    /// Flip the paid/free flags after a settled payment.
    /// No-op for anonymous identities.
    pub fn mark_paid(&mut self) {
        if let Identity::Authenticated {
            is_paid, is_free, ..
        } = self
        {
            *is_paid = true;
            *is_free = false;
        }
    }

    /// Overwrite cached paid/free flags from server-reported truth.
    /// Local flags are a cache; the server always wins.
    pub fn reconcile_flags(&mut self, paid: Option<bool>, free: Option<bool>) {
        if let Identity::Authenticated {
            is_paid, is_free, ..
        } = self
        {
            if let Some(p) = paid {
                *is_paid = p;
            }
            if let Some(f) = free {
                *is_free = f;
            }
        }
    }
}

/// Server response to a token verification call.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Verification {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub usage_count: u32,
    pub is_free: bool,
    pub is_paid: bool,
}

// ─── Transcript ──────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Bot,
}

/// A bot reply is either plain text or a structured project analysis.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageBody {
    Text(String),
    Analysis(ProjectAnalysis),
}

/// One entry in the append-only session transcript.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptEntry {
    pub id: String,
    pub sender: Sender,
    pub body: MessageBody,
    pub timestamp: String,
}

impl TranscriptEntry {
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Sender::User, MessageBody::Text(text.into()))
    }

    pub fn bot(body: MessageBody) -> Self {
        Self::new(Sender::Bot, body)
    }

    fn new(sender: Sender, body: MessageBody) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            sender,
            body,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

// ─── Agent responses ─────────────────────────────────────────────

/// A reference cited by a structured reply. The wire form may be a bare
/// string or a `{source_name, source_url}` object; it is normalized to this
/// shape at the parse boundary and the ambiguity never reaches the core.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Itemized reply from the project agent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectAnalysis {
    pub points: Vec<String>,
    pub is_greeting: bool,
    pub relevant_projects: Vec<String>,
    pub sources: Vec<Source>,
}

/// What the backend said: a usable reply, or a hard stop.
#[derive(Clone, Debug, PartialEq)]
pub enum ConversationOutcome {
    Reply(MessageBody),
    /// Quota exhausted server-side. May carry a partial reply to surface.
    LimitReached { partial: Option<MessageBody> },
}

/// Full result of one conversation exchange, including the paid/free flags
/// the server reports alongside the reply for cache reconciliation.
#[derive(Clone, Debug, PartialEq)]
pub struct ConversationResult {
    pub outcome: ConversationOutcome,
    pub paid: Option<bool>,
    pub free: Option<bool>,
}

// ─── Payment ─────────────────────────────────────────────────────

/// Ephemeral intent created when the user commits to pay.
/// Consumed exactly once by a successful transfer; never persisted.
#[derive(Clone, Debug, PartialEq)]
pub struct PaymentIntent {
    pub amount_native: f64,
    pub recipient: String,
}

// ─── Traits ──────────────────────────────────────────────────────

/// Backend conversation endpoint. Network I/O only, exactly one attempt
/// per call, no local mutation.
#[async_trait]
pub trait AgentClient: Send + Sync {
    async fn converse(
        &self,
        message: &str,
        identity: Option<&Identity>,
    ) -> Result<ConversationResult, SessionError>;

    async fn verify_identity(&self, token: &str) -> Result<Verification, SessionError>;

    async fn confirm_payment(&self, user_id: &str) -> Result<serde_json::Value, SessionError>;
}

/// External signer capability: an opaque collaborator that can tell whether
/// a signing identity is connected and submit a native-unit transfer to a
/// recipient, returning a transaction signature.
#[async_trait]
pub trait TransferSigner: Send + Sync {
    fn is_connected(&self) -> bool;

    fn address(&self) -> Option<String>;

    async fn transfer(&self, amount_native: f64, recipient: &str) -> anyhow::Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_is_never_paid() {
        let mut id = Identity::anonymous(3);
        assert!(!id.is_paid());
        id.mark_paid();
        assert!(!id.is_paid());
        assert_eq!(id.usage_count(), 3);
    }

    #[test]
    fn reconcile_overwrites_cached_flags() {
        let mut id = Identity::Authenticated {
            token: "tok".into(),
            user_id: Some("u1".into()),
            usage_count: 2,
            is_free: true,
            is_paid: false,
        };
        id.reconcile_flags(Some(true), Some(false));
        assert!(id.is_paid());

        // Absent flags leave the cache untouched
        id.reconcile_flags(None, None);
        assert!(id.is_paid());
    }
}
