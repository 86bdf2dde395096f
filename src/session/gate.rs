//! Payment Gate
//!
//! State machine deciding whether further exchanges require sign-in or
//! payment. `Paid` is sticky for the remainder of the session. The
//! transferred amount equals the amount the user selected; the recipient
//! is fixed by configuration.

use tracing::{info, warn};

use crate::error::{SessionError, MAX_PAYMENT_AMOUNT, MIN_PAYMENT_AMOUNT};
use crate::types::{PaymentIntent, TransferSigner};

#[derive(Clone, Debug, PartialEq)]
pub enum GateState {
    /// No restriction.
    Open,
    /// Quota exceeded; offering sign-in or payment.
    LimitPrompt,
    /// User committed to pay; external signer invoked.
    AwaitingTransfer { amount_native: f64 },
    /// Terminal. Bypasses quota for the rest of the session.
    Paid,
}

#[derive(Debug)]
pub struct PaymentGate {
    state: GateState,
    recipient: String,
}

impl PaymentGate {
    pub fn new(recipient: impl Into<String>) -> Self {
        Self {
            state: GateState::Open,
            recipient: recipient.into(),
        }
    }

    pub fn state(&self) -> &GateState {
        &self.state
    }

    pub fn is_paid(&self) -> bool {
        matches!(self.state, GateState::Paid)
    }

    /// Whether the gate currently blocks sending.
    pub fn is_blocking(&self) -> bool {
        matches!(
            self.state,
            GateState::LimitPrompt | GateState::AwaitingTransfer { .. }
        )
    }

    /// Quota exceeded, or the server said so: start prompting.
    /// A paid gate never re-trips.
    pub fn trip(&mut self) {
        if matches!(self.state, GateState::Open) {
            info!("quota exhausted; prompting for sign-in or payment");
            self.state = GateState::LimitPrompt;
        }
    }

    /// The user signed in and the server reports remaining quota.
    pub fn reopen(&mut self) {
        if matches!(self.state, GateState::LimitPrompt) {
            self.state = GateState::Open;
        }
    }

    /// Run the payment flow: validate the selected amount, invoke the
    /// external signer, and settle the gate.
    ///
    /// Validation failures (`InvalidAmount`, `SignerUnavailable`) leave the
    /// state unchanged. A transfer failure reverts to `LimitPrompt` so the
    /// amount selection is re-offered. On success the gate becomes `Paid`
    /// and the transaction signature is returned.
    pub async fn submit_payment(
        &mut self,
        amount_native: f64,
        signer: &dyn TransferSigner,
    ) -> Result<String, SessionError> {
        if !matches!(self.state, GateState::LimitPrompt) {
            return Err(SessionError::Payment(
                "no payment is currently required".to_string(),
            ));
        }

        if !(MIN_PAYMENT_AMOUNT..=MAX_PAYMENT_AMOUNT).contains(&amount_native) {
            return Err(SessionError::InvalidAmount {
                amount: amount_native,
            });
        }

        if !signer.is_connected() {
            return Err(SessionError::SignerUnavailable);
        }

        let intent = PaymentIntent {
            amount_native,
            recipient: self.recipient.clone(),
        };
        self.state = GateState::AwaitingTransfer { amount_native };

        match signer.transfer(intent.amount_native, &intent.recipient).await {
            Ok(signature) => {
                info!(amount_native, "payment settled");
                self.state = GateState::Paid;
                Ok(signature)
            }
            Err(e) => {
                warn!("transfer failed: {e:#}");
                self.state = GateState::LimitPrompt;
                Err(SessionError::Payment(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;

    struct FakeSigner {
        connected: bool,
        succeed: bool,
    }

    #[async_trait]
    impl TransferSigner for FakeSigner {
        fn is_connected(&self) -> bool {
            self.connected
        }

        fn address(&self) -> Option<String> {
            self.connected.then(|| "0xabc".to_string())
        }

        async fn transfer(&self, _amount: f64, _recipient: &str) -> anyhow::Result<String> {
            if self.succeed {
                Ok("0xsignature".to_string())
            } else {
                anyhow::bail!("rpc unavailable")
            }
        }
    }

    fn tripped_gate() -> PaymentGate {
        let mut gate = PaymentGate::new("0xrecipient");
        gate.trip();
        gate
    }

    #[tokio::test]
    async fn amount_bounds_are_inclusive() {
        let signer = FakeSigner {
            connected: true,
            succeed: true,
        };

        for amount in [0.4, 20.1] {
            let mut gate = tripped_gate();
            let err = gate.submit_payment(amount, &signer).await.unwrap_err();
            assert!(matches!(err, SessionError::InvalidAmount { .. }));
            assert_eq!(gate.state(), &GateState::LimitPrompt);
        }

        for amount in [0.5, 20.0] {
            let mut gate = tripped_gate();
            gate.submit_payment(amount, &signer).await.unwrap();
            assert!(gate.is_paid());
        }
    }

    #[tokio::test]
    async fn missing_signer_does_not_advance_the_state() {
        let mut gate = tripped_gate();
        let signer = FakeSigner {
            connected: false,
            succeed: true,
        };

        let err = gate.submit_payment(1.0, &signer).await.unwrap_err();
        assert!(matches!(err, SessionError::SignerUnavailable));
        assert_eq!(gate.state(), &GateState::LimitPrompt);
    }

    #[tokio::test]
    async fn failed_transfer_reverts_to_prompting() {
        let mut gate = tripped_gate();
        let signer = FakeSigner {
            connected: true,
            succeed: false,
        };

        let err = gate.submit_payment(1.0, &signer).await.unwrap_err();
        assert!(matches!(err, SessionError::Payment(_)));
        assert_eq!(gate.state(), &GateState::LimitPrompt);
        assert!(gate.is_blocking());
    }

    #[tokio::test]
    async fn paid_is_sticky() {
        let mut gate = tripped_gate();
        let signer = FakeSigner {
            connected: true,
            succeed: true,
        };
        gate.submit_payment(1.1, &signer).await.unwrap();
        assert!(gate.is_paid());

        gate.trip();
        assert!(gate.is_paid());
        assert!(!gate.is_blocking());
    }

    #[tokio::test]
    async fn payment_requires_an_open_prompt() {
        let mut gate = PaymentGate::new("0xrecipient");
        let signer = FakeSigner {
            connected: true,
            succeed: true,
        };
        let err = gate.submit_payment(1.0, &signer).await.unwrap_err();
        assert!(matches!(err, SessionError::Payment(_)));
        assert_eq!(gate.state(), &GateState::Open);
    }

    #[test]
    fn reopen_only_from_limit_prompt() {
        let mut gate = tripped_gate();
        gate.reopen();
        assert_eq!(gate.state(), &GateState::Open);

        // reopening an open gate is a no-op
        gate.reopen();
        assert_eq!(gate.state(), &GateState::Open);
    }
}
