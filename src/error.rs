//! Session Error Taxonomy
//!
//! Every failure the core can produce, mapped to a recovery path:
//! network and timeout errors become apologetic transcript entries,
//! auth errors fall back to the anonymous identity, validation and
//! payment errors surface as blocking alerts. Nothing here is fatal.

use std::time::Duration;

use thiserror::Error;

/// Inclusive bounds for a user-selected payment amount, in native units.
pub const MIN_PAYMENT_AMOUNT: f64 = 0.5;
pub const MAX_PAYMENT_AMOUNT: f64 = 20.0;

#[derive(Debug, Error)]
pub enum SessionError {
    /// Transport failure or non-success HTTP status. The caller must not
    /// assume any partial side effect occurred.
    #[error("network error: {0}")]
    Network(String),

    /// The remote call did not complete within the configured deadline.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The backend rejected a credential. Treated as "not authenticated";
    /// the stored token must be discarded.
    #[error("authentication rejected: {0}")]
    Auth(String),

    /// Payment amount outside the accepted range.
    #[error(
        "invalid payment amount {amount}: must be between {MIN_PAYMENT_AMOUNT} and {MAX_PAYMENT_AMOUNT}"
    )]
    InvalidAmount { amount: f64 },

    /// No signing wallet is connected.
    #[error("no signing wallet connected")]
    SignerUnavailable,

    /// The signer call or the on-chain transfer failed.
    #[error("payment failed: {0}")]
    Payment(String),
}

impl SessionError {
    /// Map a reqwest transport error, distinguishing timeouts so the
    /// session can report them precisely.
    pub fn from_transport(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            SessionError::Timeout(timeout)
        } else {
            SessionError::Network(err.to_string())
        }
    }
}
