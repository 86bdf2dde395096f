//! Identity Resolver
//!
//! Single-shot identity construction at session start: replay a stored
//! credential token against the backend, or fall back to the anonymous
//! counter. This is the only place an identity is built from storage;
//! all later mutations go through the quota tracker and the session.

use tracing::{debug, info, warn};

use crate::store::Store;
use crate::types::{AgentClient, Identity};

/// Restore the active identity from durable storage.
///
/// A stored token that verifies becomes an `Authenticated` identity built
/// from server-reported usage and flags, and the anonymous counter is
/// cleared. A token the backend rejects (or that cannot be verified due to
/// a transport failure) is discarded from storage, and the session falls
/// back to `Anonymous` with the stored counter, defaulting to 0.
///
/// Idempotent: calling twice with unchanged storage yields equivalent
/// identities.
pub async fn resolve(store: &Store, client: &dyn AgentClient) -> Identity {
    if let Some(token) = store.auth_token() {
        match client.verify_identity(&token).await {
            Ok(verification) => {
                // A verified token fully replaces the anonymous counter
                if let Err(e) = store.clear_anon_count() {
                    warn!("failed to clear anonymous counter: {e:#}");
                }
                info!(
                    usage_count = verification.usage_count,
                    is_paid = verification.is_paid,
                    "restored authenticated identity"
                );
                return Identity::Authenticated {
                    token,
                    user_id: verification.user_id,
                    usage_count: verification.usage_count,
                    is_free: verification.is_free,
                    is_paid: verification.is_paid,
                };
            }
            Err(e) => {
                // Rejected or unverifiable: discard and fall through
                debug!("stored token unusable ({e}); falling back to anonymous");
                if let Err(e) = store.clear_auth_token() {
                    warn!("failed to discard stored token: {e:#}");
                }
            }
        }
    }

    Identity::anonymous(store.anon_count())
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::error::SessionError;
    use crate::store::AUTH_TOKEN_KEY;
    use crate::types::{ConversationResult, Verification};

    struct FakeClient {
        verify_ok: bool,
        calls: AtomicU32,
    }

    impl FakeClient {
        fn new(verify_ok: bool) -> Self {
            Self {
                verify_ok,
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl AgentClient for FakeClient {
        async fn converse(
            &self,
            _message: &str,
            _identity: Option<&Identity>,
        ) -> Result<ConversationResult, SessionError> {
            unreachable!("resolve never converses")
        }

        async fn verify_identity(&self, _token: &str) -> Result<Verification, SessionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.verify_ok {
                Ok(Verification {
                    success: true,
                    user_id: Some("u-1".into()),
                    usage_count: 7,
                    is_free: false,
                    is_paid: true,
                })
            } else {
                Err(SessionError::Auth("expired".into()))
            }
        }

        async fn confirm_payment(
            &self,
            _user_id: &str,
        ) -> Result<serde_json::Value, SessionError> {
            unreachable!("resolve never confirms payments")
        }
    }

    #[tokio::test]
    async fn no_token_yields_anonymous_with_stored_count() {
        let store = Store::open_in_memory().unwrap();
        store.set_anon_count(3).unwrap();

        let identity = resolve(&store, &FakeClient::new(true)).await;
        assert_eq!(identity, Identity::anonymous(3));
    }

    #[tokio::test]
    async fn valid_token_builds_authenticated_and_clears_anon_counter() {
        let store = Store::open_in_memory().unwrap();
        store.set_anon_count(3).unwrap();
        store.set_auth_token("tok").unwrap();

        let identity = resolve(&store, &FakeClient::new(true)).await;
        assert_eq!(
            identity,
            Identity::Authenticated {
                token: "tok".into(),
                user_id: Some("u-1".into()),
                usage_count: 7,
                is_free: false,
                is_paid: true,
            }
        );
        assert_eq!(store.anon_count(), 0);
    }

    #[tokio::test]
    async fn rejected_token_is_discarded_and_falls_back_to_anonymous() {
        let store = Store::open_in_memory().unwrap();
        store.set_anon_count(2).unwrap();
        store.set_auth_token("stale").unwrap();

        let identity = resolve(&store, &FakeClient::new(false)).await;
        assert_eq!(identity, Identity::anonymous(2));
        assert!(store.get_kv(AUTH_TOKEN_KEY).is_none());
    }

    #[tokio::test]
    async fn resolve_is_idempotent_with_unchanged_storage() {
        let store = Store::open_in_memory().unwrap();
        store.set_anon_count(4).unwrap();

        let client = FakeClient::new(true);
        let first = resolve(&store, &client).await;
        let second = resolve(&store, &client).await;
        assert_eq!(first, second);
    }
}
