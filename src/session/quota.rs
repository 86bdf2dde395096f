//! Quota Tracker
//!
//! Counts the exchanges consumed by the current identity and decides,
//! before each exchange, whether the free quota is exhausted. Local
//! counters are a cache: an explicit limit signal from the server wins
//! over whatever the cached counter says.

use anyhow::Result;
use tracing::debug;

use crate::store::Store;
use crate::types::Identity;

/// Free exchanges permitted before the gate intervenes.
pub const FREE_MESSAGE_LIMIT: u32 = 5;

#[derive(Debug)]
pub struct QuotaTracker {
    limit: u32,
    /// Set when a reply carried an explicit limit-reached signal.
    /// Forces `can_send` false regardless of the local counter.
    server_exhausted: bool,
}

impl Default for QuotaTracker {
    fn default() -> Self {
        Self::new(FREE_MESSAGE_LIMIT)
    }
}

impl QuotaTracker {
    pub fn new(limit: u32) -> Self {
        Self {
            limit,
            server_exhausted: false,
        }
    }

    /// Whether the identity may start another exchange. Paid identities
    /// bypass the limit entirely.
    pub fn can_send(&self, identity: &Identity) -> bool {
        if identity.is_paid() {
            return true;
        }
        if self.server_exhausted {
            return false;
        }
        identity.usage_count() < self.limit
    }

    /// Record one completed exchange. Anonymous counts are persisted to
    /// local storage immediately; authenticated counts stay transient and
    /// are refreshed from server flags instead.
    pub fn record_exchange(&self, identity: &mut Identity, store: &Store) -> Result<()> {
        match identity {
            Identity::Anonymous { usage_count } => {
                *usage_count += 1;
                store.set_anon_count(*usage_count)?;
                debug!(usage_count = *usage_count, "anonymous exchange recorded");
            }
            Identity::Authenticated { usage_count, .. } => {
                *usage_count += 1;
                debug!(usage_count = *usage_count, "authenticated exchange recorded");
            }
        }
        Ok(())
    }

    /// The server reported the quota exhausted; believe it immediately.
    pub fn mark_exhausted(&mut self) {
        self.server_exhausted = true;
    }

    /// Forget cached exhaustion. Used when the active identity is
    /// replaced, e.g. after sign-in.
    pub fn reset(&mut self) {
        self.server_exhausted = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn authenticated(usage_count: u32, is_paid: bool) -> Identity {
        Identity::Authenticated {
            token: "tok".into(),
            user_id: None,
            usage_count,
            is_free: !is_paid,
            is_paid,
        }
    }

    #[test]
    fn boundary_at_the_limit() {
        let tracker = QuotaTracker::default();
        assert!(tracker.can_send(&Identity::anonymous(FREE_MESSAGE_LIMIT - 1)));
        assert!(!tracker.can_send(&Identity::anonymous(FREE_MESSAGE_LIMIT)));
    }

    #[test]
    fn paid_identity_bypasses_the_limit() {
        let tracker = QuotaTracker::default();
        assert!(tracker.can_send(&authenticated(50, true)));
        assert!(!tracker.can_send(&authenticated(50, false)));
    }

    #[test]
    fn can_send_never_recovers_as_usage_grows() {
        let tracker = QuotaTracker::default();
        let store = Store::open_in_memory().unwrap();
        let mut identity = Identity::anonymous(0);

        let mut last = true;
        for _ in 0..10 {
            let now = tracker.can_send(&identity);
            // monotonically non-increasing permissiveness
            assert!(last || !now);
            last = now;
            tracker.record_exchange(&mut identity, &store).unwrap();
        }
        assert!(!tracker.can_send(&identity));
    }

    #[test]
    fn anonymous_count_is_persisted_immediately() {
        let tracker = QuotaTracker::default();
        let store = Store::open_in_memory().unwrap();
        let mut identity = Identity::anonymous(0);

        tracker.record_exchange(&mut identity, &store).unwrap();
        tracker.record_exchange(&mut identity, &store).unwrap();

        assert_eq!(identity.usage_count(), 2);
        assert_eq!(store.anon_count(), 2);
    }

    #[test]
    fn authenticated_count_is_not_persisted() {
        let tracker = QuotaTracker::default();
        let store = Store::open_in_memory().unwrap();
        let mut identity = authenticated(1, false);

        tracker.record_exchange(&mut identity, &store).unwrap();

        assert_eq!(identity.usage_count(), 2);
        assert_eq!(store.anon_count(), 0);
    }

    #[test]
    fn server_exhaustion_overrides_local_counter() {
        let mut tracker = QuotaTracker::default();
        let identity = Identity::anonymous(1);
        assert!(tracker.can_send(&identity));

        tracker.mark_exhausted();
        assert!(!tracker.can_send(&identity));

        // paid still bypasses
        assert!(tracker.can_send(&authenticated(1, true)));

        tracker.reset();
        assert!(tracker.can_send(&identity));
    }
}
