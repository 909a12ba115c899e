//! Idempotency guard - "run this side effect at most once".
//!
//! Delivery is at-least-once, so a handler with an external effect can be
//! invoked twice for the same logical work. The handler claims a key that
//! names the work (`order:{id}:processed`) before doing the effect; only the
//! caller that creates the claim proceeds.
//!
//! The claim is a single set-if-absent on the claim store. A claim taken by a
//! handler that then crashes before finishing the effect stays taken; the
//! effect is then lost rather than duplicated.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::domain::{IdempotencyClaim, StoreError};
use crate::ports::{ClaimStore, Clock};

#[derive(Clone)]
pub struct IdempotencyGuard {
    store: Arc<dyn ClaimStore>,
    clock: Arc<dyn Clock>,
    ttl: Option<Duration>,
}

impl IdempotencyGuard {
    pub fn new(store: Arc<dyn ClaimStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            ttl: None,
        }
    }

    /// Let claims expire after `ttl` (then the work may run again).
    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl;
        self
    }

    /// `true` exactly once per key (until expiry). `false` means the work was
    /// already claimed; that is a normal outcome, not an error.
    pub async fn claim(&self, key: &str) -> Result<bool, StoreError> {
        let claim = IdempotencyClaim::new(key, self.clock.now());
        let claimed = self.store.set_if_absent(claim, self.ttl).await?;
        debug!(claim_key = key, claimed, "idempotency claim");
        Ok(claimed)
    }

    pub async fn claimed_at(&self, key: &str) -> Result<Option<IdempotencyClaim>, StoreError> {
        self.store.get(key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::InMemoryClaimStore;
    use crate::ports::SystemClock;

    fn guard() -> IdempotencyGuard {
        IdempotencyGuard::new(Arc::new(InMemoryClaimStore::new()), Arc::new(SystemClock))
    }

    #[tokio::test]
    async fn second_claim_fails() {
        let guard = guard();
        assert!(guard.claim("order:A1:processed").await.unwrap());
        assert!(!guard.claim("order:A1:processed").await.unwrap());
        assert!(guard.claim("order:B2:processed").await.unwrap());
        assert!(guard.claimed_at("order:A1:processed").await.unwrap().is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_claims_yield_exactly_one_winner() {
        let guard = guard();
        let mut joins = Vec::new();
        for _ in 0..64 {
            let guard = guard.clone();
            joins.push(tokio::spawn(async move { guard.claim("contested").await.unwrap() }));
        }

        let mut winners = 0;
        for join in joins {
            if join.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
