//! ClaimStore port - atomic set-if-absent used by the idempotency guard.

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{IdempotencyClaim, StoreError};

#[async_trait]
pub trait ClaimStore: Send + Sync {
    /// Store `claim` under its key unless the key already exists (SETNX).
    ///
    /// Returns `true` if this call created the claim. A `false` result must not
    /// have changed anything. `ttl` of `None` keeps the claim forever.
    async fn set_if_absent(
        &self,
        claim: IdempotencyClaim,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError>;

    async fn get(&self, claim_key: &str) -> Result<Option<IdempotencyClaim>, StoreError>;

    /// Drop claims whose ttl has elapsed. Default: nothing to do.
    async fn purge_expired(&self) -> Result<usize, StoreError> {
        Ok(0)
    }
}
