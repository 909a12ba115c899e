//! InMemoryClaimStore - SETNX over a mutex-guarded map.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::domain::{IdempotencyClaim, StoreError};
use crate::ports::ClaimStore;

struct Entry {
    claim: IdempotencyClaim,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| now < at)
    }
}

#[derive(Default)]
pub struct InMemoryClaimStore {
    claims: Mutex<HashMap<String, Entry>>,
}

impl InMemoryClaimStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims currently held, including expired ones not yet purged.
    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self.lock()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.lock()?.is_empty())
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, Entry>>, StoreError> {
        self.claims
            .lock()
            .map_err(|_| StoreError::Backend("claim store poisoned".to_string()))
    }
}

#[async_trait]
impl ClaimStore for InMemoryClaimStore {
    async fn set_if_absent(
        &self,
        claim: IdempotencyClaim,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut claims = self.lock()?;

        if claims
            .get(&claim.claim_key)
            .is_some_and(|entry| entry.is_live(now))
        {
            return Ok(false);
        }
        claims.insert(
            claim.claim_key.clone(),
            Entry {
                claim,
                expires_at: ttl.map(|ttl| now + ttl),
            },
        );
        Ok(true)
    }

    async fn get(&self, claim_key: &str) -> Result<Option<IdempotencyClaim>, StoreError> {
        let now = Instant::now();
        Ok(self
            .lock()?
            .get(claim_key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.claim.clone()))
    }

    async fn purge_expired(&self) -> Result<usize, StoreError> {
        let now = Instant::now();
        let mut claims = self.lock()?;
        let before = claims.len();
        claims.retain(|_, entry| entry.is_live(now));
        Ok(before - claims.len())
    }
}
