use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Proof that a logical unit of work was taken by someone.
///
/// For a given `claim_key` at most one claim is ever created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdempotencyClaim {
    pub claim_key: String,
    pub claimed_at: DateTime<Utc>,
}

impl IdempotencyClaim {
    pub fn new(claim_key: impl Into<String>, claimed_at: DateTime<Utc>) -> Self {
        Self {
            claim_key: claim_key.into(),
            claimed_at,
        }
    }
}
