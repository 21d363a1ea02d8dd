// Settlement scanner - selects commitments that still owe a payout
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::info;

use crate::{
    error::AppResult,
    store::{Commitment, CommitmentStore},
};

#[derive(Debug, Clone, Copy)]
pub struct SettlementScanner {
    /// A `submitting` claim older than this is assumed abandoned
    claim_timeout: chrono::Duration,
}

impl SettlementScanner {
    pub fn new(claim_timeout: Duration) -> Self {
        Self {
            claim_timeout: chrono::Duration::from_std(claim_timeout)
                .unwrap_or(chrono::Duration::MAX),
        }
    }

    /// Claims taken before this instant are stale; an unrepresentable
    /// timeout never expires a claim
    pub fn stale_before(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_signed(self.claim_timeout)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Point-in-time snapshot; the executor's conditional writes decide who settles
    pub async fn scan(&self, store: &dyn CommitmentStore, now: DateTime<Utc>) -> AppResult<Vec<Commitment>> {
        let candidates: Vec<Commitment> = store
            .list_settleable(self.stale_before(now))
            .await?
            .into_iter()
            .filter(|c| c.status.is_resolved() && !c.is_processed())
            .collect();

        info!("📊 Found {} commitments awaiting settlement", candidates.len());
        Ok(candidates)
    }
}
