// Settlement executor - claims, pays out and records one commitment
//
// Per-commitment state machine:
//   pending --claim--> submitting --commit--> settled
//                      submitting --release--> pending      (nothing broadcast)
//                      submitting (stale) --reconcile--> settled | submitting (reclaimed)
//
// A confirmed transfer is never resubmitted: only its commit is retried.
// The claim is renewed right before broadcast, under the treasury signer, so a
// run whose claim was taken over while it waited never sends.

use async_trait::async_trait;
use serde::Serialize;
use std::{sync::Arc, time::Duration};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    error::{AppResult, LedgerError},
    execution::{BroadcastGate, LedgerClient, TransferRequest},
    settlement::resolver::PayoutResolver,
    store::{Commitment, CommitmentStore, SettlementState},
};

/// Result of settling one commitment
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SettlementOutcome {
    /// This run recorded the payout
    Settled { signature: String, reconciled: bool },
    /// Another run recorded the payout first
    AlreadySettled,
    /// Another run holds the claim
    ClaimedElsewhere,
    Failed {
        error: String,
        /// Retrying will not help without operator attention
        permanent: bool,
        /// A transfer may exist on-chain; left `submitting` for reconciliation
        awaiting_reconciliation: bool,
    },
}

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub commit_retries: u32,
    pub commit_backoff: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            commit_retries: 5,
            commit_backoff: Duration::from_millis(200),
        }
    }
}

/// Lets a transfer through only while `token` still holds the claim
struct ClaimGate<'a> {
    store: &'a dyn CommitmentStore,
    id: Uuid,
    token: Uuid,
}

#[async_trait]
impl BroadcastGate for ClaimGate<'_> {
    async fn may_broadcast(&self) -> AppResult<bool> {
        self.store.renew_claim(self.id, self.token).await
    }
}

pub struct SettlementExecutor {
    store: Arc<dyn CommitmentStore>,
    ledger: Arc<dyn LedgerClient>,
    resolver: PayoutResolver,
    config: ExecutorConfig,
}

impl SettlementExecutor {
    pub fn new(
        store: Arc<dyn CommitmentStore>,
        ledger: Arc<dyn LedgerClient>,
        resolver: PayoutResolver,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            store,
            ledger,
            resolver,
            config,
        }
    }

    /// Settle one commitment. Never fails: store errors become `Failed`.
    #[instrument(skip(self, commitment), fields(commitment_id = %commitment.id))]
    pub async fn settle(&self, commitment: &Commitment) -> SettlementOutcome {
        match self.try_settle(commitment).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Settlement of {} aborted: {}", commitment.id, e);
                SettlementOutcome::Failed {
                    error: e.to_string(),
                    permanent: false,
                    awaiting_reconciliation: commitment.settlement_state
                        == SettlementState::Submitting,
                }
            }
        }
    }

    async fn try_settle(&self, commitment: &Commitment) -> AppResult<SettlementOutcome> {
        if commitment.is_processed() {
            return Ok(SettlementOutcome::AlreadySettled);
        }

        let token = Uuid::new_v4();
        let reference = commitment.settlement_reference();

        match commitment.settlement_state {
            SettlementState::Settled => return Ok(SettlementOutcome::AlreadySettled),
            SettlementState::Pending => {
                if !self.store.claim(commitment.id, token).await? {
                    info!("Commitment {} claimed by another run", commitment.id);
                    return Ok(SettlementOutcome::ClaimedElsewhere);
                }
            }
            SettlementState::Submitting => {
                let Some(previous) = commitment.claim_token else {
                    warn!("Commitment {} is submitting without a claim token", commitment.id);
                    return Ok(SettlementOutcome::ClaimedElsewhere);
                };

                // A previous run may have paid out without recording it
                match self.ledger.find_transfer(&reference).await {
                    Ok(Some(signature)) => {
                        info!("Reconciled {} with prior transfer {}", commitment.id, signature);
                        return Ok(self.commit(commitment.id, signature, true).await);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!("Reconciliation lookup for {} failed: {}", commitment.id, e);
                        return Ok(SettlementOutcome::Failed {
                            error: format!("Reconciliation lookup failed: {}", e),
                            permanent: false,
                            awaiting_reconciliation: true,
                        });
                    }
                }

                if !self.store.reclaim(commitment.id, previous, token).await? {
                    return Ok(SettlementOutcome::ClaimedElsewhere);
                }
                info!("Reclaimed stale claim on {}, resubmitting", commitment.id);
            }
        }

        let counts = match self.store.check_in_counts(commitment.id).await {
            Ok(counts) => counts,
            Err(e) => return Ok(self.fail(commitment.id, token, e.to_string(), false, false).await),
        };

        let payout = match self.resolver.resolve(commitment, counts) {
            Ok(payout) => payout,
            Err(e) => {
                return Ok(self
                    .fail(commitment.id, token, e.to_string(), e.is_permanent(), false)
                    .await)
            }
        };

        info!(
            "Submitting {:?} of {} lamports to {}",
            payout.kind, payout.lamports, payout.destination
        );

        let request = TransferRequest {
            destination: payout.destination,
            lamports: payout.lamports,
            reference,
        };

        let gate = ClaimGate {
            store: self.store.as_ref(),
            id: commitment.id,
            token,
        };

        match self.ledger.transfer(&request, &gate).await {
            Ok(signature) => Ok(self.commit(commitment.id, signature, false).await),
            Err(LedgerError::Aborted(reason)) => Ok(self.abort(commitment.id, token, reason).await),
            Err(e) => Ok(self
                .fail(commitment.id, token, e.to_string(), e.is_permanent(), e.may_have_landed())
                .await),
        }
    }

    /// Record a confirmed transfer, retrying the write but never the transfer
    async fn commit(&self, id: Uuid, signature: String, reconciled: bool) -> SettlementOutcome {
        if signature.is_empty() {
            error!("Ledger returned an empty signature for {}", id);
            return SettlementOutcome::Failed {
                error: "Ledger returned an empty signature".to_string(),
                permanent: false,
                awaiting_reconciliation: true,
            };
        }

        let attempts = self.config.commit_retries.max(1);
        let mut delay = self.config.commit_backoff;

        for attempt in 1..=attempts {
            match self.store.mark_settled(id, &signature).await {
                Ok(true) => {
                    info!("✅ Commitment {} settled: {}", id, signature);
                    return SettlementOutcome::Settled { signature, reconciled };
                }
                Ok(false) if reconciled => {
                    info!("Commitment {} was already recorded by another run", id);
                    return SettlementOutcome::AlreadySettled;
                }
                Ok(false) => {
                    // This run's own transfer landed on a row someone else settled
                    error!(
                        "❌ Transfer {} confirmed for {} but another settlement was recorded first",
                        signature, id
                    );
                    return SettlementOutcome::Failed {
                        error: format!(
                            "Transfer {} confirmed but commitment was already settled",
                            signature
                        ),
                        permanent: true,
                        awaiting_reconciliation: false,
                    };
                }
                Err(e) => {
                    warn!(
                        "Commit of {} for {} failed (attempt {}/{}): {}",
                        signature, id, attempt, attempts, e
                    );
                    if attempt < attempts {
                        tokio::time::sleep(delay).await;
                        delay = delay.saturating_mul(2);
                    }
                }
            }
        }

        error!(
            "❌ Transfer {} for {} confirmed but not recorded; left for reconciliation",
            signature, id
        );
        SettlementOutcome::Failed {
            error: format!("Transfer {} confirmed but not recorded", signature),
            permanent: false,
            awaiting_reconciliation: true,
        }
    }

    /// The ledger refused to broadcast; nothing left the process
    async fn abort(&self, id: Uuid, token: Uuid, reason: String) -> SettlementOutcome {
        match self.store.release_claim(id, token, &reason, false).await {
            Ok(false) => {
                info!("Claim on {} was taken over before broadcast", id);
                SettlementOutcome::ClaimedElsewhere
            }
            Ok(true) => SettlementOutcome::Failed {
                error: reason,
                permanent: false,
                awaiting_reconciliation: false,
            },
            Err(e) => {
                error!("Failed to release claim on {}: {}", id, e);
                SettlementOutcome::Failed {
                    error: reason,
                    permanent: false,
                    awaiting_reconciliation: false,
                }
            }
        }
    }

    /// Report a failed attempt, releasing the claim unless funds may have moved
    async fn fail(
        &self,
        id: Uuid,
        token: Uuid,
        error: String,
        permanent: bool,
        may_have_landed: bool,
    ) -> SettlementOutcome {
        if may_have_landed {
            warn!("Submission for {} unconfirmed: {}", id, error);
            if let Err(e) = self.store.note_failure(id, token, &error).await {
                error!("Failed to record error on {}: {}", id, e);
            }
        } else {
            warn!("Submission for {} failed (permanent: {}): {}", id, permanent, error);
            if let Err(e) = self.store.release_claim(id, token, &error, permanent).await {
                error!("Failed to release claim on {}: {}", id, e);
            }
        }

        SettlementOutcome::Failed {
            error,
            permanent,
            awaiting_reconciliation: may_have_landed,
        }
    }
}
