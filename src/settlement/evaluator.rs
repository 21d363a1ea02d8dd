// Commitment evaluator - turns finished active commitments into resolved ones
use chrono::NaiveDate;
use tracing::{info, warn};

use crate::{
    error::AppResult,
    store::{CheckInCounts, Commitment, CommitmentStatus, CommitmentStore},
};

#[derive(Debug, Clone, Copy)]
pub struct CommitmentEvaluator {
    /// Share of the period that must be completed, in basis points
    success_threshold_bps: u32,
}

impl CommitmentEvaluator {
    pub fn new(success_threshold_bps: u32) -> Self {
        Self {
            success_threshold_bps: success_threshold_bps.min(10_000),
        }
    }

    /// Outcome of a finished commitment from its check-ins
    ///
    /// Days without a check-in count against the user; zero successful days
    /// is always a failure.
    pub fn outcome(&self, commitment: &Commitment, counts: CheckInCounts) -> CommitmentStatus {
        let period_days = commitment.period_days().max(1);
        let required = i128::from(self.success_threshold_bps) * i128::from(period_days);
        let achieved = i128::from(counts.successful_days) * 10_000;

        if counts.successful_days > 0 && achieved >= required {
            CommitmentStatus::ResolvedSuccess
        } else {
            CommitmentStatus::ResolvedFailure
        }
    }

    /// Resolve every commitment that is due, returning how many were resolved
    pub async fn evaluate_due(&self, store: &dyn CommitmentStore, today: NaiveDate) -> AppResult<usize> {
        let due = store.list_due_for_evaluation(today).await?;
        if due.is_empty() {
            return Ok(0);
        }

        info!("📊 Evaluating {} finished commitments", due.len());

        let mut resolved = 0;
        for commitment in due {
            let counts = match store.check_in_counts(commitment.id).await {
                Ok(counts) => counts,
                Err(e) => {
                    warn!("Skipping evaluation of {}: {}", commitment.id, e);
                    continue;
                }
            };

            let status = self.outcome(&commitment, counts);
            match store.resolve(commitment.id, status).await {
                Ok(true) => {
                    info!(
                        "Commitment {} -> {} ({} successful, {} failed days)",
                        commitment.id, status, counts.successful_days, counts.failed_days
                    );
                    resolved += 1;
                }
                Ok(false) => info!("Commitment {} already resolved elsewhere", commitment.id),
                Err(e) => warn!("Failed to resolve {}: {}", commitment.id, e),
            }
        }

        Ok(resolved)
    }
}
