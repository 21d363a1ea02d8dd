use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::store::{CheckInCounts, Commitment, CommitmentStatus};

// ========== REQUEST MODELS ==========

/// Record (or overwrite) one day's check-in
#[derive(Debug, Deserialize)]
pub struct CheckInRequest {
    pub date: NaiveDate,
    pub completed: bool,
}

#[derive(Debug, Deserialize)]
pub struct CommitmentsQuery {
    pub wallet: String,
}

// ========== RESPONSE MODELS ==========

/// Day counts for a commitment; days without a check-in are remaining
#[derive(Debug, Serialize)]
pub struct ProgressResponse {
    pub commitment_id: Uuid,
    pub status: CommitmentStatus,
    pub successful_days: i64,
    pub failed_days: i64,
    pub remaining_days: i64,
    #[serde(with = "rust_decimal::serde::str")]
    pub stake_amount: Decimal,
    pub processed: bool,
}

impl ProgressResponse {
    pub fn new(commitment: &Commitment, counts: CheckInCounts) -> Self {
        Self {
            commitment_id: commitment.id,
            status: commitment.status,
            successful_days: counts.successful_days,
            failed_days: counts.failed_days,
            remaining_days: (commitment.period_days() - counts.total()).max(0),
            stake_amount: commitment.stake_amount,
            processed: commitment.is_processed(),
        }
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
}
