use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, Type};
use std::fmt;
use uuid::Uuid;

/// Evaluation outcome of a commitment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[sqlx(type_name = "commitment_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CommitmentStatus {
    Active,
    ResolvedSuccess,
    ResolvedFailure,
}

impl CommitmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommitmentStatus::Active => "active",
            CommitmentStatus::ResolvedSuccess => "resolved_success",
            CommitmentStatus::ResolvedFailure => "resolved_failure",
        }
    }

    pub fn is_resolved(&self) -> bool {
        !matches!(self, CommitmentStatus::Active)
    }
}

impl fmt::Display for CommitmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Payout progress of a resolved commitment
///
/// Valid transitions:
/// - Pending → Submitting (claim)
/// - Submitting → Settled (commit), Pending (release), Submitting (reclaim)
/// - Settled is terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[sqlx(type_name = "settlement_state", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SettlementState {
    Pending,
    Submitting,
    Settled,
}

/// A user's staked resolution record
///
/// INVARIANT: `transaction_signature` is non-empty iff `processed == Some(true)`
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Commitment {
    pub id: Uuid,
    pub wallet_address: String,
    pub description: String,
    /// Whole SOL, at most 9 fractional digits
    #[serde(with = "rust_decimal::serde::str")]
    pub stake_amount: Decimal,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: CommitmentStatus,

    // Settlement
    pub processed: Option<bool>,
    pub transaction_signature: Option<String>,
    pub settlement_state: SettlementState,
    pub claim_token: Option<Uuid>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub settlement_attempts: i32,
    pub last_settlement_error: Option<String>,
    pub last_error_permanent: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Commitment {
    pub fn is_processed(&self) -> bool {
        self.processed == Some(true)
    }

    /// Number of days in the commitment period
    pub fn period_days(&self) -> i64 {
        (self.end_date - self.start_date).num_days()
    }

    /// Memo attached to the payout transfer, used to find it again on-chain
    pub fn settlement_reference(&self) -> String {
        settlement_reference(self.id)
    }

    /// A check-in date must fall inside `[start_date, end_date)`
    pub fn accepts_check_in_on(&self, date: NaiveDate) -> bool {
        self.status == CommitmentStatus::Active && date >= self.start_date && date < self.end_date
    }
}

pub fn settlement_reference(commitment_id: Uuid) -> String {
    format!("resolute:{}", commitment_id)
}

/// Daily check-in, unique per (commitment, date)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct CheckIn {
    pub commitment_id: Uuid,
    pub date: NaiveDate,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
}

/// Aggregated check-in counts for one commitment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckInCounts {
    pub successful_days: i64,
    pub failed_days: i64,
}

impl CheckInCounts {
    pub fn total(&self) -> i64 {
        self.successful_days + self.failed_days
    }

    #[cfg(test)]
    pub fn from_check_ins(check_ins: &[CheckIn]) -> Self {
        let successful_days = check_ins.iter().filter(|c| c.completed).count() as i64;
        Self {
            successful_days,
            failed_days: check_ins.len() as i64 - successful_days,
        }
    }
}
