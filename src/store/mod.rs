// Commitment store - persistence of commitments and daily check-ins
pub mod models;
pub mod repository;

#[cfg(test)]
pub mod memory;

pub use models::{CheckIn, CheckInCounts, Commitment, CommitmentStatus, SettlementState};
pub use repository::PgCommitmentStore;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::error::AppResult;

/// Commitment store - THE source of truth for settlement state
///
/// Every mutating settlement operation is a conditional write: it returns
/// `Ok(false)` when the row is no longer in the expected state, which the
/// caller treats as "another run got there first".
#[async_trait]
pub trait CommitmentStore: Send + Sync {
    async fn get_commitment(&self, id: Uuid) -> AppResult<Option<Commitment>>;

    /// Every commitment staked from `wallet_address`, newest first
    async fn list_by_wallet(&self, wallet_address: &str) -> AppResult<Vec<Commitment>>;

    /// Resolved, unprocessed commitments that are `pending`, or `submitting`
    /// with a claim taken before `stale_before`
    async fn list_settleable(&self, stale_before: DateTime<Utc>) -> AppResult<Vec<Commitment>>;

    /// Active commitments whose end date is on or before `today`, or whose
    /// check-ins already cover the whole period
    async fn list_due_for_evaluation(&self, today: NaiveDate) -> AppResult<Vec<Commitment>>;

    /// `active -> status`, only if still active
    async fn resolve(&self, id: Uuid, status: CommitmentStatus) -> AppResult<bool>;

    async fn check_in_counts(&self, id: Uuid) -> AppResult<CheckInCounts>;

    /// Check-ins ordered by date ascending
    async fn list_check_ins(&self, id: Uuid) -> AppResult<Vec<CheckIn>>;

    /// Insert or overwrite the check-in for `(id, date)`
    async fn upsert_check_in(&self, id: Uuid, date: NaiveDate, completed: bool) -> AppResult<CheckIn>;

    /// `pending -> submitting` under `token`
    async fn claim(&self, id: Uuid, token: Uuid) -> AppResult<bool>;

    /// Take over a stale `submitting` claim held under `previous`
    async fn reclaim(&self, id: Uuid, previous: Uuid, token: Uuid) -> AppResult<bool>;

    /// Confirm `token` still holds the claim and restart its timeout
    ///
    /// Checked immediately before a transaction is broadcast.
    async fn renew_claim(&self, id: Uuid, token: Uuid) -> AppResult<bool>;

    /// `submitting -> pending`, recording why the submission failed
    async fn release_claim(&self, id: Uuid, token: Uuid, error: &str, permanent: bool) -> AppResult<bool>;

    /// Record an error while keeping the claim in `submitting`
    async fn note_failure(&self, id: Uuid, token: Uuid, error: &str) -> AppResult<bool>;

    /// Set `processed = true` and the signature, only if still unprocessed
    async fn mark_settled(&self, id: Uuid, signature: &str) -> AppResult<bool>;
}
