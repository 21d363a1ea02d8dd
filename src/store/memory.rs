// In-memory commitment store with the same conditional-write semantics as Postgres
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use uuid::Uuid;

use super::{models::*, CommitmentStore};
use crate::error::{AppError, AppResult};

#[derive(Default)]
struct State {
    commitments: HashMap<Uuid, Commitment>,
    check_ins: BTreeMap<(Uuid, NaiveDate), CheckIn>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    failing_commits: AtomicU32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, commitment: Commitment) {
        self.state.lock().commitments.insert(commitment.id, commitment);
    }

    pub fn get(&self, id: Uuid) -> Option<Commitment> {
        self.state.lock().commitments.get(&id).cloned()
    }

    /// Make the next `n` calls to `mark_settled` fail as if the database were unreachable
    pub fn fail_next_commits(&self, n: u32) {
        self.failing_commits.store(n, Ordering::SeqCst);
    }

    /// Backdate a claim so the next scan sees it as stale
    pub fn age_claim(&self, id: Uuid, by: Duration) {
        if let Some(c) = self.state.lock().commitments.get_mut(&id) {
            c.claimed_at = c.claimed_at.map(|at| at - by);
        }
    }
}

/// Builds a commitment that ended yesterday
pub fn resolved_commitment(
    wallet_address: &str,
    stake_amount: Decimal,
    status: CommitmentStatus,
) -> Commitment {
    let end_date = Utc::now().date_naive() - Duration::days(1);
    Commitment {
        id: Uuid::new_v4(),
        wallet_address: wallet_address.to_string(),
        description: "Read for 20 minutes".to_string(),
        stake_amount,
        start_date: end_date - Duration::days(365),
        end_date,
        status,
        processed: None,
        transaction_signature: None,
        settlement_state: SettlementState::Pending,
        claim_token: None,
        claimed_at: None,
        settlement_attempts: 0,
        last_settlement_error: None,
        last_error_permanent: false,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

#[async_trait]
impl CommitmentStore for MemoryStore {
    async fn get_commitment(&self, id: Uuid) -> AppResult<Option<Commitment>> {
        Ok(self.get(id))
    }

    async fn list_by_wallet(&self, wallet_address: &str) -> AppResult<Vec<Commitment>> {
        let state = self.state.lock();
        let mut commitments: Vec<Commitment> = state
            .commitments
            .values()
            .filter(|c| c.wallet_address == wallet_address)
            .cloned()
            .collect();
        commitments.sort_by_key(|c| (std::cmp::Reverse(c.created_at), c.id));
        Ok(commitments)
    }

    async fn list_settleable(&self, stale_before: DateTime<Utc>) -> AppResult<Vec<Commitment>> {
        let state = self.state.lock();
        let mut commitments: Vec<Commitment> = state
            .commitments
            .values()
            .filter(|c| c.status.is_resolved() && !c.is_processed())
            .filter(|c| match c.settlement_state {
                SettlementState::Pending => true,
                SettlementState::Submitting => c.claimed_at.map_or(true, |at| at < stale_before),
                SettlementState::Settled => false,
            })
            .cloned()
            .collect();
        commitments.sort_by_key(|c| (c.end_date, c.created_at, c.id));
        Ok(commitments)
    }

    async fn list_due_for_evaluation(&self, today: NaiveDate) -> AppResult<Vec<Commitment>> {
        let state = self.state.lock();
        let mut commitments: Vec<Commitment> = state
            .commitments
            .values()
            .filter(|c| c.status == CommitmentStatus::Active)
            .filter(|c| {
                let recorded = state.check_ins.keys().filter(|(id, _)| *id == c.id).count() as i64;
                c.end_date <= today || recorded >= c.period_days()
            })
            .cloned()
            .collect();
        commitments.sort_by_key(|c| c.end_date);
        Ok(commitments)
    }

    async fn resolve(&self, id: Uuid, status: CommitmentStatus) -> AppResult<bool> {
        let mut state = self.state.lock();
        match state.commitments.get_mut(&id) {
            Some(c) if c.status == CommitmentStatus::Active => {
                c.status = status;
                c.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn check_in_counts(&self, id: Uuid) -> AppResult<CheckInCounts> {
        let check_ins = self.list_check_ins(id).await?;
        Ok(CheckInCounts::from_check_ins(&check_ins))
    }

    async fn list_check_ins(&self, id: Uuid) -> AppResult<Vec<CheckIn>> {
        let state = self.state.lock();
        Ok(state
            .check_ins
            .range((id, NaiveDate::MIN)..=(id, NaiveDate::MAX))
            .map(|(_, c)| c.clone())
            .collect())
    }

    async fn upsert_check_in(&self, id: Uuid, date: NaiveDate, completed: bool) -> AppResult<CheckIn> {
        let mut state = self.state.lock();
        let check_in = state
            .check_ins
            .entry((id, date))
            .and_modify(|c| c.completed = completed)
            .or_insert_with(|| CheckIn {
                commitment_id: id,
                date,
                completed,
                created_at: Utc::now(),
            })
            .clone();
        Ok(check_in)
    }

    async fn claim(&self, id: Uuid, token: Uuid) -> AppResult<bool> {
        let mut state = self.state.lock();
        match state.commitments.get_mut(&id) {
            Some(c)
                if c.settlement_state == SettlementState::Pending
                    && !c.is_processed()
                    && c.status.is_resolved() =>
            {
                c.settlement_state = SettlementState::Submitting;
                c.claim_token = Some(token);
                c.claimed_at = Some(Utc::now());
                c.settlement_attempts += 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn reclaim(&self, id: Uuid, previous: Uuid, token: Uuid) -> AppResult<bool> {
        let mut state = self.state.lock();
        match state.commitments.get_mut(&id) {
            Some(c)
                if c.settlement_state == SettlementState::Submitting
                    && c.claim_token == Some(previous)
                    && !c.is_processed() =>
            {
                c.claim_token = Some(token);
                c.claimed_at = Some(Utc::now());
                c.settlement_attempts += 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn renew_claim(&self, id: Uuid, token: Uuid) -> AppResult<bool> {
        let mut state = self.state.lock();
        match state.commitments.get_mut(&id) {
            Some(c)
                if c.settlement_state == SettlementState::Submitting
                    && c.claim_token == Some(token)
                    && !c.is_processed() =>
            {
                c.claimed_at = Some(Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release_claim(&self, id: Uuid, token: Uuid, error: &str, permanent: bool) -> AppResult<bool> {
        let mut state = self.state.lock();
        match state.commitments.get_mut(&id) {
            Some(c)
                if c.settlement_state == SettlementState::Submitting
                    && c.claim_token == Some(token) =>
            {
                c.settlement_state = SettlementState::Pending;
                c.claim_token = None;
                c.claimed_at = None;
                c.last_settlement_error = Some(error.to_string());
                c.last_error_permanent = permanent;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn note_failure(&self, id: Uuid, token: Uuid, error: &str) -> AppResult<bool> {
        let mut state = self.state.lock();
        match state.commitments.get_mut(&id) {
            Some(c) if c.claim_token == Some(token) && !c.is_processed() => {
                c.last_settlement_error = Some(error.to_string());
                c.last_error_permanent = false;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_settled(&self, id: Uuid, signature: &str) -> AppResult<bool> {
        let remaining = self.failing_commits.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_commits.store(remaining - 1, Ordering::SeqCst);
            return Err(AppError::Internal("store unreachable".to_string()));
        }

        let mut state = self.state.lock();
        match state.commitments.get_mut(&id) {
            Some(c) if !c.is_processed() => {
                c.processed = Some(true);
                c.transaction_signature = Some(signature.to_string());
                c.settlement_state = SettlementState::Settled;
                c.claim_token = None;
                c.last_settlement_error = None;
                c.last_error_permanent = false;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_check_in_upsert_overwrites() {
        let store = MemoryStore::new();
        let id = Uuid::new_v4();
        let day = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();

        store.upsert_check_in(id, day, false).await.unwrap();
        store.upsert_check_in(id, day, true).await.unwrap();

        let check_ins = store.list_check_ins(id).await.unwrap();
        assert_eq!(check_ins.len(), 1);
        assert!(check_ins[0].completed);
    }

    #[tokio::test]
    async fn test_check_ins_ordered_by_date() {
        let store = MemoryStore::new();
        let id = Uuid::new_v4();
        let other = Uuid::new_v4();
        let day = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();

        store.upsert_check_in(id, day + Duration::days(2), true).await.unwrap();
        store.upsert_check_in(id, day, false).await.unwrap();
        store.upsert_check_in(other, day, true).await.unwrap();

        let dates: Vec<NaiveDate> = store
            .list_check_ins(id)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.date)
            .collect();
        assert_eq!(dates, vec![day, day + Duration::days(2)]);
    }

    #[tokio::test]
    async fn test_claim_is_exclusive() {
        let store = MemoryStore::new();
        let c = resolved_commitment("wallet", dec!(1), CommitmentStatus::ResolvedSuccess);
        let id = c.id;
        store.insert(c);

        assert!(store.claim(id, Uuid::new_v4()).await.unwrap());
        assert!(!store.claim(id, Uuid::new_v4()).await.unwrap());
    }

    #[tokio::test]
    async fn test_renew_only_for_current_holder() {
        let store = MemoryStore::new();
        let c = resolved_commitment("wallet", dec!(1), CommitmentStatus::ResolvedSuccess);
        let id = c.id;
        store.insert(c);

        let (first, second) = (Uuid::new_v4(), Uuid::new_v4());
        store.claim(id, first).await.unwrap();
        store.age_claim(id, Duration::seconds(900));
        assert!(store.reclaim(id, first, second).await.unwrap());

        assert!(!store.renew_claim(id, first).await.unwrap());
        assert!(store.renew_claim(id, second).await.unwrap());
    }

    #[tokio::test]
    async fn test_mark_settled_only_once() {
        let store = MemoryStore::new();
        let c = resolved_commitment("wallet", dec!(1), CommitmentStatus::ResolvedFailure);
        let id = c.id;
        store.insert(c);

        assert!(store.mark_settled(id, "sig-1").await.unwrap());
        assert!(!store.mark_settled(id, "sig-2").await.unwrap());
        assert_eq!(store.get(id).unwrap().transaction_signature.as_deref(), Some("sig-1"));
    }
}
