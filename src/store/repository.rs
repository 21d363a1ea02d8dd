use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgPool, Row};
use tracing::{info, warn};
use uuid::Uuid;

use super::{models::*, CommitmentStore};
use crate::error::AppResult;

const COMMITMENT_COLUMNS: &str = r#"
    id, wallet_address, description, stake_amount, start_date, end_date, status,
    processed, transaction_signature, settlement_state, claim_token, claimed_at,
    settlement_attempts, last_settlement_error, last_error_permanent,
    created_at, updated_at
"#;

/// Postgres-backed commitment store
pub struct PgCommitmentStore {
    pub pool: PgPool,
}

impl PgCommitmentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CommitmentStore for PgCommitmentStore {
    async fn get_commitment(&self, id: Uuid) -> AppResult<Option<Commitment>> {
        let commitment = sqlx::query_as::<_, Commitment>(&format!(
            "SELECT {} FROM commitments WHERE id = $1",
            COMMITMENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(commitment)
    }

    async fn list_by_wallet(&self, wallet_address: &str) -> AppResult<Vec<Commitment>> {
        let commitments = sqlx::query_as::<_, Commitment>(&format!(
            r#"
            SELECT {}
            FROM commitments
            WHERE wallet_address = $1
            ORDER BY created_at DESC, id ASC
            "#,
            COMMITMENT_COLUMNS
        ))
        .bind(wallet_address)
        .fetch_all(&self.pool)
        .await?;

        Ok(commitments)
    }

    async fn list_settleable(&self, stale_before: DateTime<Utc>) -> AppResult<Vec<Commitment>> {
        let commitments = sqlx::query_as::<_, Commitment>(&format!(
            r#"
            SELECT {}
            FROM commitments
            WHERE status IN ('resolved_success', 'resolved_failure')
              AND processed IS NOT TRUE
              AND (
                settlement_state = 'pending'
                OR (settlement_state = 'submitting' AND claimed_at < $1)
              )
            ORDER BY end_date ASC, id ASC
            "#,
            COMMITMENT_COLUMNS
        ))
        .bind(stale_before)
        .fetch_all(&self.pool)
        .await?;

        Ok(commitments)
    }

    async fn list_due_for_evaluation(&self, today: NaiveDate) -> AppResult<Vec<Commitment>> {
        let commitments = sqlx::query_as::<_, Commitment>(&format!(
            r#"
            SELECT {}
            FROM commitments c
            WHERE c.status = 'active'
              AND (
                c.end_date <= $1
                OR (
                  SELECT COUNT(*) FROM check_ins ci WHERE ci.commitment_id = c.id
                ) >= (c.end_date - c.start_date)
              )
            ORDER BY c.end_date ASC
            "#,
            COMMITMENT_COLUMNS
        ))
        .bind(today)
        .fetch_all(&self.pool)
        .await?;

        Ok(commitments)
    }

    async fn resolve(&self, id: Uuid, status: CommitmentStatus) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE commitments
            SET status = $2, updated_at = NOW()
            WHERE id = $1 AND status = 'active'
            "#,
        )
        .bind(id)
        .bind(status)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            info!("Commitment {} resolved as {}", id, status);
        }
        Ok(result.rows_affected() == 1)
    }

    async fn check_in_counts(&self, id: Uuid) -> AppResult<CheckInCounts> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE completed) AS successful_days,
                COUNT(*) FILTER (WHERE NOT completed) AS failed_days
            FROM check_ins
            WHERE commitment_id = $1
            "#,
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;

        Ok(CheckInCounts {
            successful_days: row.try_get("successful_days")?,
            failed_days: row.try_get("failed_days")?,
        })
    }

    async fn list_check_ins(&self, id: Uuid) -> AppResult<Vec<CheckIn>> {
        let check_ins = sqlx::query_as::<_, CheckIn>(
            r#"
            SELECT commitment_id, date, completed, created_at
            FROM check_ins
            WHERE commitment_id = $1
            ORDER BY date ASC
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(check_ins)
    }

    async fn upsert_check_in(&self, id: Uuid, date: NaiveDate, completed: bool) -> AppResult<CheckIn> {
        let check_in = sqlx::query_as::<_, CheckIn>(
            r#"
            INSERT INTO check_ins (commitment_id, date, completed)
            VALUES ($1, $2, $3)
            ON CONFLICT (commitment_id, date)
            DO UPDATE SET completed = EXCLUDED.completed
            RETURNING commitment_id, date, completed, created_at
            "#,
        )
        .bind(id)
        .bind(date)
        .bind(completed)
        .fetch_one(&self.pool)
        .await?;

        Ok(check_in)
    }

    async fn claim(&self, id: Uuid, token: Uuid) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE commitments
            SET settlement_state = 'submitting',
                claim_token = $2,
                claimed_at = NOW(),
                settlement_attempts = settlement_attempts + 1,
                updated_at = NOW()
            WHERE id = $1
              AND settlement_state = 'pending'
              AND processed IS NOT TRUE
              AND status <> 'active'
            "#,
        )
        .bind(id)
        .bind(token)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn reclaim(&self, id: Uuid, previous: Uuid, token: Uuid) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE commitments
            SET claim_token = $3,
                claimed_at = NOW(),
                settlement_attempts = settlement_attempts + 1,
                updated_at = NOW()
            WHERE id = $1
              AND settlement_state = 'submitting'
              AND claim_token = $2
              AND processed IS NOT TRUE
            "#,
        )
        .bind(id)
        .bind(previous)
        .bind(token)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn renew_claim(&self, id: Uuid, token: Uuid) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE commitments
            SET claimed_at = NOW(),
                updated_at = NOW()
            WHERE id = $1
              AND settlement_state = 'submitting'
              AND claim_token = $2
              AND processed IS NOT TRUE
            "#,
        )
        .bind(id)
        .bind(token)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn release_claim(&self, id: Uuid, token: Uuid, error: &str, permanent: bool) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE commitments
            SET settlement_state = 'pending',
                claim_token = NULL,
                claimed_at = NULL,
                last_settlement_error = $3,
                last_error_permanent = $4,
                updated_at = NOW()
            WHERE id = $1
              AND settlement_state = 'submitting'
              AND claim_token = $2
            "#,
        )
        .bind(id)
        .bind(token)
        .bind(error)
        .bind(permanent)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            warn!("Claim {} on commitment {} was no longer held at release", token, id);
        }
        Ok(result.rows_affected() == 1)
    }

    async fn note_failure(&self, id: Uuid, token: Uuid, error: &str) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE commitments
            SET last_settlement_error = $3,
                last_error_permanent = FALSE,
                updated_at = NOW()
            WHERE id = $1 AND claim_token = $2 AND processed IS NOT TRUE
            "#,
        )
        .bind(id)
        .bind(token)
        .bind(error)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn mark_settled(&self, id: Uuid, signature: &str) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE commitments
            SET processed = TRUE,
                transaction_signature = $2,
                settlement_state = 'settled',
                claim_token = NULL,
                last_settlement_error = NULL,
                last_error_permanent = FALSE,
                updated_at = NOW()
            WHERE id = $1 AND processed IS NOT TRUE
            "#,
        )
        .bind(id)
        .bind(signature)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
