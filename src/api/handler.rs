use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, Method},
    Json,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::models::*;
use crate::{
    error::{AppError, AppResult, SettlementError},
    settlement::{SettlementService, SettlementSummary},
    store::{CheckIn, Commitment, CommitmentStore},
};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn CommitmentStore>,
    pub service: Arc<SettlementService>,
    /// When set, `/settle` requires `Authorization: Bearer <token>`
    pub trigger_token: Option<String>,
}

/// Run one settlement pass
/// ANY /settle
///
/// OPTIONS never gets here: preflights are answered by the CORS layer and
/// anything else is refused before it.
pub async fn trigger_settlement(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
) -> AppResult<Json<SettlementSummary>> {
    authorize(&headers, state.trigger_token.as_deref())?;

    info!("Settlement pass triggered over HTTP ({})", method);
    let summary = state.service.run_pass().await?;

    Ok(Json(summary))
}

fn authorize(headers: &HeaderMap, expected: Option<&str>) -> AppResult<()> {
    let Some(expected) = expected else {
        return Ok(());
    };

    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match presented {
        Some(token) if token == expected => Ok(()),
        _ => {
            warn!("Rejected settlement trigger with missing or wrong token");
            Err(AppError::Unauthorized)
        }
    }
}

/// GET /health
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: Utc::now(),
    })
}

/// GET /api/v1/commitments?wallet=<address>
pub async fn list_commitments(
    State(state): State<AppState>,
    Query(query): Query<CommitmentsQuery>,
) -> AppResult<Json<Vec<Commitment>>> {
    let wallet = query.wallet.trim();
    if wallet.is_empty() {
        return Err(AppError::InvalidInput("wallet must not be empty".to_string()));
    }

    Ok(Json(state.store.list_by_wallet(wallet).await?))
}

/// GET /api/v1/commitments/:id
pub async fn get_commitment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Commitment>> {
    Ok(Json(find_commitment(&state, id).await?))
}

/// GET /api/v1/commitments/:id/check-ins
pub async fn list_check_ins(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<CheckIn>>> {
    find_commitment(&state, id).await?;
    Ok(Json(state.store.list_check_ins(id).await?))
}

/// Record a day as completed or missed
/// PUT /api/v1/commitments/:id/check-ins
///
/// Only days inside the period, up to today, of a still active commitment
/// can be written. Writing the same day again overwrites it.
pub async fn upsert_check_in(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<CheckInRequest>,
) -> AppResult<Json<CheckIn>> {
    let commitment = find_commitment(&state, id).await?;

    if request.date > Utc::now().date_naive() {
        return Err(SettlementError::CheckInRejected(format!(
            "{} is in the future",
            request.date
        ))
        .into());
    }

    if !commitment.accepts_check_in_on(request.date) {
        return Err(SettlementError::CheckInRejected(format!(
            "{} is outside the period of {} commitment {}",
            request.date, commitment.status, id
        ))
        .into());
    }

    let check_in = state
        .store
        .upsert_check_in(id, request.date, request.completed)
        .await?;

    info!(
        "Check-in for {} on {}: completed={}",
        id, check_in.date, check_in.completed
    );
    Ok(Json(check_in))
}

/// GET /api/v1/commitments/:id/progress
pub async fn get_progress(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ProgressResponse>> {
    let commitment = find_commitment(&state, id).await?;
    let counts = state.store.check_in_counts(id).await?;

    Ok(Json(ProgressResponse::new(&commitment, counts)))
}

async fn find_commitment(state: &AppState, id: Uuid) -> AppResult<Commitment> {
    state
        .store
        .get_commitment(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Commitment {}", id)))
}
