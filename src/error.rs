use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use sqlx::migrate::MigrateError;
use thiserror::Error;
use uuid::Uuid;

/// Top-level error type for the entire application
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Settlement error: {0}")]
    Settlement(#[from] SettlementError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Method not allowed: {0}")]
    MethodNotAllowed(String),
}

/// Errors raised while deciding or recording a payout
#[derive(Error, Debug)]
pub enum SettlementError {
    #[error("Commitment {0} is still active")]
    NotResolved(Uuid),

    #[error("Invalid stake amount {amount}: {reason}")]
    InvalidStake { amount: String, reason: String },

    #[error("Invalid destination address: {0}")]
    InvalidDestination(String),

    #[error("Check-in rejected: {0}")]
    CheckInRejected(String),
}

impl SettlementError {
    /// Retrying the same commitment will fail the same way
    pub fn is_permanent(&self) -> bool {
        !matches!(self, SettlementError::CheckInRejected(_))
    }
}

/// Failures reported by a ledger client
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Transaction rejected: {0}")]
    Rejected(String),

    #[error("Insufficient treasury funds: required {required}, available {available}")]
    InsufficientFunds { required: u64, available: u64 },

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// The transaction was built but never sent
    #[error("Broadcast aborted: {0}")]
    Aborted(String),

    /// The transaction was broadcast but its confirmation could not be observed
    #[error("Transaction {signature} unconfirmed: {reason}")]
    Unconfirmed { signature: String, reason: String },
}

impl LedgerError {
    /// Whether the transfer could have reached the chain
    pub fn may_have_landed(&self) -> bool {
        matches!(self, LedgerError::Unconfirmed { .. })
    }

    /// Automatic retry will not succeed without operator attention
    pub fn is_permanent(&self) -> bool {
        matches!(self, LedgerError::InvalidAddress(_) | LedgerError::Rejected(_))
    }
}

/// API error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, message, details) = match self {
            AppError::NotFound(what) => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                format!("Not found: {}", what),
                None,
            ),
            AppError::InvalidInput(reason) => (
                StatusCode::BAD_REQUEST,
                "INVALID_INPUT",
                reason,
                None,
            ),
            AppError::Settlement(SettlementError::CheckInRejected(reason)) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "CHECK_IN_REJECTED",
                reason,
                None,
            ),
            AppError::Settlement(SettlementError::NotResolved(id)) => (
                StatusCode::CONFLICT,
                "COMMITMENT_ACTIVE",
                format!("Commitment {} is still active", id),
                Some(serde_json::json!({ "commitment_id": id })),
            ),
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "Missing or invalid trigger token".to_string(),
                None,
            ),
            AppError::MethodNotAllowed(method) => (
                StatusCode::METHOD_NOT_ALLOWED,
                "METHOD_NOT_ALLOWED",
                format!("Method {} is not supported", method),
                None,
            ),
            AppError::Ledger(err) => (
                StatusCode::BAD_GATEWAY,
                "LEDGER_ERROR",
                err.to_string(),
                None,
            ),
            AppError::Database(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "DATABASE_ERROR",
                "A database error occurred".to_string(),
                None,
            ),
            other => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                other.to_string(),
                None,
            ),
        };

        let body = Json(ErrorResponse {
            error: message,
            error_code: error_code.to_string(),
            details,
        });

        (status, body).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        AppError::Internal(format!("Error converting: {:?}", error))
    }
}

impl From<rust_decimal::Error> for AppError {
    fn from(error: rust_decimal::Error) -> Self {
        AppError::InvalidInput(format!("Decimal conversion error: {:?}", error))
    }
}

impl From<MigrateError> for AppError {
    fn from(error: MigrateError) -> Self {
        AppError::Internal(format!("Migration error: {:?}", error))
    }
}

impl From<::config::ConfigError> for AppError {
    fn from(error: ::config::ConfigError) -> Self {
        AppError::Config(error.to_string())
    }
}

/// Result type alias for the application
pub type AppResult<T> = Result<T, AppError>;
