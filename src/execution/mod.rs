pub mod solana;

#[cfg(test)]
pub mod mock;

pub use solana::{SolanaConfig, SolanaLedgerClient};

use async_trait::async_trait;

use crate::error::{AppResult, LedgerError};

/// A single native-asset transfer out of the treasury
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub destination: String,
    pub lamports: u64,
    /// Memo carried on-chain so the transfer can be found again
    pub reference: String,
}

/// Last check before a signed transaction leaves the process
///
/// Runs while the treasury signer is held, so nothing else broadcasts
/// between the check and the send.
#[async_trait]
pub trait BroadcastGate: Send + Sync {
    /// `Ok(false)` aborts the transfer without broadcasting it
    async fn may_broadcast(&self) -> AppResult<bool>;
}

/// Ledger client - implemented by each chain's treasury signer
///
/// INVARIANTS:
/// - An `Ok` signature means the transfer is confirmed on-chain
/// - Any error other than `LedgerError::Unconfirmed` means nothing was broadcast
///   or the broadcast transaction failed without moving funds
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Submit one transfer and wait for its confirmation
    ///
    /// `gate` is consulted after the transaction is built and simulated,
    /// immediately before it is sent.
    async fn transfer(
        &self,
        request: &TransferRequest,
        gate: &dyn BroadcastGate,
    ) -> Result<String, LedgerError>;

    /// Look up a confirmed, successful transfer carrying `reference`
    async fn find_transfer(&self, reference: &str) -> Result<Option<String>, LedgerError>;
}
