// Payout resolver - decides who receives a resolved stake, and how much
use rust_decimal::{prelude::ToPrimitive, Decimal};
use serde::Serialize;
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;

use crate::{
    error::SettlementError,
    store::{CheckInCounts, Commitment, CommitmentStatus},
};

/// Lamports per SOL
pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutKind {
    /// Stake returned to the commitment's own wallet
    Refund,
    /// Stake sent to the charity sink
    Forfeit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payout {
    pub kind: PayoutKind,
    pub destination: String,
    pub lamports: u64,
}

#[derive(Debug, Clone)]
pub struct PayoutResolver {
    sink_address: String,
}

impl PayoutResolver {
    pub fn new(sink: Pubkey) -> Self {
        Self {
            sink_address: sink.to_string(),
        }
    }

    /// Decide the transfer for a resolved commitment
    ///
    /// A success with no completed day on record is paid out as a forfeit.
    pub fn resolve(
        &self,
        commitment: &Commitment,
        counts: CheckInCounts,
    ) -> Result<Payout, SettlementError> {
        let kind = match commitment.status {
            CommitmentStatus::Active => return Err(SettlementError::NotResolved(commitment.id)),
            CommitmentStatus::ResolvedSuccess if counts.successful_days > 0 => PayoutKind::Refund,
            CommitmentStatus::ResolvedSuccess | CommitmentStatus::ResolvedFailure => {
                PayoutKind::Forfeit
            }
        };

        let destination = match kind {
            PayoutKind::Refund => commitment.wallet_address.clone(),
            PayoutKind::Forfeit => self.sink_address.clone(),
        };
        Pubkey::from_str(&destination)
            .map_err(|_| SettlementError::InvalidDestination(destination.clone()))?;

        Ok(Payout {
            kind,
            destination,
            lamports: to_lamports(commitment.stake_amount)?,
        })
    }
}

/// Exact SOL -> lamports conversion
pub fn to_lamports(amount: Decimal) -> Result<u64, SettlementError> {
    let invalid = |reason: &str| SettlementError::InvalidStake {
        amount: amount.to_string(),
        reason: reason.to_string(),
    };

    if amount <= Decimal::ZERO {
        return Err(invalid("must be positive"));
    }

    let scaled = amount
        .checked_mul(Decimal::from(LAMPORTS_PER_SOL))
        .ok_or_else(|| invalid("overflows the lamport range"))?;

    if !scaled.fract().is_zero() {
        return Err(invalid("is finer than one lamport"));
    }

    scaled
        .to_u64()
        .ok_or_else(|| invalid("overflows the lamport range"))
}
