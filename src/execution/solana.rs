use async_trait::async_trait;
use solana_client::{
    client_error::{ClientError, ClientErrorKind},
    nonblocking::rpc_client::RpcClient,
    rpc_client::GetConfirmedSignaturesForAddress2Config,
    rpc_config::CommitmentConfig,
    rpc_request::{RpcError, RpcResponseErrorData},
};
use solana_sdk::{
    hash::Hash,
    instruction::{AccountMeta, Instruction},
    message::Message,
    pubkey::Pubkey,
    signature::{Keypair, Signature, Signer},
    transaction::Transaction,
};
use std::{str::FromStr, sync::Arc, time::Duration};
use tokio::{sync::Mutex, time::Instant};
use tracing::{error, info, instrument, warn};

use crate::{
    error::LedgerError,
    execution::{BroadcastGate, LedgerClient, TransferRequest},
};

/// SPL memo program
const MEMO_PROGRAM_ID: &str = "MemoSq4gqABAXKb96qnH8TysNcWxMyWCqXgDLGmfcHr";

/// System program `Transfer` discriminant (bincode u32)
const SYSTEM_TRANSFER_INDEX: u32 = 2;

/// A blockhash stays valid for 150 slots, about 60-90 seconds
const BLOCKHASH_LIFETIME: Duration = Duration::from_secs(90);

#[derive(Debug, Clone)]
pub struct SolanaConfig {
    pub rpc_url: String,
    pub commitment: CommitmentConfig,
    pub request_timeout: Duration,
    pub confirmation_timeout: Duration,
    pub poll_interval: Duration,
    /// How many recent treasury signatures to search when reconciling
    pub reconcile_lookback: usize,
    /// Kept back on top of the transfer to pay the fee
    pub fee_reserve_lamports: u64,
}

impl Default for SolanaConfig {
    fn default() -> Self {
        Self {
            rpc_url: "https://api.mainnet-beta.solana.com".to_string(),
            commitment: CommitmentConfig::confirmed(),
            request_timeout: Duration::from_secs(30),
            confirmation_timeout: Duration::from_secs(90),
            poll_interval: Duration::from_millis(500),
            reconcile_lookback: 1000,
            fee_reserve_lamports: 10_000,
        }
    }
}

impl SolanaConfig {
    /// Longest a broadcast transfer can stay unresolved before it has either
    /// landed or can no longer land
    pub fn settlement_window(&self) -> Duration {
        self.request_timeout + self.confirmation_timeout + BLOCKHASH_LIFETIME
    }
}

/// Treasury-signed SOL transfers
///
/// The keypair is loaded once at startup. Submissions are serialized through
/// `submit_lock` so concurrent settlements never race on the treasury account.
pub struct SolanaLedgerClient {
    config: SolanaConfig,
    client: RpcClient,
    treasury_keypair: Arc<Keypair>,
    submit_lock: Mutex<()>,
}

impl SolanaLedgerClient {
    pub fn new(config: SolanaConfig, treasury_keypair: Keypair) -> Self {
        let client = RpcClient::new_with_timeout_and_commitment(
            config.rpc_url.clone(),
            config.request_timeout,
            config.commitment,
        );

        Self {
            config,
            client,
            treasury_keypair: Arc::new(treasury_keypair),
            submit_lock: Mutex::new(()),
        }
    }

    pub fn treasury_pubkey(&self) -> Pubkey {
        self.treasury_keypair.pubkey()
    }

    fn build_transaction(
        &self,
        destination: &Pubkey,
        lamports: u64,
        reference: &str,
        recent_blockhash: Hash,
    ) -> Result<Transaction, LedgerError> {
        let treasury = self.treasury_keypair.pubkey();
        let instructions = transfer_instructions(&treasury, destination, lamports, reference)?;
        let message = Message::new(&instructions, Some(&treasury));

        let mut transaction = Transaction::new_unsigned(message);
        transaction
            .try_sign(&[&*self.treasury_keypair], recent_blockhash)
            .map_err(|e| LedgerError::Rejected(format!("Signing failed: {}", e)))?;

        Ok(transaction)
    }

    async fn check_balance(&self, lamports: u64) -> Result<(), LedgerError> {
        let available = self
            .client
            .get_balance(&self.treasury_keypair.pubkey())
            .await
            .map_err(|e| LedgerError::Network(format!("Failed to get balance: {}", e)))?;

        let required = lamports.saturating_add(self.config.fee_reserve_lamports);
        if available < required {
            return Err(LedgerError::InsufficientFunds { required, available });
        }
        Ok(())
    }

    async fn simulate(&self, transaction: &Transaction) -> Result<(), LedgerError> {
        let result = self
            .client
            .simulate_transaction(transaction)
            .await
            .map_err(|e| LedgerError::Network(format!("Simulation error: {}", e)))?;

        if let Some(err) = result.value.err {
            return Err(LedgerError::Rejected(format!(
                "Transaction would fail: {:?}",
                err
            )));
        }
        Ok(())
    }

    /// Poll the signature until it is confirmed, fails, or can no longer land
    async fn wait_for_confirmation(
        &self,
        signature: &Signature,
        recent_blockhash: &Hash,
    ) -> Result<(), LedgerError> {
        let deadline = Instant::now() + self.config.confirmation_timeout;

        loop {
            match self.client.get_signature_statuses(&[*signature]).await {
                Ok(response) => {
                    if let Some(Some(status)) = response.value.first() {
                        if let Some(err) = &status.err {
                            return Err(LedgerError::Rejected(format!(
                                "Transaction {} failed on-chain: {:?}",
                                signature, err
                            )));
                        }
                        if status.satisfies_commitment(self.config.commitment) {
                            return Ok(());
                        }
                    }
                }
                Err(e) => warn!("Status lookup for {} failed: {}", signature, e),
            }

            // Once the blockhash expires an unseen transaction can never land
            if let Ok(false) = self
                .client
                .is_blockhash_valid(recent_blockhash, CommitmentConfig::processed())
                .await
            {
                if let Ok(response) = self.client.get_signature_statuses(&[*signature]).await {
                    if let Some(None) = response.value.first() {
                        return Err(LedgerError::Network(format!(
                            "Blockhash expired before {} was confirmed",
                            signature
                        )));
                    }
                }
            }

            if Instant::now() >= deadline {
                return Err(LedgerError::Unconfirmed {
                    signature: signature.to_string(),
                    reason: "confirmation timeout".to_string(),
                });
            }

            tokio::time::sleep(self.config.poll_interval).await;
        }
    }
}

/// System transfer followed by a memo carrying the settlement reference
pub fn transfer_instructions(
    from: &Pubkey,
    to: &Pubkey,
    lamports: u64,
    reference: &str,
) -> Result<Vec<Instruction>, LedgerError> {
    let mut data = SYSTEM_TRANSFER_INDEX.to_le_bytes().to_vec();
    data.extend_from_slice(&lamports.to_le_bytes());

    let transfer = Instruction {
        program_id: Pubkey::default(),
        accounts: vec![AccountMeta::new(*from, true), AccountMeta::new(*to, false)],
        data,
    };

    let memo_program = Pubkey::from_str(MEMO_PROGRAM_ID)
        .map_err(|e| LedgerError::Rejected(format!("Invalid memo program id: {}", e)))?;
    let memo = Instruction {
        program_id: memo_program,
        accounts: vec![AccountMeta::new_readonly(*from, true)],
        data: reference.as_bytes().to_vec(),
    };

    Ok(vec![transfer, memo])
}

/// Map a send failure, given the signature the transaction would carry
fn classify_send_error(err: &ClientError, signature: &Signature) -> LedgerError {
    match err.kind() {
        ClientErrorKind::RpcError(RpcError::RpcResponseError {
            data: RpcResponseErrorData::SendTransactionPreflightFailure(_),
            message,
            ..
        }) => LedgerError::Rejected(format!("Preflight failed: {}", message)),
        // The node answered with an error: the transaction was not forwarded
        ClientErrorKind::RpcError(RpcError::RpcResponseError { message, .. }) => {
            LedgerError::Network(format!("RPC refused transaction: {}", message))
        }
        _ => LedgerError::Unconfirmed {
            signature: signature.to_string(),
            reason: format!("Send failed: {}", err),
        },
    }
}

#[async_trait]
impl LedgerClient for SolanaLedgerClient {
    #[instrument(skip(self, request, gate), fields(reference = %request.reference, lamports = request.lamports))]
    async fn transfer(
        &self,
        request: &TransferRequest,
        gate: &dyn BroadcastGate,
    ) -> Result<String, LedgerError> {
        let destination = Pubkey::from_str(&request.destination)
            .map_err(|_| LedgerError::InvalidAddress(request.destination.clone()))?;

        if request.lamports == 0 {
            return Err(LedgerError::Rejected(
                "Transfer amount must be greater than zero".to_string(),
            ));
        }

        let _guard = self.submit_lock.lock().await;

        self.check_balance(request.lamports).await?;

        let recent_blockhash = self
            .client
            .get_latest_blockhash()
            .await
            .map_err(|e| LedgerError::Network(format!("Failed to get blockhash: {}", e)))?;

        let transaction =
            self.build_transaction(&destination, request.lamports, &request.reference, recent_blockhash)?;
        let signature = transaction.signatures[0];

        self.simulate(&transaction).await?;

        match gate.may_broadcast().await {
            Ok(true) => {}
            Ok(false) => {
                warn!("Not broadcasting {}: settlement claim no longer held", signature);
                return Err(LedgerError::Aborted("settlement claim no longer held".to_string()));
            }
            Err(e) => {
                return Err(LedgerError::Aborted(format!("claim check failed: {}", e)));
            }
        }

        info!("Simulation successful, sending {} lamports to {}", request.lamports, destination);

        if let Err(e) = self.client.send_transaction(&transaction).await {
            error!("Failed to send transaction {}: {}", signature, e);
            return Err(classify_send_error(&e, &signature));
        }

        info!("Transaction sent: {}", signature);

        self.wait_for_confirmation(&signature, &recent_blockhash).await?;

        info!("✅ Transfer confirmed on-chain: {}", signature);
        Ok(signature.to_string())
    }

    async fn find_transfer(&self, reference: &str) -> Result<Option<String>, LedgerError> {
        let signatures = self
            .client
            .get_signatures_for_address_with_config(
                &self.treasury_keypair.pubkey(),
                GetConfirmedSignaturesForAddress2Config {
                    before: None,
                    until: None,
                    limit: Some(self.config.reconcile_lookback),
                    commitment: Some(self.config.commitment),
                },
            )
            .await
            .map_err(|e| LedgerError::Network(format!("Failed to list signatures: {}", e)))?;

        let found = signatures
            .into_iter()
            .find(|entry| {
                entry.err.is_none()
                    && entry
                        .memo
                        .as_deref()
                        .map_or(false, |memo| memo.contains(reference))
            })
            .map(|entry| entry.signature);

        if let Some(signature) = &found {
            info!("Found prior transfer {} for {}", signature, reference);
        }
        Ok(found)
    }
}
