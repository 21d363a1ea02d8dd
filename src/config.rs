use std::{str::FromStr, time::Duration};

use serde::Deserialize;
use solana_sdk::{pubkey::Pubkey, signature::Keypair};

use crate::{
    error::{AppError, AppResult},
    execution::SolanaConfig,
};

/// Longest accepted claim timeout; a claim older than this is certainly abandoned
const MAX_CLAIM_TIMEOUT_SECS: u64 = 7 * 24 * 3600;

/// Runtime configuration, read from the environment at startup.
///
/// `database_url`, `solana_rpc_url`, `treasury_keypair` and
/// `charity_wallet_address` have no defaults: a missing value fails startup.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub database_url: String,
    pub solana_rpc_url: String,
    /// Solana CLI keypair format: a JSON array of 64 bytes
    pub treasury_keypair: String,
    pub charity_wallet_address: String,

    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Fixed interval between scheduled passes, ignored when `settlement_daily_hour` is set
    #[serde(default = "default_interval_secs")]
    pub settlement_interval_secs: u64,
    pub settlement_daily_hour: Option<u32>,
    #[serde(default = "default_claim_timeout_secs")]
    pub claim_timeout_secs: u64,
    #[serde(default = "default_success_threshold_bps")]
    pub success_threshold_bps: u32,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_commit_retries")]
    pub commit_retries: u32,
    #[serde(default = "default_reconcile_lookback")]
    pub reconcile_lookback: usize,
    pub settlement_trigger_token: Option<String>,
}

fn default_bind_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_interval_secs() -> u64 {
    3600
}

fn default_claim_timeout_secs() -> u64 {
    600
}

fn default_success_threshold_bps() -> u32 {
    8_000
}

fn default_max_concurrency() -> usize {
    1
}

fn default_commit_retries() -> u32 {
    5
}

fn default_reconcile_lookback() -> usize {
    1000
}

impl Config {
    pub fn from_env() -> AppResult<Self> {
        let builder = ::config::Config::builder().add_source(
            ::config::Environment::default()
                .try_parsing(true)
                .ignore_empty(true),
        );
        Self::from_builder(builder)
    }

    pub fn from_builder(
        builder: ::config::ConfigBuilder<::config::builder::DefaultState>,
    ) -> AppResult<Self> {
        let config: Config = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> AppResult<()> {
        self.treasury_keypair()?;
        self.charity_pubkey()?;

        if let Some(hour) = self.settlement_daily_hour {
            if hour > 23 {
                return Err(AppError::Config(format!(
                    "SETTLEMENT_DAILY_HOUR must be 0-23, got {}",
                    hour
                )));
            }
        }
        if self.success_threshold_bps > 10_000 {
            return Err(AppError::Config(format!(
                "SUCCESS_THRESHOLD_BPS must be at most 10000, got {}",
                self.success_threshold_bps
            )));
        }
        // A claim must outlive any transfer it covers, or a second run could
        // take it over and pay while the first transfer can still land
        let window = self.solana_config().settlement_window();
        if self.claim_timeout() <= window || self.claim_timeout_secs > MAX_CLAIM_TIMEOUT_SECS {
            return Err(AppError::Config(format!(
                "CLAIM_TIMEOUT_SECS must be above {} and at most {}, got {}",
                window.as_secs(),
                MAX_CLAIM_TIMEOUT_SECS,
                self.claim_timeout_secs
            )));
        }
        if self.max_concurrency == 0 {
            return Err(AppError::Config("MAX_CONCURRENCY must be positive".to_string()));
        }
        Ok(())
    }

    pub fn treasury_keypair(&self) -> AppResult<Keypair> {
        let bytes: Vec<u8> = serde_json::from_str(&self.treasury_keypair).map_err(|e| {
            AppError::Config(format!("TREASURY_KEYPAIR is not a JSON byte array: {}", e))
        })?;
        Keypair::try_from(bytes.as_slice())
            .map_err(|e| AppError::Config(format!("TREASURY_KEYPAIR is invalid: {}", e)))
    }

    pub fn charity_pubkey(&self) -> AppResult<Pubkey> {
        Pubkey::from_str(&self.charity_wallet_address).map_err(|e| {
            AppError::Config(format!(
                "CHARITY_WALLET_ADDRESS {} is invalid: {}",
                self.charity_wallet_address, e
            ))
        })
    }

    pub fn solana_config(&self) -> SolanaConfig {
        SolanaConfig {
            rpc_url: self.solana_rpc_url.clone(),
            reconcile_lookback: self.reconcile_lookback,
            ..SolanaConfig::default()
        }
    }

    pub fn claim_timeout(&self) -> Duration {
        Duration::from_secs(self.claim_timeout_secs)
    }
}
