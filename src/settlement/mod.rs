// Settlement pass - evaluate finished commitments, then pay out resolved ones
pub mod evaluator;
pub mod executor;
pub mod resolver;
pub mod scanner;
pub mod scheduler;

pub use executor::{ExecutorConfig, SettlementExecutor, SettlementOutcome};
pub use scheduler::{SettlementScheduleConfig, SettlementScheduler};

use chrono::Utc;
use futures::{stream, StreamExt};
use serde::Serialize;
use solana_sdk::pubkey::Pubkey;
use std::{sync::Arc, time::Duration};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    config::Config,
    error::AppResult,
    execution::LedgerClient,
    store::CommitmentStore,
};
use evaluator::CommitmentEvaluator;
use resolver::PayoutResolver;
use scanner::SettlementScanner;

#[derive(Debug, Clone)]
pub struct SettlementOptions {
    pub success_threshold_bps: u32,
    pub claim_timeout: Duration,
    /// Commitments settled at once; submissions still serialize on the signer
    pub max_concurrency: usize,
    pub executor: ExecutorConfig,
}

impl Default for SettlementOptions {
    fn default() -> Self {
        Self {
            success_threshold_bps: 8_000,
            claim_timeout: Duration::from_secs(600),
            max_concurrency: 1,
            executor: ExecutorConfig::default(),
        }
    }
}

impl SettlementOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            success_threshold_bps: config.success_threshold_bps,
            claim_timeout: config.claim_timeout(),
            max_concurrency: config.max_concurrency,
            executor: ExecutorConfig {
                commit_retries: config.commit_retries,
                ..ExecutorConfig::default()
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CommitmentReport {
    pub commitment_id: Uuid,
    #[serde(flatten)]
    pub outcome: SettlementOutcome,
}

/// Aggregate result of one pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct SettlementSummary {
    pub evaluated: usize,
    pub candidates: usize,
    pub processed: usize,
    pub failed: usize,
    /// Subset of `failed` that needs operator attention
    pub failed_permanent: usize,
    pub skipped: usize,
    pub outcomes: Vec<CommitmentReport>,
}

impl SettlementSummary {
    fn from_reports(evaluated: usize, outcomes: Vec<CommitmentReport>) -> Self {
        let mut summary = SettlementSummary {
            evaluated,
            candidates: outcomes.len(),
            ..Default::default()
        };

        for report in &outcomes {
            match &report.outcome {
                SettlementOutcome::Settled { .. } => summary.processed += 1,
                SettlementOutcome::AlreadySettled | SettlementOutcome::ClaimedElsewhere => {
                    summary.skipped += 1
                }
                SettlementOutcome::Failed { permanent, .. } => {
                    summary.failed += 1;
                    if *permanent {
                        summary.failed_permanent += 1;
                    }
                }
            }
        }

        summary.outcomes = outcomes;
        summary
    }
}

pub struct SettlementService {
    store: Arc<dyn CommitmentStore>,
    evaluator: CommitmentEvaluator,
    scanner: SettlementScanner,
    executor: SettlementExecutor,
    max_concurrency: usize,
}

impl SettlementService {
    pub fn new(
        store: Arc<dyn CommitmentStore>,
        ledger: Arc<dyn LedgerClient>,
        sink: Pubkey,
        options: SettlementOptions,
    ) -> Self {
        let executor = SettlementExecutor::new(
            store.clone(),
            ledger,
            PayoutResolver::new(sink),
            options.executor,
        );

        Self {
            store,
            evaluator: CommitmentEvaluator::new(options.success_threshold_bps),
            scanner: SettlementScanner::new(options.claim_timeout),
            executor,
            max_concurrency: options.max_concurrency.max(1),
        }
    }

    /// One scan-and-settle pass
    ///
    /// Only store failures while evaluating or scanning abort the pass;
    /// every candidate is attempted and reported.
    #[instrument(skip(self))]
    pub async fn run_pass(&self) -> AppResult<SettlementSummary> {
        info!("🔄 Starting settlement pass");

        let evaluated = self
            .evaluator
            .evaluate_due(self.store.as_ref(), Utc::now().date_naive())
            .await?;

        let candidates = self.scanner.scan(self.store.as_ref(), Utc::now()).await?;

        let executor = &self.executor;
        let reports: Vec<CommitmentReport> = stream::iter(candidates)
            .map(|commitment| async move {
                let outcome = executor.settle(&commitment).await;
                CommitmentReport {
                    commitment_id: commitment.id,
                    outcome,
                }
            })
            .buffered(self.max_concurrency)
            .collect()
            .await;

        let summary = SettlementSummary::from_reports(evaluated, reports);

        info!(
            "✓ Settlement pass completed: {} processed, {} failed ({} permanent), {} skipped",
            summary.processed, summary.failed, summary.failed_permanent, summary.skipped
        );
        Ok(summary)
    }
}
