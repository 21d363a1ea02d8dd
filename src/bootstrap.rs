use std::{sync::Arc, time::Duration};
use sqlx::{PgPool, postgres::PgPoolOptions};
use tracing::info;
use crate::{
    api::AppState,
    config::Config,
    error::AppResult,
    execution::SolanaLedgerClient,
    settlement::{SettlementOptions, SettlementScheduleConfig, SettlementScheduler, SettlementService},
    store::{CommitmentStore, PgCommitmentStore},
};

pub async fn initialize_app_state(config: &Config) -> AppResult<AppState> {
    info!("Initializing application components ...");

    // Database pool
    let pool = initialize_database(&config.database_url).await?;
    let store: Arc<dyn CommitmentStore> = Arc::new(PgCommitmentStore::new(pool));

    info!("⚙️  Initializing Solana ledger client...");

    let treasury_keypair = config.treasury_keypair()?;
    let charity = config.charity_pubkey()?;

    let ledger = Arc::new(SolanaLedgerClient::new(config.solana_config(), treasury_keypair));
    info!(
        "✅ Solana ledger client ready ({}): treasury {}, charity sink {}",
        config.solana_rpc_url,
        ledger.treasury_pubkey(),
        charity
    );

    let service = Arc::new(SettlementService::new(
        store.clone(),
        ledger,
        charity,
        SettlementOptions::from_config(config),
    ));

    // Background settlement runs alongside the HTTP trigger
    let scheduler = SettlementScheduler::new(
        SettlementScheduleConfig::from_config(config),
        service.clone(),
    );
    scheduler.start();
    info!("✅ Settlement scheduler started");

    if config.settlement_trigger_token.is_none() {
        info!("⚠️  SETTLEMENT_TRIGGER_TOKEN not set - /settle is open");
    }

    Ok(AppState {
        store,
        service,
        trigger_token: config.settlement_trigger_token.clone(),
    })
}

async fn initialize_database(database_url: &str) -> AppResult<PgPool> {
    info!("📊 Connecting to database...");

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await?;

    info!("✓ Database pool configured: 20 max connections");

    // Run migrations
    info!("🔄 Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;

    info!("✓ Database initialized");
    Ok(pool)
}
