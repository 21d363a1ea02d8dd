mod api;
mod bootstrap;
mod config;
mod error;
mod execution;
mod middleware;
mod server;
mod settlement;
mod store;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tracing::info;

// Initialize logging and tracing
fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,tower_http=debug,resolute_backend=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    // Initialize tracing
    init_tracing();

    info!("🚀 Starting Resolute settlement backend");

    // Load configuration
    let config = config::Config::from_env()?;

    let state = bootstrap::initialize_app_state(&config).await?;

    // Create HTTP server
    let app = server::create_app(state).await;

    // Run the Server
    server::run_server(app, &config.bind_address).await?;

    Ok(())
}
