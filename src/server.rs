use axum::{
    middleware::from_fn,
    routing::{any, get},
    Router,
};
use tower_http::{compression::CompressionLayer, trace::TraceLayer};
use tracing::info;

use crate::{
    api::{
        handler::{
            get_commitment, get_progress, health_check, list_check_ins, list_commitments,
            trigger_settlement, upsert_check_in,
        },
        AppState,
    },
    middleware::{create_cors_layer, reject_bare_options},
};

pub async fn create_app(state: AppState) -> Router {
    info!("⚙️ Setting up HTTP routes...");

    let app = Router::new()
        // Public health check endpoint
        .route("/health", get(health_check))
        // Settlement trigger, any method
        .route("/settle", any(trigger_settlement))
        .nest(
            "/api/v1",
            Router::new()
                .route("/commitments", get(list_commitments))
                .route("/commitments/:id", get(get_commitment))
                .route(
                    "/commitments/:id/check-ins",
                    get(list_check_ins).put(upsert_check_in),
                )
                .route("/commitments/:id/progress", get(get_progress)),
        )
        .layer(CompressionLayer::new())
        .layer(create_cors_layer())
        // Outside CORS so a bare OPTIONS is not answered as a preflight
        .layer(from_fn(reject_bare_options))
        // Add request tracing
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    info!("✓ HTTP routes configured");
    app
}

pub async fn run_server(app: Router, bind_address: &str) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_address).await?;
    info!("🌐 Server listening on: {}", bind_address);

    axum::serve(listener, app).await
}
