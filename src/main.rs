use axum::{routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dinepass::api::{self, AppState};
use dinepass::config::Config;
use dinepass::db;
use dinepass::models::offer::PgOfferDirectory;
use dinepass::services::redemption::RedemptionService;
use dinepass::store::{ActivationStore, PgActivationStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dinepass=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting dinepass server...");

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!("Configuration loaded successfully");

    // Create database pool
    let pool = db::create_pool(&config.database_url).await?;
    tracing::info!("Database pool created");

    // Run migrations
    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations completed");

    // Wire the redemption core: Postgres-backed store and offer
    // directory, injected into the service by the bootstrap
    let store: Arc<dyn ActivationStore> = Arc::new(PgActivationStore::new(pool.clone()));
    let offers = Arc::new(PgOfferDirectory::new(pool));
    let service = Arc::new(RedemptionService::new(
        offers,
        store.clone(),
        chrono::Duration::minutes(config.code_ttl_minutes),
    ));
    tracing::info!(code_ttl_minutes = config.code_ttl_minutes, "Redemption service initialized");

    let state = AppState { service, store };

    // Build router
    let app = Router::new()
        .route("/health", get(api::health::health_check))
        .merge(api::offers::router())
        .merge(api::redemptions::router())
        .merge(api::activations::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    tracing::info!("Listening on {}", addr);

    // Start server
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install CTRL+C signal handler");
    tracing::info!("Shutdown signal received, cleaning up...");
}
