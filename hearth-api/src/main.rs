use anyhow::Context;
use hearth_api::{app, worker::start_workers, AppState, Stores};
use hearth_checkout::MockPaymentGateway;
use hearth_core::SystemClock;
use hearth_store::app_config::{Config, StorageBackend};
use hearth_store::DbClient;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hearth_api=debug,hearth_hold=debug,hearth_checkout=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Hearth API on port {}", config.server.port);

    let stores = match config.storage.backend {
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; state is lost on restart");
            Stores::in_memory()
        }
        StorageBackend::Postgres => {
            let database = config
                .database
                .as_ref()
                .context("storage.backend = postgres requires a [database] section")?;
            let db = DbClient::new(database.url.expose(), database.max_connections)
                .await
                .context("Failed to connect to Postgres")?;
            db.migrate().await.context("Failed to run migrations")?;
            Stores::postgres(&db)
        }
    };

    let gateway = Arc::new(MockPaymentGateway::new(&config.payments.checkout_base_url));
    let state = AppState::new(&config, stores, gateway, Arc::new(SystemClock))?;
    let workers = start_workers(&state, &config)?;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
        }
    })
    .await?;

    workers.shutdown().await;
    Ok(())
}
