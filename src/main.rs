//! Library lending server binary

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use library_server::{
    api,
    config::AppConfig,
    repository::{seed_sample_books, MemoryStore, PgStore, Store},
    services::{clock::SystemClock, Services},
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;

    init_tracing(&config);

    tracing::info!("Starting library server v{}", env!("CARGO_PKG_VERSION"));

    let store = open_store(&config).await?;

    let server_host = config.server.host.clone();
    let server_port = config.server.port;

    let services = Services::new(store, Arc::new(SystemClock), &config);
    let app = api::create_router(AppState::new(config, services));

    let addr = SocketAddr::new(
        server_host
            .parse()
            .with_context(|| format!("Invalid host address: {}", server_host))?,
        server_port,
    );

    tracing::info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("library_server={},tower_http=debug", config.logging.level).into()
    });

    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.format.eq_ignore_ascii_case("json") {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// PostgreSQL when a database URL is configured, otherwise an in-memory store
async fn open_store(config: &AppConfig) -> anyhow::Result<Arc<dyn Store>> {
    let Some(url) = config.database.url.as_deref() else {
        tracing::warn!("No database configured, using the in-memory store");
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        seed(store.as_ref(), config).await?;
        return Ok(store);
    };

    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .connect(url)
        .await
        .context("Failed to connect to database")?;

    tracing::info!("Connected to database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;

    tracing::info!("Database migrations completed");

    let store: Arc<dyn Store> = Arc::new(PgStore::new(pool));
    seed(store.as_ref(), config).await?;
    Ok(store)
}

async fn seed(store: &dyn Store, config: &AppConfig) -> anyhow::Result<()> {
    if config.seed.sample_data {
        let seeded = seed_sample_books(store, chrono::Utc::now()).await?;
        tracing::info!("Seeded {} sample books", seeded);
    }
    Ok(())
}
