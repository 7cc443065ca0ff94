use autocrud::config::{AppConfig, StoreBackend};
use autocrud::demo;
use autocrud::store::{MemoryStore, PostgresStore, Store};
use axum::serve;
use log::info;
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if it exists
    dotenvy::dotenv().ok();

    // Initialize logging with explicit filter to suppress sqlx debug logs
    use env_logger::Builder;
    use log::LevelFilter;

    Builder::new()
        .filter_level(LevelFilter::Info)
        .filter_module("sqlx", LevelFilter::Warn)
        .parse_default_env()
        .init();

    let config = AppConfig::load()?;
    info!(
        "Configuration loaded: server={}:{}, store={:?}",
        config.server.host, config.server.port, config.store.backend
    );

    match config.store.backend {
        StoreBackend::Memory => {
            run_server(Arc::new(MemoryStore::new()), &config).await?;
        }
        StoreBackend::Postgres => {
            info!("Connecting to PostgreSQL...");
            let database_url = config.database_url()?;
            let store = PostgresStore::new(&database_url, config.max_connections()).await?;
            run_server(Arc::new(store), &config).await?;
        }
    }

    Ok(())
}

async fn run_server<S: Store + 'static>(store: Arc<S>, config: &AppConfig) -> anyhow::Result<()> {
    // Load seed data for demonstration (optional)
    if std::env::var("LOAD_SEED_DATA").unwrap_or_default() == "true" {
        info!("Loading seed data...");
        demo::load_seed_data(&*store).await?;
    }

    let app = autocrud::app(store)?;

    let bind_address = config.server_address();
    let listener = TcpListener::bind(&bind_address).await?;
    info!("autocrud server running on http://{}", bind_address);

    serve(listener, app).await?;

    Ok(())
}
