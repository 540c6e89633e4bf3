use anyhow::{Context, Result};
use document_admin::config::Config;
use document_admin::server::{self, AppState};
use document_admin::store::MongoStore;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (ignored when variables come from the environment)
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("document_admin=info".parse()?),
        )
        .init();

    info!("Starting document admin");

    let config = Config::from_env()?;

    let dev = MongoStore::connect(&config.mongo_uri_dev, &config.db_name)
        .await
        .context("Failed to connect to development store")?;
    let release = MongoStore::connect(&config.mongo_uri_release, &config.db_name)
        .await
        .context("Failed to connect to release store")?;
    info!("✓ Stores configured for database {}", config.db_name);

    let state = AppState::new(config, Arc::new(dev), Arc::new(release));
    server::serve(state).await
}
