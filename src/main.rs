use tracing_subscriber::EnvFilter;

use arbor_api::config::config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so ARBOR_MODEL, SECURITY_JWT_SECRET, etc. are picked up
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = config().clone();
    tracing::info!("Starting Arbor API in {:?} mode", config.environment);

    arbor_api::server::run(config).await
}
