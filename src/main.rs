//! Task board - HTTP Server Entry Point
//!
//! Starts the HTTP server that exposes the task board API.

use taskboard::{api, config::Config};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async_main())
}

async fn async_main() -> anyhow::Result<()> {
    // Missing .env is fine; real deployments set the environment directly.
    let dotenv_loaded = dotenvy::dotenv().is_ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "taskboard=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if dotenv_loaded {
        info!("Loaded environment from .env");
    }

    // Load configuration
    let config = Config::from_env()?;
    info!(
        "Loaded configuration: store={}, data_dir={}",
        config.store_type.as_str(),
        config.data_dir.display()
    );

    api::serve(config).await?;

    Ok(())
}
