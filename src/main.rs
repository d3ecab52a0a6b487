use std::path::PathBuf;

use clap::Parser;
use quillgate::{AppState, config::AppConfig, db::DbPool, router};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "quillgate", version, about = "Identity federation service for Quill")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listen address from the config file
    #[arg(short, long)]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => AppConfig::load(path)?,
        None => {
            tracing::info!("No config file given; using defaults");
            AppConfig::default()
        }
    };
    if let Some(listen) = args.listen {
        config.server.listen = listen;
    }

    if !config.auth.session.secure {
        tracing::warn!("Session cookies are not marked Secure; do not use this in production");
    }

    let db = DbPool::from_config(&config.database).await?;
    db.run_migrations().await?;

    let listen = config.server.listen.clone();
    let public_url = config.server.public_url.clone();
    let state = AppState::new(config, db);
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&listen).await?;
    tracing::info!(listen = %listen, public_url = %public_url, "quillgate listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("Shutdown signal received");
}
