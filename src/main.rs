//! Atelier - collaborative canvas gateway

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use atelier::{config::Args, server, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("atelier={},info", args.log_level).into());
    let registry = tracing_subscriber::registry().with(filter);
    if args.json_logs() {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  Atelier - Collaborative Canvas");
    info!("======================================");
    info!("Listen: {}", args.listen);
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!("Token lifetime: {}s", args.jwt_expiry_seconds);
    info!("Max body: {} bytes", args.max_body_bytes);
    match args.lock_timeout_ms {
        Some(ms) => info!("Lock timeout: {} ms", ms),
        None => info!("Lock timeout: none"),
    }
    info!("======================================");

    if args.dev_mode && args.jwt_secret.is_none() {
        warn!("No JWT_SECRET set - tokens are signed with the development secret");
    }

    let state = Arc::new(AppState::new(args)?);
    server::run(state).await?;

    Ok(())
}
