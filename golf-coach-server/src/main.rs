use std::sync::Arc;

use clap::Parser;
use golf_coach_core::vision::{ClaudeVisionClient, VisionBackend};
use golf_coach_core::GolfCoachConfig;
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "golf-coach.toml")]
    config: String,

    /// Check the database and exit
    #[arg(long)]
    health: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (dev convenience — production uses real env vars)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let config = match GolfCoachConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.service.log_level));
    fmt().with_env_filter(filter).init();

    let pool = match golf_coach_core::db::init_database(&config.database).await {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to open database {}: {}", config.database.url, e);
            std::process::exit(1);
        }
    };

    if args.health {
        match golf_coach_core::db::health_check(&pool).await {
            Ok(v) => println!("✅ SQLite connected: {}", v),
            Err(e) => {
                println!("❌ SQLite health check failed: {}", e);
                std::process::exit(1);
            }
        }
        println!("✅ Golf Coach DB health check passed");
        return Ok(());
    }

    let vision: Option<Arc<dyn VisionBackend>> =
        match ClaudeVisionClient::from_env(config.vision.clone()) {
            Ok(client) => {
                tracing::info!(model = client.model(), "Vision backend ready");
                Some(Arc::new(client))
            }
            Err(e) => {
                tracing::warn!("Vision backend disabled: {}", e);
                None
            }
        };

    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    golf_coach_server::http::start_http_server(pool.clone(), config, vision, tx.subscribe()).await?;

    pool.close().await;
    Ok(())
}
