//! taskflow server
//!
//! Runs the outbox relay and the notification worker against Postgres.

mod composition;
mod config;
mod shutdown;

use clap::Parser;
use composition::start_processors;
use config::{ConfigLoader, get_database_url};
use shutdown::{shutdown_signal, spawn_config_reload_handler};
use sqlx::postgres::PgPoolOptions;
use std::path::PathBuf;
use std::sync::Arc;
use taskflow_core::config::ConfigStore;
use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// taskflow - transactional outbox relay for the task-management backend
#[derive(Parser, Debug)]
#[command(name = "taskflow-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "./taskflow.toml")]
    config: PathBuf,

    /// Run database migrations on startup
    #[arg(long, default_value = "false")]
    migrate: bool,

    /// Emit logs as JSON lines
    #[arg(long, env = "TASKFLOW_LOG_JSON", default_value = "false")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    tracing::info!("Starting taskflow-server v{}", env!("CARGO_PKG_VERSION"));

    let config_loader = Arc::new(ConfigLoader::new(&args.config));
    let loaded_config = config_loader.load().inspect_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
    })?;
    tracing::info!("Configuration loaded from {:?}", args.config);

    let database_url = get_database_url().inspect_err(|_| {
        tracing::error!("DATABASE_URL environment variable not set");
    })?;

    tracing::info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(loaded_config.max_connections)
        .connect(&database_url)
        .await
        .inspect_err(|e| {
            tracing::error!("Failed to connect to database: {}", e);
        })?;
    tracing::info!("Database connection established");

    if args.migrate {
        tracing::info!("Running database migrations...");
        sqlx::migrate!("../migrations")
            .run(&db_pool)
            .await
            .inspect_err(|e| {
                tracing::error!("Failed to run migrations: {}", e);
            })?;
        tracing::info!("Migrations completed successfully");
    }

    let relay_settings = ConfigStore::new(loaded_config.relay);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let processors = start_processors(
        db_pool.clone(),
        &loaded_config,
        relay_settings.clone(),
        shutdown_rx,
    )?;

    // Spawn config reload handler (listens for SIGHUP)
    let reload_notify = spawn_config_reload_handler(config_loader, relay_settings)?;

    let result = shutdown_signal().await;

    let _ = shutdown_tx.send(true);
    processors.join().await;
    reload_notify.notify_one();

    tracing::info!("Closing database connections...");
    db_pool.close().await;
    tracing::info!("Server shutdown complete");

    result.map_err(Into::into)
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
