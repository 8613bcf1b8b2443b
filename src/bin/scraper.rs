use std::sync::Arc;

use catalog_classifier::{
    config::AppConfig,
    db,
    services::{fetcher::CatalogClient, scheduler::SyncScheduler},
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Load configuration
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    // Initialize structured logging
    let default_filter = if config.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .json()
        .init();

    tracing::info!("starting catalog ingestion scheduler");

    // Initialize database
    tracing::info!("connecting to PostgreSQL");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    tracing::info!("running database migrations");
    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run database migrations");

    // Rate-limited catalog client
    let client = CatalogClient::new(&config.user_agent, config.rate_limit_rps, config.rate_limit_burst)
        .expect("Failed to initialize catalog client");

    let scheduler = Arc::new(SyncScheduler::new(db_pool, client, config.sync_cron.clone()));

    if config.run_once {
        // One-shot mode for operators fronting this with an external cron.
        tracing::info!("running in one-shot mode (RUN_ONCE=true)");
        scheduler.run_sync().await;
        tracing::info!("one-shot sync completed");
        return;
    }

    // Continuous mode: cron plus an immediate initial sync.
    let cron = scheduler
        .clone()
        .start()
        .await
        .expect("Failed to start sync scheduler");

    let initial = scheduler.clone();
    tokio::spawn(async move {
        initial.run_sync().await;
    });

    wait_for_shutdown_signal().await;
    tracing::info!("shutting down");

    let mut cron = cron;
    if let Err(e) = cron.shutdown().await {
        tracing::warn!(error = %e, "failed to shut down cron scheduler");
    }
    tracing::info!("scheduler stopped");
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install SIGINT handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
