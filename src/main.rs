mod app_state;
mod config;
mod db;
mod models;
mod routes;
mod services;

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post, put};
use axum::Router;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio_util::sync::CancellationToken;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use app_state::AppState;
use config::AppConfig;
use services::classifier::HybridClassifier;
use services::queue::JobQueue;
use services::vision::VisionClient;
use services::worker::WorkerPool;

#[tokio::main]
async fn main() {
    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    // Initialize structured logging
    let default_filter = if config.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .json()
        .init();

    tracing::info!(
        server_port = config.server_port,
        worker_count = config.worker_count,
        confidence_threshold = config.confidence_threshold,
        "initializing classifier service"
    );

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);

    metrics::describe_counter!(
        "classifier_jobs_processed_total",
        "Total classification jobs completed"
    );
    metrics::describe_counter!(
        "classifier_jobs_failed_total",
        "Total classification jobs that failed"
    );
    metrics::describe_histogram!(
        "classification_processing_seconds",
        "Time to process one classification job"
    );

    // Initialize database connection pool
    tracing::info!("connecting to PostgreSQL");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    tracing::info!("running database migrations");
    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run database migrations");

    // Initialize the Redis job queue
    tracing::info!("connecting to Redis job queue");
    let queue = JobQueue::new(&config.redis_connection_url()).expect("Failed to initialize job queue");
    queue.health_check().await.expect("Failed to reach Redis");

    // Initialize the vision model client. A failing health check is only a
    // warning: workers start and fail individual jobs until it recovers.
    let vision = VisionClient::new(&config.model_service_url)
        .expect("Failed to initialize vision client");
    let classifier = Arc::new(HybridClassifier::new(vision, config.enable_secondary_labels));
    match classifier.health_check().await {
        Ok(()) => tracing::info!(url = %config.model_service_url, "model service connected"),
        Err(e) => tracing::warn!(
            url = %config.model_service_url,
            error = %e,
            "model service not available, workers will fail jobs until it recovers"
        ),
    }

    let state = AppState::new(db_pool.clone(), queue);

    // Start the worker pool
    let cancel = CancellationToken::new();
    let worker_pool = Arc::new(WorkerPool::new(
        config.clone(),
        state.queue.clone(),
        classifier,
        db_pool,
    ));
    let worker_handle = tokio::spawn(worker_pool.clone().run(cancel.clone()));

    // Build API routes
    let app = Router::new()
        .route("/api/v1/health", get(routes::health::health_check))
        .route("/api/v1/classify", post(routes::classify::submit_classification))
        .route("/api/v1/classify/batch", post(routes::classify::submit_batch))
        .route("/api/v1/classify/:id", get(routes::classify::get_classification))
        .route(
            "/api/v1/classify/product/:product_id",
            get(routes::classify::get_classification_by_product),
        )
        .route("/api/v1/results", get(routes::results::list_classifications))
        .route("/api/v1/results/:id", put(routes::results::update_classification))
        .route("/api/v1/review", get(routes::review::get_review_queue))
        .route("/api/v1/review/:id/approve", post(routes::review::approve_classification))
        .route("/api/v1/review/:id/reject", post(routes::review::reject_classification))
        .route("/api/v1/stats", get(routes::stats::get_stats))
        .route("/api/v1/sync", post(routes::stats::sync_products))
        .with_state(state)
        // Prometheus scrape endpoint (separate state)
        .route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(2 * 1024 * 1024));

    let addr = format!("0.0.0.0:{}", config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!(addr = %addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await
        .expect("Server error");

    // Give in-flight jobs a moment to drain before the process exits.
    tracing::info!("shutting down");
    cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(1), worker_handle).await;
    tracing::info!("shutdown complete");
}

/// Resolve on SIGINT or SIGTERM and cancel the root token.
async fn shutdown_signal(cancel: CancellationToken) {
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

    tracing::info!("termination signal received");
    cancel.cancel();
}
