use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;

use crate::app_state::AppState;
use crate::db::queries;
use crate::models::classification::{ClassificationJob, ClassificationStats};

const MAX_SYNC_LIMIT: i64 = 1000;

/// Priority for backfill jobs created by `/sync`.
const BACKFILL_PRIORITY: i32 = 1;

/// GET /api/v1/stats — queue depths plus store-side averages.
pub async fn get_stats(
    State(state): State<AppState>,
) -> Result<Json<ClassificationStats>, (StatusCode, String)> {
    let mut stats = state.queue.stats().await.map_err(|e| {
        tracing::error!(error = %e, "failed to get queue stats");
        (StatusCode::INTERNAL_SERVER_ERROR, "failed to get stats".to_string())
    })?;

    match queries::stats_averages(&state.db).await {
        Ok((avg_confidence, avg_processing_ms)) => {
            stats.avg_confidence = avg_confidence;
            stats.avg_processing_ms = avg_processing_ms;
        }
        Err(e) => tracing::warn!(error = %e, "failed to compute store averages"),
    }

    Ok(Json(stats))
}

#[derive(Debug, Deserialize)]
pub struct SyncQuery {
    pub limit: Option<i64>,
}

/// POST /api/v1/sync — enqueue every product that has no classification yet.
pub async fn sync_products(
    State(state): State<AppState>,
    Query(query): Query<SyncQuery>,
) -> Result<(StatusCode, Json<serde_json::Value>), (StatusCode, String)> {
    let limit = query.limit.unwrap_or(100).clamp(1, MAX_SYNC_LIMIT);

    let products = queries::products_without_classification(&state.db, limit)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "failed to load unclassified products");
            (StatusCode::INTERNAL_SERVER_ERROR, "failed to get products".to_string())
        })?;

    if products.is_empty() {
        return Ok((
            StatusCode::OK,
            Json(serde_json::json!({
                "message": "no unclassified products found",
                "queued": 0,
            })),
        ));
    }

    let mut jobs: Vec<ClassificationJob> = products
        .into_iter()
        .map(|p| ClassificationJob {
            id: String::new(),
            product_id: p.id.to_string(),
            image_url: p.image_url,
            priority: BACKFILL_PRIORITY,
            created_at: Utc::now(),
            attempts: 0,
        })
        .collect();

    state.queue.enqueue_batch(&mut jobs).await.map_err(|e| {
        tracing::error!(error = %e, "failed to enqueue products");
        (StatusCode::INTERNAL_SERVER_ERROR, "failed to queue products".to_string())
    })?;

    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({
            "message": "products queued for classification",
            "queued": jobs.len(),
        })),
    ))
}
