use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::Utc;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::db::queries;
use crate::models::classification::ClassificationJob;
use crate::routes::results::ListQuery;

/// Priority for operator-triggered re-classification.
const RECLASSIFY_PRIORITY: i32 = 10;

/// GET /api/v1/review — results waiting on a human decision.
pub async fn get_review_queue(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let (limit, offset) = query.page();

    let (data, total) = queries::get_review_queue(&state.db, limit, offset)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "failed to get review queue");
            (StatusCode::INTERNAL_SERVER_ERROR, "failed to fetch review queue".to_string())
        })?;

    Ok(Json(serde_json::json!({
        "data": data,
        "total": total,
        "limit": limit,
        "offset": offset,
    })))
}

/// POST /api/v1/review/:id/approve — accept a low-confidence result as-is.
pub async fn approve_classification(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let id = Uuid::parse_str(&id)
        .map_err(|_| (StatusCode::BAD_REQUEST, "invalid id format".to_string()))?;

    let reviewer_id = headers
        .get("x-reviewer-id")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .unwrap_or("system");

    let rows = queries::approve_classification(&state.db, id, reviewer_id)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "failed to approve classification");
            (StatusCode::INTERNAL_SERVER_ERROR, "failed to approve".to_string())
        })?;

    if rows == 0 {
        return Err((StatusCode::NOT_FOUND, "classification not found".to_string()));
    }

    Ok(Json(serde_json::json!({ "status": "approved" })))
}

/// POST /api/v1/review/:id/reject — discard the verdict and re-queue the
/// image at high priority.
pub async fn reject_classification(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let id = Uuid::parse_str(&id)
        .map_err(|_| (StatusCode::BAD_REQUEST, "invalid id format".to_string()))?;

    let result = queries::get_classification(&state.db, id)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "failed to load classification");
            (StatusCode::INTERNAL_SERVER_ERROR, "database error".to_string())
        })?
        .ok_or((StatusCode::NOT_FOUND, "classification not found".to_string()))?;

    let mut job = ClassificationJob {
        id: String::new(),
        product_id: result.product_id.to_string(),
        image_url: result.image_url,
        priority: RECLASSIFY_PRIORITY,
        created_at: Utc::now(),
        attempts: 0,
    };

    state.queue.enqueue(&mut job).await.map_err(|e| {
        tracing::error!(error = %e, "failed to re-queue classification");
        (StatusCode::INTERNAL_SERVER_ERROR, "failed to re-queue".to_string())
    })?;

    Ok(Json(serde_json::json!({ "status": "rejected_and_requeued" })))
}
