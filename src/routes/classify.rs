use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::db::queries;
use crate::models::classification::{
    BatchClassificationRequest, BatchClassificationResponse, ClassificationJob,
    ClassificationResult, SubmitClassificationRequest,
};

const MAX_BATCH_ITEMS: usize = 1000;

fn validate_item(product_id: &str, image_url: &str) -> Result<(), (StatusCode, String)> {
    Uuid::parse_str(product_id)
        .map_err(|_| (StatusCode::BAD_REQUEST, format!("invalid product id: {product_id}")))?;
    reqwest::Url::parse(image_url)
        .map_err(|_| (StatusCode::BAD_REQUEST, format!("invalid image url: {image_url}")))?;
    Ok(())
}

fn job_for(product_id: String, image_url: String, priority: i32) -> ClassificationJob {
    ClassificationJob {
        id: String::new(),
        product_id,
        image_url,
        priority,
        created_at: Utc::now(),
        attempts: 0,
    }
}

/// POST /api/v1/classify — queue a single image for classification.
pub async fn submit_classification(
    State(state): State<AppState>,
    Json(req): Json<SubmitClassificationRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), (StatusCode, String)> {
    validate_item(&req.product_id, &req.image_url)?;

    let mut job = job_for(req.product_id.clone(), req.image_url, req.priority);
    state.queue.enqueue(&mut job).await.map_err(|e| {
        tracing::error!(error = %e, "failed to enqueue job");
        (StatusCode::INTERNAL_SERVER_ERROR, "failed to queue classification".to_string())
    })?;

    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({
            "job_id": job.id,
            "product_id": req.product_id,
            "status": "queued",
            "message": "classification job submitted",
        })),
    ))
}

/// POST /api/v1/classify/batch — queue up to 1000 images at once.
pub async fn submit_batch(
    State(state): State<AppState>,
    Json(req): Json<BatchClassificationRequest>,
) -> Result<(StatusCode, Json<BatchClassificationResponse>), (StatusCode, String)> {
    if req.items.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "no items provided".to_string()));
    }
    if req.items.len() > MAX_BATCH_ITEMS {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("maximum {MAX_BATCH_ITEMS} items per batch"),
        ));
    }

    let mut jobs = Vec::with_capacity(req.items.len());
    for item in &req.items {
        validate_item(&item.product_id, &item.image_url)?;
        jobs.push(job_for(item.product_id.clone(), item.image_url.clone(), item.priority));
    }

    state.queue.enqueue_batch(&mut jobs).await.map_err(|e| {
        tracing::error!(error = %e, "failed to enqueue batch");
        (StatusCode::INTERNAL_SERVER_ERROR, "failed to queue batch".to_string())
    })?;

    Ok((
        StatusCode::ACCEPTED,
        Json(BatchClassificationResponse {
            job_id: Uuid::new_v4().to_string(),
            total_items: jobs.len(),
            status: "queued".to_string(),
            message: "batch classification submitted".to_string(),
        }),
    ))
}

/// GET /api/v1/classify/:id — fetch a classification result by its id.
pub async fn get_classification(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ClassificationResult>, (StatusCode, String)> {
    let id = Uuid::parse_str(&id)
        .map_err(|_| (StatusCode::BAD_REQUEST, "invalid id format".to_string()))?;

    let result = queries::get_classification(&state.db, id)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "failed to get classification");
            (StatusCode::INTERNAL_SERVER_ERROR, "database error".to_string())
        })?
        .ok_or((StatusCode::NOT_FOUND, "classification not found".to_string()))?;

    Ok(Json(result))
}

/// GET /api/v1/classify/product/:product_id — fetch the result for a product.
pub async fn get_classification_by_product(
    State(state): State<AppState>,
    Path(product_id): Path<String>,
) -> Result<Json<ClassificationResult>, (StatusCode, String)> {
    let product_id = Uuid::parse_str(&product_id)
        .map_err(|_| (StatusCode::BAD_REQUEST, "invalid product id format".to_string()))?;

    let result = queries::get_classification_by_product(&state.db, product_id)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "failed to get classification");
            (StatusCode::INTERNAL_SERVER_ERROR, "database error".to_string())
        })?
        .ok_or((
            StatusCode::NOT_FOUND,
            "classification not found for product".to_string(),
        ))?;

    Ok(Json(result))
}
