use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::db::queries;
use crate::models::classification::UpdateClassificationRequest;

const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub status: Option<String>,
}

impl ListQuery {
    pub fn page(&self) -> (i64, i64) {
        let limit = self.limit.unwrap_or(50).clamp(1, MAX_PAGE_SIZE);
        let offset = self.offset.unwrap_or(0).max(0);
        (limit, offset)
    }
}

/// GET /api/v1/results — paginated results, optionally filtered by status.
pub async fn list_classifications(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let (limit, offset) = query.page();

    let (data, total) =
        queries::list_classifications(&state.db, limit, offset, query.status.as_deref())
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "failed to list classifications");
                (StatusCode::INTERNAL_SERVER_ERROR, "failed to fetch classifications".to_string())
            })?;

    Ok(Json(serde_json::json!({
        "data": data,
        "total": total,
        "limit": limit,
        "offset": offset,
    })))
}

/// PUT /api/v1/results/:id — manual correction of a classification.
pub async fn update_classification(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateClassificationRequest>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let id = Uuid::parse_str(&id)
        .map_err(|_| (StatusCode::BAD_REQUEST, "invalid id format".to_string()))?;

    let no_fields = req.category.is_none()
        && req.sub_category.is_none()
        && req.gender.is_none()
        && req.style.is_none()
        && req.season.is_none()
        && req.primary_color.is_none();
    if no_fields {
        return Err((StatusCode::BAD_REQUEST, "no fields to update".to_string()));
    }

    let rows = queries::update_classification(&state.db, id, &req)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "failed to update classification");
            (StatusCode::INTERNAL_SERVER_ERROR, "failed to update".to_string())
        })?;

    if rows == 0 {
        return Err((StatusCode::NOT_FOUND, "classification not found".to_string()));
    }

    Ok(Json(serde_json::json!({ "status": "updated" })))
}
