// handlers/protected/uploads.rs - /api/uploads (status bookkeeping only)

use axum::{
    extract::{rejection::JsonRejection, Extension, Path, Query, State},
    Json,
};

use crate::access::Principal;
use crate::app::AppState;
use crate::database::models::Upload;
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::upload_service::{CreateUploadRequest, UpdateUploadRequest, UploadListQuery};

/// GET /api/uploads?model_id=&status=&limit=
pub async fn list(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<UploadListQuery>,
) -> ApiResult<Vec<Upload>> {
    let uploads = state.services.uploads.list(&principal, query).await?;
    Ok(ApiResponse::success(uploads))
}

pub async fn create(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    payload: Result<Json<CreateUploadRequest>, JsonRejection>,
) -> ApiResult<Upload> {
    let Json(request) = payload?;
    let upload = state.services.uploads.create(&principal, request).await?;
    Ok(ApiResponse::created(upload))
}

pub async fn get(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<i64>,
) -> ApiResult<Upload> {
    let upload = state.services.uploads.get(&principal, id).await?;
    Ok(ApiResponse::success(upload))
}

pub async fn update(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<i64>,
    payload: Result<Json<UpdateUploadRequest>, JsonRejection>,
) -> ApiResult<Upload> {
    let Json(request) = payload?;
    let upload = state.services.uploads.update(&principal, id, request).await?;
    Ok(ApiResponse::success(upload))
}

/// POST /api/uploads/:id/rollback - completed → reverted (admin)
pub async fn rollback(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<i64>,
) -> ApiResult<Upload> {
    let upload = state.services.uploads.rollback(&principal, id).await?;
    Ok(ApiResponse::success(upload))
}
