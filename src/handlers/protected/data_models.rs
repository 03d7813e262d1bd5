// handlers/protected/data_models.rs - /api/data-models

use axum::{
    extract::{rejection::JsonRejection, Extension, Path, State},
    Json,
};
use serde_json::{json, Value};

use crate::access::Principal;
use crate::app::AppState;
use crate::database::models::{DataModel, DataModelDetail, DataRelationship};
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::data_model_service::{CreateDataModelRequest, CreateRelationshipRequest, UpdateDataModelRequest};

pub async fn list(State(state): State<AppState>, Extension(principal): Extension<Principal>) -> ApiResult<Vec<DataModel>> {
    let models = state.services.data_models.list(&principal).await?;
    Ok(ApiResponse::success(models))
}

pub async fn create(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    payload: Result<Json<CreateDataModelRequest>, JsonRejection>,
) -> ApiResult<DataModel> {
    let Json(request) = payload?;
    let model = state.services.data_models.create(&principal, request).await?;
    Ok(ApiResponse::created(model))
}

/// GET /api/data-models/:id - includes relationships in both directions
pub async fn get(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<i64>,
) -> ApiResult<DataModelDetail> {
    let model = state.services.data_models.get(&principal, id).await?;
    Ok(ApiResponse::success(model))
}

pub async fn update(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<i64>,
    payload: Result<Json<UpdateDataModelRequest>, JsonRejection>,
) -> ApiResult<DataModel> {
    let Json(request) = payload?;
    let model = state.services.data_models.update(&principal, id, request).await?;
    Ok(ApiResponse::success(model))
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<i64>,
) -> ApiResult<Value> {
    state.services.data_models.delete(&principal, id).await?;
    Ok(ApiResponse::success(json!({ "id": id, "deleted": true })))
}

pub async fn add_relationship(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<i64>,
    payload: Result<Json<CreateRelationshipRequest>, JsonRejection>,
) -> ApiResult<DataRelationship> {
    let Json(request) = payload?;
    let relationship = state.services.data_models.add_relationship(&principal, id, request).await?;
    Ok(ApiResponse::created(relationship))
}
