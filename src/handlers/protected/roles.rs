// handlers/protected/roles.rs - /api/roles and /api/permissions

use axum::{
    extract::{rejection::JsonRejection, Extension, Path, State},
    Json,
};
use serde_json::{json, Value};

use crate::access::Principal;
use crate::app::AppState;
use crate::database::models::{Permission, RoleWithPermissions};
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::role_service::CreateRoleRequest;

pub async fn list(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<Vec<RoleWithPermissions>> {
    let roles = state.services.roles.list(&principal).await?;
    Ok(ApiResponse::success(roles))
}

pub async fn create(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    payload: Result<Json<CreateRoleRequest>, JsonRejection>,
) -> ApiResult<RoleWithPermissions> {
    let Json(request) = payload?;
    let role = state.services.roles.create(&principal, request).await?;
    Ok(ApiResponse::created(role))
}

/// DELETE /api/roles/:id - system roles are refused with 403
pub async fn delete(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<i64>,
) -> ApiResult<Value> {
    state.services.roles.delete(&principal, id).await?;
    Ok(ApiResponse::success(json!({ "id": id, "deleted": true })))
}

pub async fn permissions(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<Vec<Permission>> {
    let permissions = state.services.roles.permissions(&principal).await?;
    Ok(ApiResponse::success(permissions))
}
