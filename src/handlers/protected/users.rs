// handlers/protected/users.rs - /api/users

use axum::{
    extract::{rejection::JsonRejection, Extension, Path, Query, State},
    Json,
};
use serde_json::{json, Value};

use crate::access::Principal;
use crate::app::AppState;
use crate::database::models::{User, UserWithRoles};
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::user_service::{SetRolesRequest, UpdateUserRequest, UserListQuery};

/// GET /api/users?status=&limit=&offset= - accounts with their roles (admin)
pub async fn list(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<UserListQuery>,
) -> ApiResult<Vec<UserWithRoles>> {
    let users = state.services.users.list(&principal, query).await?;
    Ok(ApiResponse::success(users))
}

/// GET /api/users/:id - self or admin
pub async fn get(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<i64>,
) -> ApiResult<UserWithRoles> {
    let user = state.services.users.get(&principal, id).await?;
    Ok(ApiResponse::success(user))
}

/// PUT /api/users/:id - self or admin; `status` is honoured for admins only
pub async fn update(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<i64>,
    payload: Result<Json<UpdateUserRequest>, JsonRejection>,
) -> ApiResult<User> {
    let Json(request) = payload?;
    let user = state.services.users.update(&principal, id, request).await?;
    Ok(ApiResponse::success(user))
}

/// DELETE /api/users/:id - admin, never one's own account
pub async fn delete(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<i64>,
) -> ApiResult<Value> {
    state.services.users.delete(&principal, id).await?;
    Ok(ApiResponse::success(json!({ "id": id, "deleted": true })))
}

/// POST /api/users/:id/approve - pending → active (admin)
pub async fn approve(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<i64>,
) -> ApiResult<User> {
    let user = state.services.users.approve(&principal, id).await?;
    Ok(ApiResponse::success(user))
}

/// PUT /api/users/:id/roles - replace the role set (admin)
pub async fn set_roles(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<i64>,
    payload: Result<Json<SetRolesRequest>, JsonRejection>,
) -> ApiResult<UserWithRoles> {
    let Json(request) = payload?;
    let user = state.services.users.set_roles(&principal, id, request).await?;
    Ok(ApiResponse::success(user))
}
