// handlers/protected/dashboards.rs - /api/dashboards
//
// Capability checks (view/edit/export) happen in DashboardService; a caller
// without the capability gets 403, an inactive or unknown dashboard 404.

use axum::{
    extract::{rejection::JsonRejection, Extension, Path, State},
    Json,
};
use serde_json::{json, Value};

use crate::access::Principal;
use crate::app::AppState;
use crate::database::models::{Dashboard, DashboardDetail, DashboardGrant, DashboardTab, Visualization};
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::dashboard_service::{
    CreateDashboardRequest, CreateTabRequest, CreateVisualizationRequest, DashboardExport, GrantRequest,
    UpdateDashboardRequest,
};

/// GET /api/dashboards - only the dashboards the caller may view
pub async fn list(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<Vec<DashboardDetail>> {
    let dashboards = state.services.dashboards.list_visible(&principal).await?;
    Ok(ApiResponse::success(dashboards))
}

pub async fn create(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    payload: Result<Json<CreateDashboardRequest>, JsonRejection>,
) -> ApiResult<DashboardDetail> {
    let Json(request) = payload?;
    let dashboard = state.services.dashboards.create(&principal, request).await?;
    Ok(ApiResponse::created(dashboard))
}

pub async fn get(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<i64>,
) -> ApiResult<DashboardDetail> {
    let dashboard = state.services.dashboards.get(&principal, id).await?;
    Ok(ApiResponse::success(dashboard))
}

pub async fn update(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<i64>,
    payload: Result<Json<UpdateDashboardRequest>, JsonRejection>,
) -> ApiResult<Dashboard> {
    let Json(request) = payload?;
    let dashboard = state.services.dashboards.update(&principal, id, request).await?;
    Ok(ApiResponse::success(dashboard))
}

/// DELETE /api/dashboards/:id - soft delete (admin)
pub async fn delete(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<i64>,
) -> ApiResult<Value> {
    state.services.dashboards.delete(&principal, id).await?;
    Ok(ApiResponse::success(json!({ "id": id, "deleted": true })))
}

pub async fn export(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<i64>,
) -> ApiResult<DashboardExport> {
    let export = state.services.dashboards.export(&principal, id).await?;
    Ok(ApiResponse::success(export))
}

pub async fn grants(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<i64>,
) -> ApiResult<Vec<DashboardGrant>> {
    let grants = state.services.dashboards.grants(&principal, id).await?;
    Ok(ApiResponse::success(grants))
}

/// PUT /api/dashboards/:id/permissions - `{role_id, view, edit, export}`
pub async fn put_grant(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<i64>,
    payload: Result<Json<GrantRequest>, JsonRejection>,
) -> ApiResult<DashboardGrant> {
    let Json(request) = payload?;
    let grant = state.services.dashboards.put_grant(&principal, id, request).await?;
    Ok(ApiResponse::success(grant))
}

pub async fn revoke(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path((id, role_id)): Path<(i64, i64)>,
) -> ApiResult<Value> {
    state.services.dashboards.revoke(&principal, id, role_id).await?;
    Ok(ApiResponse::success(json!({ "dashboard_id": id, "role_id": role_id, "revoked": true })))
}

pub async fn add_tab(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<i64>,
    payload: Result<Json<CreateTabRequest>, JsonRejection>,
) -> ApiResult<DashboardTab> {
    let Json(request) = payload?;
    let tab = state.services.dashboards.add_tab(&principal, id, request).await?;
    Ok(ApiResponse::created(tab))
}

pub async fn add_visualization(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path((id, tab_id)): Path<(i64, i64)>,
    payload: Result<Json<CreateVisualizationRequest>, JsonRejection>,
) -> ApiResult<Visualization> {
    let Json(request) = payload?;
    let viz = state
        .services
        .dashboards
        .add_visualization(&principal, id, tab_id, request)
        .await?;
    Ok(ApiResponse::created(viz))
}
