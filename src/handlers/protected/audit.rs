// handlers/protected/audit.rs - GET /api/audit-logs

use axum::extract::{Extension, Query, State};

use crate::access::Principal;
use crate::app::AppState;
use crate::database::models::AuditLog;
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::audit_service::AuditListQuery;

/// Newest first; `?limit=&offset=&action=&resource_type=&actor=` (admin)
pub async fn list(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<AuditListQuery>,
) -> ApiResult<Vec<AuditLog>> {
    let entries = state.services.audit_logs.list(&principal, query).await?;
    Ok(ApiResponse::success(entries))
}
