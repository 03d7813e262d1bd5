// handlers/protected/auth/whoami.rs - GET /api/auth/whoami handler

use axum::extract::{Extension, State};

use crate::access::Principal;
use crate::app::AppState;
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::user_service::WhoAmI;

/// GET /api/auth/whoami - the caller's account, current roles and admin flag
pub async fn whoami_get(State(state): State<AppState>, Extension(principal): Extension<Principal>) -> ApiResult<WhoAmI> {
    let me = state.services.users.whoami(&principal).await?;
    Ok(ApiResponse::success(me))
}
