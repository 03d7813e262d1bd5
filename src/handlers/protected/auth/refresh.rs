// handlers/protected/auth/refresh.rs - POST /api/auth/refresh handler

use axum::extract::{Extension, State};

use crate::access::Principal;
use crate::app::AppState;
use crate::auth::IssuedToken;
use crate::middleware::{ApiResponse, ApiResult};

/// POST /api/auth/refresh - new token carrying the roles assigned right now
pub async fn refresh_post(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<IssuedToken> {
    let token = state.services.users.refresh(&principal).await?;
    Ok(ApiResponse::success(token))
}
