// handlers/public/auth/login.rs - POST /auth/login handler

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};

use crate::app::AppState;
use crate::audit::RequestMeta;
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::user_service::{LoginRequest, LoginResponse};

/// POST /auth/login - exchange credentials for a bearer token
///
/// Unknown email and wrong password produce the same 401 message. Accounts
/// that are not `active` get 403.
pub async fn login_post(
    State(state): State<AppState>,
    meta: RequestMeta,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<LoginResponse> {
    let Json(request) = payload?;
    let session = state.services.users.login(request, &meta).await?;
    Ok(ApiResponse::success(session))
}
