// handlers/public/auth/register.rs - POST /auth/register handler

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde_json::{json, Value};

use crate::app::AppState;
use crate::audit::RequestMeta;
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::user_service::RegisterRequest;

/// POST /auth/register - create a pending account
///
/// ```json
/// { "full_name": "string", "email": "string", "password": "string (8+)" }
/// ```
///
/// The account cannot log in until an admin approves it.
pub async fn register_post(
    State(state): State<AppState>,
    meta: RequestMeta,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> ApiResult<Value> {
    let Json(request) = payload?;
    let user = state.services.users.register(request, &meta).await?;

    Ok(ApiResponse::created(json!({
        "message": "Registration successful. Awaiting admin approval.",
        "user": user,
    })))
}
