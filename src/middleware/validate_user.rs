use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use super::auth::AuthUser;
use crate::app::AppState;
use crate::error::{ApiError, MSG_UNAUTHORIZED};

/// Middleware that re-loads the token's user from the store.
///
/// The account must still exist and be `active`, and the principal handed to
/// the handlers carries the role names currently assigned in the store rather
/// than the ones baked into the token.
pub async fn validate_user_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth_user = request
        .extensions()
        .get::<AuthUser>()
        .cloned()
        .ok_or_else(|| ApiError::unauthorized(MSG_UNAUTHORIZED))?;

    let (user, principal) = state.services.users.session(auth_user.user_id).await.map_err(|e| {
        tracing::warn!("session for user {} ({}) refused: {}", auth_user.user_id, auth_user.email, e);
        ApiError::from(e)
    })?;

    tracing::debug!("user {} validated with roles {:?}", user.id, principal.roles);

    request.extensions_mut().insert(principal);

    Ok(next.run(request).await)
}
