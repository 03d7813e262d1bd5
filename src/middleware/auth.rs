use axum::{extract::Request, http::HeaderMap, middleware::Next, response::Response};

use crate::auth::{self, Claims};
use crate::config;
use crate::error::{ApiError, MSG_UNAUTHORIZED};

/// Token identity extracted from the bearer JWT. Roles here are what the token
/// was issued with; `validate_user_middleware` replaces them with the stored set.
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub user_id: i64,
    pub email: String,
    pub roles: Vec<String>,
    pub jti: String,
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: claims.sub,
            email: claims.email,
            roles: claims.roles,
            jti: claims.jti,
        }
    }
}

/// JWT authentication middleware that validates tokens and extracts user context.
/// Every rejection carries the same message; the reason only goes to the log.
pub async fn jwt_auth_middleware(headers: HeaderMap, mut request: Request, next: Next) -> Result<Response, ApiError> {
    let token = extract_jwt_from_headers(&headers).map_err(|reason| {
        tracing::debug!("rejecting {}: {}", request.uri().path(), reason);
        ApiError::unauthorized(MSG_UNAUTHORIZED)
    })?;

    let claims = auth::validate_jwt(token, &config::config().security).map_err(|e| {
        tracing::debug!("rejecting {}: {}", request.uri().path(), e);
        ApiError::from(e)
    })?;

    request.extensions_mut().insert(AuthUser::from(claims));

    Ok(next.run(request).await)
}

/// Extract the bearer token from the Authorization header
fn extract_jwt_from_headers(headers: &HeaderMap) -> Result<&str, &'static str> {
    let auth_header = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or("missing Authorization header")?;

    let auth_str = auth_header
        .to_str()
        .map_err(|_| "Authorization header is not valid ASCII")?;

    match auth_str.strip_prefix("Bearer ") {
        Some(token) if !token.trim().is_empty() => Ok(token.trim()),
        Some(_) => Err("empty bearer token"),
        None => Err("Authorization header must use the Bearer scheme"),
    }
}
