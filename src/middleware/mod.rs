pub mod auth;
pub mod request_meta;
pub mod response;
pub mod validate_user;

pub use auth::{jwt_auth_middleware, AuthUser};
pub use response::{ApiResponse, ApiResult};
pub use validate_user::validate_user_middleware;
