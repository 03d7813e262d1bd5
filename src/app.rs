use axum::{
    extract::State,
    http::{HeaderValue, StatusCode, Uri},
    middleware::{from_fn, from_fn_with_state},
    response::{IntoResponse, Json},
    routing::{get, post, put},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};

use crate::config::AppConfig;
use crate::database::Store;
use crate::error::ApiError;
use crate::handlers;
use crate::middleware::{jwt_auth_middleware, validate_user_middleware};
use crate::services::Services;

/// Shared by every handler. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub services: Services,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, config: &AppConfig) -> Self {
        let services = Services::new(store.clone(), config.audit.failure_policy, config.upload.clone());
        Self { store, services }
    }
}

pub fn app(state: AppState, config: &AppConfig) -> Router {
    let router = Router::new()
        // Public
        .route("/", get(root))
        .route("/health", get(health))
        .merge(auth_public_routes())
        // Protected API: JWT first, then the user is re-validated against the store
        .merge(
            protected_routes()
                .route_layer(from_fn_with_state(state.clone(), validate_user_middleware))
                .route_layer(from_fn(jwt_auth_middleware)),
        )
        .fallback(not_found)
        .with_state(state)
        .layer(RequestBodyLimitLayer::new(config.api.max_request_size_bytes));

    let router = match cors_layer(config) {
        Some(cors) => router.layer(cors),
        None => router,
    };

    if config.api.enable_request_logging {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

fn cors_layer(config: &AppConfig) -> Option<CorsLayer> {
    let security = &config.security;
    if !security.enable_cors {
        return None;
    }

    if security.cors_origins.is_empty() || security.cors_origins.iter().any(|origin| origin == "*") {
        return Some(CorsLayer::permissive());
    }

    let origins: Vec<HeaderValue> = security
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("ignoring invalid CORS origin {:?}", origin);
                None
            }
        })
        .collect();

    Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any),
    )
}

fn auth_public_routes() -> Router<AppState> {
    use handlers::public::auth;

    Router::new()
        .route("/auth/register", post(auth::register_post))
        .route("/auth/login", post(auth::login_post))
}

fn protected_routes() -> Router<AppState> {
    use handlers::protected::{audit, auth, dashboards, data_models, roles, uploads, users};

    Router::new()
        .route("/api/auth/whoami", get(auth::whoami_get))
        .route("/api/auth/refresh", post(auth::refresh_post))
        // Users
        .route("/api/users", get(users::list))
        .route("/api/users/:id", get(users::get).put(users::update).delete(users::delete))
        .route("/api/users/:id/approve", post(users::approve))
        .route("/api/users/:id/roles", put(users::set_roles))
        // Roles and permissions
        .route("/api/roles", get(roles::list).post(roles::create))
        .route("/api/roles/:id", axum::routing::delete(roles::delete))
        .route("/api/permissions", get(roles::permissions))
        // Dashboards
        .route("/api/dashboards", get(dashboards::list).post(dashboards::create))
        .route(
            "/api/dashboards/:id",
            get(dashboards::get).put(dashboards::update).delete(dashboards::delete),
        )
        .route("/api/dashboards/:id/export", get(dashboards::export))
        .route(
            "/api/dashboards/:id/permissions",
            get(dashboards::grants).put(dashboards::put_grant),
        )
        .route(
            "/api/dashboards/:id/permissions/:role_id",
            axum::routing::delete(dashboards::revoke),
        )
        .route("/api/dashboards/:id/tabs", post(dashboards::add_tab))
        .route(
            "/api/dashboards/:id/tabs/:tab_id/visualizations",
            post(dashboards::add_visualization),
        )
        // Data models
        .route("/api/data-models", get(data_models::list).post(data_models::create))
        .route(
            "/api/data-models/:id",
            get(data_models::get).put(data_models::update).delete(data_models::delete),
        )
        .route("/api/data-models/:id/relationships", post(data_models::add_relationship))
        // Uploads
        .route("/api/uploads", get(uploads::list).post(uploads::create))
        .route("/api/uploads/:id", get(uploads::get).put(uploads::update))
        .route("/api/uploads/:id/rollback", post(uploads::rollback))
        // Audit trail
        .route("/api/audit-logs", get(audit::list))
}

async fn root() -> Json<Value> {
    Json(json!({
        "success": true,
        "data": {
            "name": "BI Admin API",
            "version": env!("CARGO_PKG_VERSION"),
            "description": "Users, roles, dashboards, data models and upload tracking for the BI dashboard",
            "endpoints": {
                "home": "/ (public)",
                "health": "/health (public)",
                "public_auth": "/auth/register, /auth/login (public - token acquisition)",
                "auth": "/api/auth/whoami, /api/auth/refresh (protected)",
                "users": "/api/users[/:id[/approve|/roles]] (protected)",
                "roles": "/api/roles[/:id], /api/permissions (protected)",
                "dashboards": "/api/dashboards[/:id[/export|/permissions|/tabs]] (protected)",
                "data_models": "/api/data-models[/:id[/relationships]] (protected)",
                "uploads": "/api/uploads[/:id[/rollback]] (protected)",
                "audit": "/api/audit-logs (protected, admin)",
            }
        }
    }))
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let now = chrono::Utc::now();

    match state.store.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "data": {
                    "status": "ok",
                    "timestamp": now,
                    "database": "ok"
                }
            })),
        ),
        Err(e) => {
            tracing::warn!("health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "success": false,
                    "error": true,
                    "code": "SERVICE_UNAVAILABLE",
                    "message": "Database unavailable",
                    "data": {
                        "status": "degraded",
                        "timestamp": now,
                        "database": "unavailable"
                    }
                })),
            )
        }
    }
}

async fn not_found(uri: Uri) -> ApiError {
    ApiError::not_found(format!("No route for {}", uri.path()))
}
