//! Business rules for each resource. Services take the caller's [`Principal`]
//! explicitly, authorize and validate before any write, and record exactly one
//! audit event per successful mutation.

pub mod audit_service;
pub mod dashboard_service;
pub mod data_model_service;
pub mod role_service;
pub mod upload_service;
pub mod user_service;

use std::sync::Arc;
use thiserror::Error;

pub use audit_service::AuditService;
pub use dashboard_service::DashboardService;
pub use data_model_service::DataModelService;
pub use role_service::RoleService;
pub use upload_service::UploadService;
pub use user_service::UserService;

use crate::access::Principal;
use crate::audit::{AuditError, AuditFailurePolicy, AuditRecorder};
use crate::auth::AuthError;
use crate::config::UploadConfig;
use crate::database::{DatabaseError, Store};
use crate::error::MSG_ADMIN_REQUIRED;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    Unauthenticated(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    /// First violated rule only
    #[error("{message}")]
    Validation { field: Option<String>, message: String },

    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Audit(#[from] AuditError),
}

impl ServiceError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        ServiceError::Validation {
            field: Some(field.into()),
            message: message.into(),
        }
    }

    /// A rule violation not tied to one request field
    pub fn invalid(message: impl Into<String>) -> Self {
        ServiceError::Validation {
            field: None,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ServiceError::NotFound(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ServiceError::Forbidden(message.into())
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

pub(crate) fn require_admin(principal: &Principal) -> ServiceResult<()> {
    if principal.is_admin() {
        Ok(())
    } else {
        tracing::warn!("user {} denied admin-only operation", principal.user_id);
        Err(ServiceError::forbidden(MSG_ADMIN_REQUIRED))
    }
}

/// Every resource service, sharing one store and one audit recorder
#[derive(Clone)]
pub struct Services {
    pub users: UserService,
    pub roles: RoleService,
    pub dashboards: DashboardService,
    pub data_models: DataModelService,
    pub uploads: UploadService,
    pub audit_logs: AuditService,
}

impl Services {
    pub fn new(store: Arc<dyn Store>, policy: AuditFailurePolicy, upload: UploadConfig) -> Self {
        let audit = AuditRecorder::new(store.clone(), policy);

        Self {
            users: UserService::new(store.clone(), audit.clone()),
            roles: RoleService::new(store.clone(), audit.clone()),
            dashboards: DashboardService::new(store.clone(), audit.clone()),
            data_models: DataModelService::new(store.clone(), audit.clone()),
            uploads: UploadService::new(store.clone(), audit, upload),
            audit_logs: AuditService::new(store),
        }
    }
}
