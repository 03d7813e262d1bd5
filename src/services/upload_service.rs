use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use validator::Validate;

use super::data_model_service::MSG_MODEL_NOT_FOUND;
use super::{require_admin, ServiceError, ServiceResult};
use crate::access::Principal;
use crate::audit::{AuditEvent, AuditRecorder};
use crate::config::UploadConfig;
use crate::database::models::{NewUpload, Upload, UploadChanges, UploadFilter};
use crate::database::Store;
use crate::error::MSG_FORBIDDEN;
use crate::types::{AuditAction, ResourceType, UploadStatus};
use crate::validation::{file_extension, ValidatedRequest};

pub const MSG_UPLOAD_NOT_FOUND: &str = "Upload not found";
pub const MSG_ROLLBACK_COMPLETED_ONLY: &str = "Can only rollback completed uploads";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UploadListQuery {
    pub model_id: Option<i64>,
    pub status: Option<UploadStatus>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateUploadRequest {
    pub model_id: Option<i64>,
    #[validate(length(min = 1, max = 255, message = "File name is required"))]
    pub file_name: String,
    #[validate(range(min = 0, message = "File size cannot be negative"))]
    pub file_size: Option<i64>,
}

impl ValidatedRequest for CreateUploadRequest {
    const FIELD_ORDER: &'static [&'static str] = &["file_name", "file_size"];
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateUploadRequest {
    pub status: Option<UploadStatus>,
    #[validate(range(min = 0, message = "Record counts cannot be negative"))]
    pub records_count: Option<i32>,
    #[validate(range(min = 0, message = "Record counts cannot be negative"))]
    pub records_success: Option<i32>,
    #[validate(range(min = 0, message = "Record counts cannot be negative"))]
    pub records_failed: Option<i32>,
    pub error_log: Option<String>,
}

impl ValidatedRequest for UpdateUploadRequest {
    const FIELD_ORDER: &'static [&'static str] = &["records_count", "records_success", "records_failed"];
}

/// Upload bookkeeping: who sent which file for which model, and where it is in
/// its pending → processing → completed/failed → reverted lifecycle.
#[derive(Clone)]
pub struct UploadService {
    store: Arc<dyn Store>,
    audit: AuditRecorder,
    config: UploadConfig,
}

impl UploadService {
    pub fn new(store: Arc<dyn Store>, audit: AuditRecorder, config: UploadConfig) -> Self {
        Self { store, audit, config }
    }

    /// Newest first; `limit` defaults to the configured page size and is capped
    pub async fn list(&self, _principal: &Principal, query: UploadListQuery) -> ServiceResult<Vec<Upload>> {
        let limit = query
            .limit
            .unwrap_or(self.config.default_list_limit)
            .clamp(1, self.config.max_list_limit.max(1));

        let filter = UploadFilter {
            model_id: query.model_id,
            status: query.status,
            limit,
        };
        Ok(self.store.list_uploads(&filter).await?)
    }

    pub async fn get(&self, _principal: &Principal, id: i64) -> ServiceResult<Upload> {
        self.load(id).await
    }

    pub async fn create(&self, principal: &Principal, request: CreateUploadRequest) -> ServiceResult<Upload> {
        request.check()?;
        self.check_file(&request)?;

        if let Some(model_id) = request.model_id {
            let model = self
                .store
                .find_data_model(model_id)
                .await?
                .ok_or_else(|| ServiceError::not_found(MSG_MODEL_NOT_FOUND))?;
            if !model.lifecycle.is_active() {
                return Err(ServiceError::validation("model_id", "Data model is not active"));
            }
        }

        let upload = self
            .store
            .insert_upload(&NewUpload {
                user_id: principal.user_id,
                model_id: request.model_id,
                file_name: request.file_name,
                file_size: request.file_size,
            })
            .await?;

        self.audit
            .record(
                AuditEvent::new(AuditAction::Create, ResourceType::Upload)
                    .actor(principal.user_id)
                    .resource(upload.id)
                    .detail(json!({ "file_name": upload.file_name, "model_id": upload.model_id })),
            )
            .await?;

        Ok(upload)
    }

    fn check_file(&self, request: &CreateUploadRequest) -> ServiceResult<()> {
        let allowed = &self.config.allowed_extensions;
        let accepted = file_extension(&request.file_name)
            .map(|ext| allowed.iter().any(|a| a.eq_ignore_ascii_case(&ext)))
            .unwrap_or(false);
        if !accepted {
            return Err(ServiceError::validation(
                "file_name",
                format!("Invalid file type. Allowed types: {}", allowed.join(", ")),
            ));
        }

        let max = self.config.max_file_size_bytes;
        if let Some(size) = request.file_size {
            if size as u64 > max {
                return Err(ServiceError::validation(
                    "file_size",
                    format!("File size exceeds maximum allowed size of {}MB", max / (1024 * 1024)),
                ));
            }
        }
        Ok(())
    }

    /// Progress report from whoever processes the file. Only the uploader or an
    /// admin may report, and status moves one step at a time.
    pub async fn update(&self, principal: &Principal, id: i64, request: UpdateUploadRequest) -> ServiceResult<Upload> {
        request.check()?;
        let current = self.load(id).await?;

        if current.user_id != principal.user_id && !principal.is_admin() {
            return Err(ServiceError::forbidden(MSG_FORBIDDEN));
        }

        // Re-reporting the current status only updates the counters
        let status = request.status.filter(|next| *next != current.status);
        if let Some(next) = status {
            if next == UploadStatus::Reverted {
                return Err(ServiceError::validation("status", "Use rollback to revert an upload"));
            }
            if !current.status.can_transition_to(next) {
                return Err(ServiceError::validation(
                    "status",
                    format!("Cannot change upload status from {} to {}", current.status, next),
                ));
            }
        }

        let changes = UploadChanges {
            status,
            records_count: request.records_count,
            records_success: request.records_success,
            records_failed: request.records_failed,
            error_log: request.error_log,
            completed_at: (status == Some(UploadStatus::Completed)).then(Utc::now),
        };
        let touched = changes.touched();
        if touched.is_empty() {
            return Ok(current);
        }

        let upload = self
            .store
            .update_upload(id, &changes)
            .await?
            .ok_or_else(|| ServiceError::not_found(MSG_UPLOAD_NOT_FOUND))?;

        self.audit
            .record(
                AuditEvent::new(AuditAction::Update, ResourceType::Upload)
                    .actor(principal.user_id)
                    .resource(id)
                    .detail(json!({ "updated": touched, "status": upload.status })),
            )
            .await?;

        Ok(upload)
    }

    /// Mark a completed upload as reverted. Status bookkeeping only; imported rows
    /// are not touched.
    pub async fn rollback(&self, principal: &Principal, id: i64) -> ServiceResult<Upload> {
        require_admin(principal)?;
        let current = self.load(id).await?;

        if current.status != UploadStatus::Completed {
            return Err(ServiceError::invalid(MSG_ROLLBACK_COMPLETED_ONLY));
        }

        let changes = UploadChanges {
            status: Some(UploadStatus::Reverted),
            ..Default::default()
        };
        let upload = self
            .store
            .update_upload(id, &changes)
            .await?
            .ok_or_else(|| ServiceError::not_found(MSG_UPLOAD_NOT_FOUND))?;

        tracing::info!("upload {} ({}) reverted by user {}", id, upload.file_name, principal.user_id);

        self.audit
            .record(
                AuditEvent::new(AuditAction::Rollback, ResourceType::Upload)
                    .actor(principal.user_id)
                    .resource(id)
                    .detail(json!({ "file_name": upload.file_name })),
            )
            .await?;

        Ok(upload)
    }

    async fn load(&self, id: i64) -> ServiceResult<Upload> {
        self.store
            .find_upload(id)
            .await?
            .ok_or_else(|| ServiceError::not_found(MSG_UPLOAD_NOT_FOUND))
    }
}
