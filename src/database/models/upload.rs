use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgRow, FromRow, Row};

use super::text_column;
use crate::types::UploadStatus;

/// Bookkeeping for one uploaded file. File contents are never parsed here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Upload {
    pub id: i64,
    pub user_id: i64,
    pub model_id: Option<i64>,
    pub file_name: String,
    pub file_size: Option<i64>,
    pub status: UploadStatus,
    pub records_count: i32,
    pub records_success: i32,
    pub records_failed: i32,
    pub error_log: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl<'r> FromRow<'r, PgRow> for Upload {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            model_id: row.try_get("model_id")?,
            file_name: row.try_get("file_name")?,
            file_size: row.try_get("file_size")?,
            status: text_column(row, "status")?,
            records_count: row.try_get("records_count")?,
            records_success: row.try_get("records_success")?,
            records_failed: row.try_get("records_failed")?,
            error_log: row.try_get("error_log")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            completed_at: row.try_get("completed_at")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewUpload {
    pub user_id: i64,
    pub model_id: Option<i64>,
    pub file_name: String,
    pub file_size: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct UploadChanges {
    pub status: Option<UploadStatus>,
    pub records_count: Option<i32>,
    pub records_success: Option<i32>,
    pub records_failed: Option<i32>,
    pub error_log: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl UploadChanges {
    pub fn touched(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.status.is_some() {
            fields.push("status");
        }
        if self.records_count.is_some() {
            fields.push("records_count");
        }
        if self.records_success.is_some() {
            fields.push("records_success");
        }
        if self.records_failed.is_some() {
            fields.push("records_failed");
        }
        if self.error_log.is_some() {
            fields.push("error_log");
        }
        fields
    }
}

#[derive(Debug, Clone, Default)]
pub struct UploadFilter {
    pub model_id: Option<i64>,
    pub status: Option<UploadStatus>,
    pub limit: i64,
}
