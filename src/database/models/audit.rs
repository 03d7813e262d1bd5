use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{postgres::PgRow, FromRow, Row};

use super::text_column;
use crate::types::{AuditAction, AuditOutcome, ResourceType};

/// Append-only audit row. There is no update or delete path for these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLog {
    pub id: i64,
    /// `None` for console actions and events with no authenticated actor
    pub user_id: Option<i64>,
    pub action: AuditAction,
    pub resource_type: ResourceType,
    pub resource_id: Option<i64>,
    pub details: Option<Value>,
    pub outcome: AuditOutcome,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for AuditLog {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            action: text_column(row, "action")?,
            resource_type: text_column(row, "resource_type")?,
            resource_id: row.try_get("resource_id")?,
            details: row.try_get("details")?,
            outcome: text_column(row, "outcome")?,
            ip_address: row.try_get("ip_address")?,
            user_agent: row.try_get("user_agent")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Filters for reviewing the audit trail, newest first
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    pub limit: i64,
    pub offset: i64,
    pub action: Option<AuditAction>,
    pub resource_type: Option<ResourceType>,
    pub actor: Option<i64>,
}

impl AuditQuery {
    pub fn matches(&self, log: &AuditLog) -> bool {
        self.action.map_or(true, |action| log.action == action)
            && self.resource_type.map_or(true, |kind| log.resource_type == kind)
            && self.actor.map_or(true, |actor| log.user_id == Some(actor))
    }
}
