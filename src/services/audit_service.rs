use serde::Deserialize;
use std::sync::Arc;

use super::{require_admin, ServiceResult};
use crate::access::Principal;
use crate::database::models::{AuditLog, AuditQuery};
use crate::database::Store;
use crate::types::{AuditAction, ResourceType};

const DEFAULT_LIMIT: i64 = 100;
const MAX_LIMIT: i64 = 500;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditListQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub action: Option<AuditAction>,
    pub resource_type: Option<ResourceType>,
    pub actor: Option<i64>,
}

/// Read side of the audit trail
#[derive(Clone)]
pub struct AuditService {
    store: Arc<dyn Store>,
}

impl AuditService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn list(&self, principal: &Principal, query: AuditListQuery) -> ServiceResult<Vec<AuditLog>> {
        require_admin(principal)?;

        let query = AuditQuery {
            limit: query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT),
            offset: query.offset.unwrap_or(0).max(0),
            action: query.action,
            resource_type: query.resource_type,
            actor: query.actor,
        };
        Ok(self.store.list_audit(&query).await?)
    }
}
