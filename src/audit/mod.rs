//! Audit trail writer.
//!
//! Every state-changing service operation records exactly one [`AuditEvent`]
//! after its primary write has been committed. The audit insert is a separate
//! statement, so a failure here can never undo the mutation that preceded it;
//! [`AuditFailurePolicy`] only decides whether the caller hears about it.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

use crate::database::models::AuditLog;
use crate::database::{DatabaseError, Store};
use crate::types::{AuditAction, AuditOutcome, ResourceType, UnknownVariant};

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit write failed after the change was committed: {0}")]
    Write(#[from] DatabaseError),
}

/// What happens when the audit insert itself fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditFailurePolicy {
    /// Log the lost event at error level and report success to the caller
    #[default]
    LogAndContinue,
    /// Surface the failure to the caller as an internal error
    Propagate,
}

impl FromStr for AuditFailurePolicy {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "log" | "log_and_continue" | "continue" => Ok(AuditFailurePolicy::LogAndContinue),
            "propagate" | "fail" => Ok(AuditFailurePolicy::Propagate),
            other => Err(UnknownVariant {
                kind: "audit failure policy",
                value: other.to_string(),
            }),
        }
    }
}

/// Where a request came from, kept with the events it causes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RequestMeta {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// One entry to append to the audit trail
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEvent {
    pub actor: Option<i64>,
    pub action: AuditAction,
    pub resource_type: ResourceType,
    pub resource_id: Option<i64>,
    pub detail: Option<Value>,
    pub outcome: AuditOutcome,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl AuditEvent {
    pub fn new(action: AuditAction, resource_type: ResourceType) -> Self {
        Self {
            actor: None,
            action,
            resource_type,
            resource_id: None,
            detail: None,
            outcome: AuditOutcome::Success,
            ip_address: None,
            user_agent: None,
        }
    }

    pub fn actor(mut self, user_id: i64) -> Self {
        self.actor = Some(user_id);
        self
    }

    pub fn resource(mut self, id: i64) -> Self {
        self.resource_id = Some(id);
        self
    }

    pub fn detail(mut self, detail: Value) -> Self {
        self.detail = Some(detail);
        self
    }

    pub fn request(mut self, meta: &RequestMeta) -> Self {
        self.ip_address = meta.ip_address.clone();
        self.user_agent = meta.user_agent.clone();
        self
    }

    pub fn failed(mut self) -> Self {
        self.outcome = AuditOutcome::Failed;
        self
    }
}

#[derive(Clone)]
pub struct AuditRecorder {
    store: Arc<dyn Store>,
    policy: AuditFailurePolicy,
}

impl AuditRecorder {
    pub fn new(store: Arc<dyn Store>, policy: AuditFailurePolicy) -> Self {
        Self { store, policy }
    }

    /// Append one event. Returns the stored row, or `None` when the write
    /// failed and the policy says to carry on.
    pub async fn record(&self, event: AuditEvent) -> Result<Option<AuditLog>, AuditError> {
        match self.store.append_audit(&event).await {
            Ok(log) => {
                tracing::debug!(
                    "audit {}/{} resource={:?} actor={:?} outcome={}",
                    event.action,
                    event.resource_type,
                    event.resource_id,
                    event.actor,
                    event.outcome
                );
                Ok(Some(log))
            }
            Err(err) => match self.policy {
                AuditFailurePolicy::LogAndContinue => {
                    tracing::error!(
                        event = ?event,
                        "audit write failed, primary change already committed: {}",
                        err
                    );
                    Ok(None)
                }
                AuditFailurePolicy::Propagate => {
                    tracing::error!(
                        event = ?event,
                        "audit write failed, primary change already committed; reporting failure: {}",
                        err
                    );
                    Err(AuditError::Write(err))
                }
            },
        }
    }
}
