/// Shared types used across the codebase

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Raised when a stored or submitted string does not name a known variant
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// Implements `as_str`, `Display` and `FromStr` for a fieldless enum stored as text
macro_rules! text_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(UnknownVariant { kind: $kind, value: other.to_string() }),
                }
            }
        }
    };
}

/// User account lifecycle. New accounts wait in `Pending` until an admin approves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Pending,
    Active,
    Inactive,
    Suspended,
}

text_enum!(UserStatus, "user status", {
    Pending => "pending",
    Active => "active",
    Inactive => "inactive",
    Suspended => "suspended",
});

impl UserStatus {
    /// Lifecycle moves an account may make. Nothing returns to `Pending`, and
    /// `Pending -> Active` is the approval step, which only `approve` performs.
    pub fn can_transition_to(self, next: UserStatus) -> bool {
        use UserStatus::*;
        matches!(
            (self, next),
            (Pending, Active)
                | (Pending, Inactive)
                | (Active, Inactive)
                | (Active, Suspended)
                | (Inactive, Active)
                | (Inactive, Suspended)
                | (Suspended, Active)
                | (Suspended, Inactive)
        )
    }
}

/// Upload bookkeeping states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Reverted,
}

text_enum!(UploadStatus, "upload status", {
    Pending => "pending",
    Processing => "processing",
    Completed => "completed",
    Failed => "failed",
    Reverted => "reverted",
});

impl UploadStatus {
    /// Single-step transitions only; `Reverted` is reachable solely from `Completed`.
    pub fn can_transition_to(self, next: UploadStatus) -> bool {
        use UploadStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Failed)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Completed, Reverted)
        )
    }
}

/// Soft-delete state for dashboards, data models and relationships
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lifecycle {
    Active,
    Inactive,
}

impl Lifecycle {
    pub fn is_active(self) -> bool {
        matches!(self, Lifecycle::Active)
    }
}

impl From<bool> for Lifecycle {
    fn from(active: bool) -> Self {
        if active {
            Lifecycle::Active
        } else {
            Lifecycle::Inactive
        }
    }
}

impl From<Lifecycle> for bool {
    fn from(lifecycle: Lifecycle) -> Self {
        lifecycle.is_active()
    }
}

/// Something a role may be granted on a dashboard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    View,
    Edit,
    Export,
}

text_enum!(Capability, "capability", {
    View => "view",
    Edit => "edit",
    Export => "export",
});

/// Capability record stored per (role, dashboard) grant, serialized as `{view, edit, export}`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CapabilitySet {
    #[serde(default)]
    pub view: bool,
    #[serde(default)]
    pub edit: bool,
    #[serde(default)]
    pub export: bool,
}

impl CapabilitySet {
    pub const NONE: CapabilitySet = CapabilitySet { view: false, edit: false, export: false };
    pub const ALL: CapabilitySet = CapabilitySet { view: true, edit: true, export: true };

    pub fn allows(&self, capability: Capability) -> bool {
        match capability {
            Capability::View => self.view,
            Capability::Edit => self.edit,
            Capability::Export => self.export,
        }
    }

    pub fn union(self, other: CapabilitySet) -> CapabilitySet {
        CapabilitySet {
            view: self.view || other.view,
            edit: self.edit || other.edit,
            export: self.export || other.export,
        }
    }

    pub fn is_empty(&self) -> bool {
        !(self.view || self.edit || self.export)
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        let mut set = CapabilitySet::NONE;
        for capability in iter {
            match capability {
                Capability::View => set.view = true,
                Capability::Edit => set.edit = true,
                Capability::Export => set.export = true,
            }
        }
        set
    }
}

/// Verb recorded in the audit trail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditAction {
    Register,
    Login,
    Create,
    Update,
    Delete,
    Approve,
    Rollback,
    Grant,
    Revoke,
    Assign,
}

text_enum!(AuditAction, "audit action", {
    Register => "register",
    Login => "login",
    Create => "create",
    Update => "update",
    Delete => "delete",
    Approve => "approve",
    Rollback => "rollback",
    Grant => "grant",
    Revoke => "revoke",
    Assign => "assign",
});

/// Kind of record an audit entry refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    User,
    Role,
    Dashboard,
    DashboardTab,
    Visualization,
    DataModel,
    Upload,
}

text_enum!(ResourceType, "resource type", {
    User => "user",
    Role => "role",
    Dashboard => "dashboard",
    DashboardTab => "dashboard_tab",
    Visualization => "visualization",
    DataModel => "data_model",
    Upload => "upload",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditOutcome {
    Success,
    Failed,
}

text_enum!(AuditOutcome, "audit outcome", {
    Success => "success",
    Failed => "failed",
});

/// Field types a data model column may declare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Date,
    Datetime,
    Boolean,
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipKind {
    OneToOne,
    OneToMany,
    ManyToMany,
}

text_enum!(RelationshipKind, "relationship kind", {
    OneToOne => "one_to_one",
    OneToMany => "one_to_many",
    ManyToMany => "many_to_many",
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_transitions_are_single_step() {
        use UploadStatus::*;
        assert!(Pending.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Completed));
        assert!(Completed.can_transition_to(Reverted));
        assert!(!Pending.can_transition_to(Completed));
        assert!(!Pending.can_transition_to(Reverted));
        assert!(!Failed.can_transition_to(Reverted));
        assert!(!Reverted.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Completed));
    }

    #[test]
    fn user_status_never_returns_to_pending() {
        use UserStatus::*;
        assert!(Pending.can_transition_to(Active));
        assert!(Active.can_transition_to(Suspended));
        assert!(Suspended.can_transition_to(Active));
        assert!(!Pending.can_transition_to(Suspended));
        for from in [Active, Inactive, Suspended] {
            assert!(!from.can_transition_to(Pending));
        }
    }

    #[test]
    fn text_enums_parse_their_own_output() {
        for status in UserStatus::ALL {
            assert_eq!(status.as_str().parse::<UserStatus>().unwrap(), *status);
        }
        assert_eq!("data_model".parse::<ResourceType>().unwrap(), ResourceType::DataModel);

        let err = "archived".parse::<UploadStatus>().unwrap_err();
        assert_eq!(err.to_string(), "unknown upload status 'archived'");
    }

    #[test]
    fn capability_set_reads_partial_json() {
        let caps: CapabilitySet = serde_json::from_str(r#"{"view": true, "export": true}"#).unwrap();
        assert!(caps.allows(Capability::View));
        assert!(!caps.allows(Capability::Edit));
        assert!(caps.allows(Capability::Export));
    }

    #[test]
    fn capability_union_and_collect() {
        let view_only: CapabilitySet = [Capability::View].into_iter().collect();
        let edit_only: CapabilitySet = [Capability::Edit].into_iter().collect();
        let merged = view_only.union(edit_only);
        assert!(merged.view && merged.edit && !merged.export);
        assert!(CapabilitySet::NONE.is_empty());
        assert!(!merged.is_empty());
    }

    #[test]
    fn lifecycle_round_trips_through_bool() {
        assert_eq!(Lifecycle::from(true), Lifecycle::Active);
        assert!(!bool::from(Lifecycle::Inactive));
    }
}
