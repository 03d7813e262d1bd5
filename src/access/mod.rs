//! Dashboard access resolution.
//!
//! Visibility is decided by two rules only: a principal holding one of the
//! [`ADMIN_ROLES`] sees every active dashboard, everyone else sees the active
//! dashboards for which one of their roles holds a grant with the requested
//! capability. There is no inheritance, no deny rule and no time-bounded grant.
//!
//! Every function here is pure: callers load the grants and dashboards and pass
//! the principal explicitly.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::database::models::dashboard::{Dashboard, DashboardGrant};
use crate::types::{Capability, CapabilitySet};

/// Seeded role names that bypass dashboard grants
pub const ADMIN_ROLES: &[&str] = &["super_admin", "admin"];

/// Role given to self-registered accounts
pub const DEFAULT_ROLE: &str = "user";

/// The authenticated actor making a request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: i64,
    pub roles: BTreeSet<String>,
}

impl Principal {
    pub fn new<I, S>(user_id: i64, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            user_id,
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_admin(&self) -> bool {
        is_admin(&self.roles)
    }

    pub fn is_self(&self, user_id: i64) -> bool {
        self.user_id == user_id
    }
}

/// True when any of the role names is an administrative role
pub fn is_admin<I, S>(roles: I) -> bool
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    roles
        .into_iter()
        .any(|role| ADMIN_ROLES.contains(&role.as_ref()))
}

/// Outcome of resolving a principal against one dashboard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    /// Administrative bypass, every capability allowed
    Admin,
    /// Union of the capabilities granted to the principal's roles
    Granted(CapabilitySet),
    Denied,
}

impl AccessDecision {
    pub fn allows(&self, capability: Capability) -> bool {
        match self {
            AccessDecision::Admin => true,
            AccessDecision::Granted(capabilities) => capabilities.allows(capability),
            AccessDecision::Denied => false,
        }
    }

    /// Effective capabilities, for display alongside a dashboard
    pub fn capabilities(&self) -> CapabilitySet {
        match self {
            AccessDecision::Admin => CapabilitySet::ALL,
            AccessDecision::Granted(capabilities) => *capabilities,
            AccessDecision::Denied => CapabilitySet::NONE,
        }
    }
}

/// Resolve the principal's standing on a single dashboard.
///
/// `grants` may contain rows for any roles and dashboards; only the ones matching
/// both the principal's roles and `dashboard_id` are considered.
pub fn decide<'a, G>(principal: &Principal, dashboard_id: i64, grants: G) -> AccessDecision
where
    G: IntoIterator<Item = &'a DashboardGrant>,
{
    if principal.is_admin() {
        return AccessDecision::Admin;
    }

    let capabilities = grants
        .into_iter()
        .filter(|grant| grant.dashboard_id == dashboard_id && principal.roles.contains(&grant.role_name))
        .fold(CapabilitySet::NONE, |acc, grant| acc.union(grant.capabilities));

    if capabilities.is_empty() {
        AccessDecision::Denied
    } else {
        AccessDecision::Granted(capabilities)
    }
}

pub fn can_perform<'a, G>(principal: &Principal, dashboard_id: i64, capability: Capability, grants: G) -> bool
where
    G: IntoIterator<Item = &'a DashboardGrant>,
{
    decide(principal, dashboard_id, grants).allows(capability)
}

/// Ids of the dashboards the principal may view, drawn from an already-loaded list.
/// Inactive dashboards are never visible, not even to admins.
pub fn visible_dashboards(principal: &Principal, grants: &[DashboardGrant], dashboards: &[Dashboard]) -> BTreeSet<i64> {
    let active = dashboards.iter().filter(|dashboard| dashboard.lifecycle.is_active());

    if principal.is_admin() {
        return active.map(|dashboard| dashboard.id).collect();
    }

    let viewable: BTreeSet<i64> = grants
        .iter()
        .filter(|grant| grant.capabilities.view && principal.roles.contains(&grant.role_name))
        .map(|grant| grant.dashboard_id)
        .collect();

    active
        .map(|dashboard| dashboard.id)
        .filter(|id| viewable.contains(id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Lifecycle;
    use chrono::Utc;

    fn dashboard(id: i64, lifecycle: Lifecycle) -> Dashboard {
        let now = Utc::now();
        Dashboard {
            id,
            name: format!("Dashboard {id}"),
            description: None,
            layout: serde_json::json!({}),
            lifecycle,
            created_by: 1,
            created_at: now,
            updated_at: now,
        }
    }

    fn grant(role: &str, dashboard_id: i64, view: bool, edit: bool, export: bool) -> DashboardGrant {
        let now = Utc::now();
        DashboardGrant {
            id: dashboard_id * 100,
            dashboard_id,
            role_id: role.len() as i64,
            role_name: role.to_string(),
            capabilities: CapabilitySet { view, edit, export },
            created_at: now,
            updated_at: now,
        }
    }

    fn ids(values: &[i64]) -> BTreeSet<i64> {
        values.iter().copied().collect()
    }

    #[test]
    fn admin_role_names_are_recognised() {
        assert!(is_admin(["admin"]));
        assert!(is_admin(vec!["user".to_string(), "super_admin".to_string()]));
        assert!(!is_admin(["user", "analyst"]));
        assert!(!is_admin(Vec::<String>::new()));
    }

    #[test]
    fn user_without_roles_sees_nothing() {
        let principal = Principal::new(5, Vec::<String>::new());
        let dashboards = vec![dashboard(1, Lifecycle::Active), dashboard(2, Lifecycle::Active)];
        let grants = vec![grant("user", 1, true, true, true)];

        assert!(visible_dashboards(&principal, &grants, &dashboards).is_empty());
        assert_eq!(decide(&principal, 1, &grants), AccessDecision::Denied);
    }

    #[test]
    fn ungranted_dashboard_is_invisible_to_every_non_admin() {
        let dashboards = vec![dashboard(1, Lifecycle::Active), dashboard(2, Lifecycle::Active)];
        let grants = vec![grant("user", 1, true, false, false), grant("analyst", 1, true, false, false)];

        for role in ["user", "analyst", "viewer"] {
            let principal = Principal::new(9, [role]);
            let visible = visible_dashboards(&principal, &grants, &dashboards);
            assert!(!visible.contains(&2), "role {role} should not see dashboard 2");
        }
    }

    #[test]
    fn inactive_dashboard_is_excluded_despite_grant() {
        let principal = Principal::new(3, ["user"]);
        let dashboards = vec![dashboard(1, Lifecycle::Inactive), dashboard(2, Lifecycle::Active)];
        let grants = vec![grant("user", 1, true, true, true), grant("user", 2, true, false, false)];

        assert_eq!(visible_dashboards(&principal, &grants, &dashboards), ids(&[2]));
    }

    #[test]
    fn view_flag_is_required_for_visibility() {
        let principal = Principal::new(3, ["user"]);
        let dashboards = vec![dashboard(4, Lifecycle::Active)];
        let grants = vec![grant("user", 4, false, true, true)];

        assert!(visible_dashboards(&principal, &grants, &dashboards).is_empty());
        assert!(can_perform(&principal, 4, Capability::Edit, &grants));
    }

    #[test]
    fn admin_sees_all_active_dashboards_regardless_of_grants() {
        let principal = Principal::new(1, ["admin"]);
        let dashboards = vec![
            dashboard(1, Lifecycle::Active),
            dashboard(2, Lifecycle::Inactive),
            dashboard(3, Lifecycle::Active),
        ];

        let no_grants: Vec<DashboardGrant> = Vec::new();
        assert_eq!(visible_dashboards(&principal, &no_grants, &dashboards), ids(&[1, 3]));
        assert_eq!(decide(&principal, 42, &no_grants), AccessDecision::Admin);
    }

    #[test]
    fn export_requires_an_export_grant_on_that_dashboard() {
        let principal = Principal::new(8, ["user", "analyst"]);
        let grants = vec![
            grant("user", 1, true, false, false),
            grant("analyst", 2, true, false, true),
            grant("auditor", 1, true, false, true),
        ];

        assert!(!can_perform(&principal, 1, Capability::Export, &grants));
        assert!(can_perform(&principal, 2, Capability::Export, &grants));
    }

    #[test]
    fn capabilities_from_several_roles_are_merged() {
        let principal = Principal::new(8, ["user", "editor"]);
        let grants = vec![grant("user", 6, true, false, false), grant("editor", 6, false, true, false)];

        let decision = decide(&principal, 6, &grants);
        assert_eq!(
            decision,
            AccessDecision::Granted(CapabilitySet { view: true, edit: true, export: false })
        );
        assert!(!decision.allows(Capability::Export));
    }

    #[test]
    fn resolution_is_idempotent() {
        let principal = Principal::new(2, ["user"]);
        let dashboards = vec![dashboard(1, Lifecycle::Active), dashboard(2, Lifecycle::Active)];
        let grants = vec![grant("user", 2, true, false, false)];

        let first = visible_dashboards(&principal, &grants, &dashboards);
        let second = visible_dashboards(&principal, &grants, &dashboards);
        assert_eq!(first, second);
    }

    #[test]
    fn scenario_view_and_export_without_edit() {
        let principal = Principal::new(11, ["user"]);
        let dashboards = vec![dashboard(7, Lifecycle::Active)];
        let grants = vec![grant("user", 7, true, false, true)];

        assert!(visible_dashboards(&principal, &grants, &dashboards).contains(&7));
        assert!(!can_perform(&principal, 7, Capability::Edit, &grants));
        assert!(can_perform(&principal, 7, Capability::Export, &grants));
    }

    #[test]
    fn scenario_admin_without_any_grant_rows() {
        let principal = Principal::new(1, ["admin"]);
        let dashboards = vec![dashboard(1, Lifecycle::Active), dashboard(2, Lifecycle::Active)];

        let no_grants: Vec<DashboardGrant> = Vec::new();
        assert_eq!(visible_dashboards(&principal, &no_grants, &dashboards), ids(&[1, 2]));
        for capability in [Capability::View, Capability::Edit, Capability::Export] {
            assert!(can_perform(&principal, 2, capability, &no_grants));
        }
    }
}
