use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use validator::Validate;

use super::{require_admin, ServiceError, ServiceResult};
use crate::access::{self, AccessDecision, Principal};
use crate::audit::{AuditEvent, AuditRecorder};
use crate::database::models::{
    Dashboard, DashboardChanges, DashboardDetail, DashboardGrant, DashboardTab, NewDashboard, NewTab,
    NewVisualization, Visualization,
};
use crate::database::Store;
use crate::error::MSG_FORBIDDEN;
use crate::types::{AuditAction, Capability, CapabilitySet, Lifecycle, ResourceType};
use crate::validation::ValidatedRequest;

pub const MSG_DASHBOARD_NOT_FOUND: &str = "Dashboard not found";
pub const MSG_TAB_NOT_FOUND: &str = "Tab not found";

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateDashboardRequest {
    #[validate(length(min = 1, max = 255, message = "Dashboard name is required"))]
    pub name: String,
    pub description: Option<String>,
    pub layout: Option<Value>,
}

impl ValidatedRequest for CreateDashboardRequest {
    const FIELD_ORDER: &'static [&'static str] = &["name"];
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateDashboardRequest {
    #[validate(length(min = 1, max = 255, message = "Dashboard name is required"))]
    pub name: Option<String>,
    pub description: Option<String>,
    pub layout: Option<Value>,
}

impl ValidatedRequest for UpdateDashboardRequest {
    const FIELD_ORDER: &'static [&'static str] = &["name"];
}

#[derive(Debug, Clone, Deserialize)]
pub struct GrantRequest {
    pub role_id: i64,
    #[serde(flatten)]
    pub capabilities: CapabilitySet,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateTabRequest {
    #[validate(length(min = 1, max = 255, message = "Tab name is required"))]
    pub name: String,
    /// Appended after the existing tabs when omitted
    pub position: Option<i32>,
    pub config: Option<Value>,
}

impl ValidatedRequest for CreateTabRequest {
    const FIELD_ORDER: &'static [&'static str] = &["name"];
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateVisualizationRequest {
    #[validate(length(min = 1, message = "Visualization type is required"))]
    pub kind: String,
    #[validate(length(max = 255, message = "Title must be at most 255 characters"))]
    pub title: Option<String>,
    #[serde(default)]
    pub config: Value,
    pub query: Option<String>,
    #[serde(default)]
    pub position: i32,
    pub refresh_rate: Option<i32>,
}

impl ValidatedRequest for CreateVisualizationRequest {
    const FIELD_ORDER: &'static [&'static str] = &["kind", "title"];
}

/// Portable definition returned by the export endpoint
#[derive(Debug, Clone, Serialize)]
pub struct DashboardExport {
    pub exported_at: DateTime<Utc>,
    pub dashboard: DashboardDetail,
}

#[derive(Clone)]
pub struct DashboardService {
    store: Arc<dyn Store>,
    audit: AuditRecorder,
}

impl DashboardService {
    pub fn new(store: Arc<dyn Store>, audit: AuditRecorder) -> Self {
        Self { store, audit }
    }

    /// Active dashboards the principal may view, newest first, with their tabs
    pub async fn list_visible(&self, principal: &Principal) -> ServiceResult<Vec<DashboardDetail>> {
        let roles: Vec<String> = principal.roles.iter().cloned().collect();
        let (grants, dashboards) =
            futures::try_join!(self.store.grants_for_roles(&roles), self.store.list_dashboards(true))?;

        let visible = access::visible_dashboards(principal, &grants, &dashboards);
        tracing::debug!("user {} sees {} of {} dashboards", principal.user_id, visible.len(), dashboards.len());

        let details = dashboards
            .into_iter()
            .filter(|dashboard| visible.contains(&dashboard.id))
            .map(|dashboard| {
                let capabilities = access::decide(principal, dashboard.id, &grants).capabilities();
                self.detail(dashboard, capabilities)
            });

        futures::future::try_join_all(details).await
    }

    /// One dashboard; admins also get its grant list
    pub async fn get(&self, principal: &Principal, id: i64) -> ServiceResult<DashboardDetail> {
        let (dashboard, decision, grants) = self.authorize(principal, id, Capability::View).await?;
        let mut detail = self.detail(dashboard, decision.capabilities()).await?;
        if principal.is_admin() {
            detail.grants = Some(grants);
        }
        Ok(detail)
    }

    pub async fn export(&self, principal: &Principal, id: i64) -> ServiceResult<DashboardExport> {
        let (dashboard, decision, _) = self.authorize(principal, id, Capability::Export).await?;
        Ok(DashboardExport {
            exported_at: Utc::now(),
            dashboard: self.detail(dashboard, decision.capabilities()).await?,
        })
    }

    pub async fn create(&self, principal: &Principal, request: CreateDashboardRequest) -> ServiceResult<DashboardDetail> {
        require_admin(principal)?;
        request.check()?;

        let dashboard = self
            .store
            .insert_dashboard(&NewDashboard {
                name: request.name,
                description: request.description,
                layout: request.layout.unwrap_or_else(|| json!({})),
                created_by: principal.user_id,
            })
            .await?;

        self.audit
            .record(
                AuditEvent::new(AuditAction::Create, ResourceType::Dashboard)
                    .actor(principal.user_id)
                    .resource(dashboard.id)
                    .detail(json!({ "name": dashboard.name })),
            )
            .await?;

        Ok(DashboardDetail::assemble(dashboard, vec![], vec![], CapabilitySet::ALL))
    }

    pub async fn update(&self, principal: &Principal, id: i64, request: UpdateDashboardRequest) -> ServiceResult<Dashboard> {
        let (current, _, _) = self.authorize(principal, id, Capability::Edit).await?;
        request.check()?;

        let changes = DashboardChanges {
            name: request.name,
            description: request.description,
            layout: request.layout,
        };
        let touched = changes.touched();
        if touched.is_empty() {
            return Ok(current);
        }

        let dashboard = self
            .store
            .update_dashboard(id, &changes)
            .await?
            .ok_or_else(|| ServiceError::not_found(MSG_DASHBOARD_NOT_FOUND))?;

        self.audit
            .record(
                AuditEvent::new(AuditAction::Update, ResourceType::Dashboard)
                    .actor(principal.user_id)
                    .resource(id)
                    .detail(json!({ "updated": touched })),
            )
            .await?;

        Ok(dashboard)
    }

    /// Soft delete. The row and its grants stay in place but the dashboard is
    /// no longer visible to anyone.
    pub async fn delete(&self, principal: &Principal, id: i64) -> ServiceResult<()> {
        require_admin(principal)?;
        let dashboard = self.active(id).await?;

        if !self.store.set_dashboard_lifecycle(id, Lifecycle::Inactive).await? {
            return Err(ServiceError::not_found(MSG_DASHBOARD_NOT_FOUND));
        }

        self.audit
            .record(
                AuditEvent::new(AuditAction::Delete, ResourceType::Dashboard)
                    .actor(principal.user_id)
                    .resource(id)
                    .detail(json!({ "name": dashboard.name })),
            )
            .await?;

        Ok(())
    }

    pub async fn grants(&self, principal: &Principal, id: i64) -> ServiceResult<Vec<DashboardGrant>> {
        require_admin(principal)?;
        self.active(id).await?;
        Ok(self.store.dashboard_grants(id).await?)
    }

    /// Create or replace one role's capabilities on the dashboard
    pub async fn put_grant(&self, principal: &Principal, id: i64, request: GrantRequest) -> ServiceResult<DashboardGrant> {
        require_admin(principal)?;
        self.active(id).await?;

        let role = self
            .store
            .find_role(request.role_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Role not found"))?;

        let grant = self.store.upsert_grant(id, role.id, request.capabilities).await?;

        self.audit
            .record(
                AuditEvent::new(AuditAction::Grant, ResourceType::Dashboard)
                    .actor(principal.user_id)
                    .resource(id)
                    .detail(json!({ "role": role.name, "capabilities": grant.capabilities })),
            )
            .await?;

        Ok(grant)
    }

    pub async fn revoke(&self, principal: &Principal, id: i64, role_id: i64) -> ServiceResult<()> {
        require_admin(principal)?;
        self.active(id).await?;

        if !self.store.delete_grant(id, role_id).await? {
            return Err(ServiceError::not_found("Grant not found"));
        }

        self.audit
            .record(
                AuditEvent::new(AuditAction::Revoke, ResourceType::Dashboard)
                    .actor(principal.user_id)
                    .resource(id)
                    .detail(json!({ "role_id": role_id })),
            )
            .await?;

        Ok(())
    }

    pub async fn add_tab(&self, principal: &Principal, id: i64, request: CreateTabRequest) -> ServiceResult<DashboardTab> {
        self.authorize(principal, id, Capability::Edit).await?;
        request.check()?;

        let position = match request.position {
            Some(position) => position,
            None => self.store.dashboard_tabs(id).await?.len() as i32,
        };

        let tab = self
            .store
            .insert_tab(&NewTab {
                dashboard_id: id,
                name: request.name,
                position,
                config: request.config.unwrap_or_else(|| json!({})),
            })
            .await?;

        self.audit
            .record(
                AuditEvent::new(AuditAction::Create, ResourceType::DashboardTab)
                    .actor(principal.user_id)
                    .resource(tab.id)
                    .detail(json!({ "dashboard_id": id, "name": tab.name })),
            )
            .await?;

        Ok(tab)
    }

    pub async fn add_visualization(
        &self,
        principal: &Principal,
        id: i64,
        tab_id: i64,
        request: CreateVisualizationRequest,
    ) -> ServiceResult<Visualization> {
        self.authorize(principal, id, Capability::Edit).await?;
        request.check()?;

        match self.store.find_tab(tab_id).await? {
            Some(tab) if tab.dashboard_id == id => {}
            _ => return Err(ServiceError::not_found(MSG_TAB_NOT_FOUND)),
        }

        let viz = self
            .store
            .insert_visualization(&NewVisualization {
                tab_id,
                kind: request.kind,
                title: request.title,
                config: request.config,
                query: request.query,
                position: request.position,
                refresh_rate: request.refresh_rate,
            })
            .await?;

        self.audit
            .record(
                AuditEvent::new(AuditAction::Create, ResourceType::Visualization)
                    .actor(principal.user_id)
                    .resource(viz.id)
                    .detail(json!({ "dashboard_id": id, "tab_id": tab_id, "kind": viz.kind })),
            )
            .await?;

        Ok(viz)
    }

    async fn active(&self, id: i64) -> ServiceResult<Dashboard> {
        match self.store.find_dashboard(id).await? {
            Some(dashboard) if dashboard.lifecycle.is_active() => Ok(dashboard),
            _ => Err(ServiceError::not_found(MSG_DASHBOARD_NOT_FOUND)),
        }
    }

    /// Load an active dashboard and require `capability` on it
    async fn authorize(
        &self,
        principal: &Principal,
        id: i64,
        capability: Capability,
    ) -> ServiceResult<(Dashboard, AccessDecision, Vec<DashboardGrant>)> {
        let (dashboard, grants) = futures::try_join!(self.active(id), async {
            self.store.dashboard_grants(id).await.map_err(ServiceError::from)
        })?;

        let decision = access::decide(principal, id, &grants);
        if !decision.allows(capability) {
            tracing::warn!("user {} denied {} on dashboard {}", principal.user_id, capability, id);
            return Err(ServiceError::forbidden(MSG_FORBIDDEN));
        }

        Ok((dashboard, decision, grants))
    }

    async fn detail(&self, dashboard: Dashboard, capabilities: CapabilitySet) -> ServiceResult<DashboardDetail> {
        let tabs = self.store.dashboard_tabs(dashboard.id).await?;
        let tab_ids: Vec<i64> = tabs.iter().map(|tab| tab.id).collect();
        let visualizations = if tab_ids.is_empty() {
            Vec::new()
        } else {
            self.store.tab_visualizations(&tab_ids).await?
        };
        Ok(DashboardDetail::assemble(dashboard, tabs, visualizations, capabilities))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UserStatus;
    use crate::testing::TestContext;

    fn tab(name: &str, position: Option<i32>) -> CreateTabRequest {
        CreateTabRequest {
            name: name.into(),
            position,
            config: None,
        }
    }

    fn chart(kind: &str, position: i32) -> CreateVisualizationRequest {
        CreateVisualizationRequest {
            kind: kind.into(),
            title: None,
            config: json!({ "x": "month" }),
            query: Some("SELECT 1".into()),
            position,
            refresh_rate: None,
        }
    }

    #[tokio::test]
    async fn capabilities_gate_edit_and_export() {
        let ctx = TestContext::new();
        let admin = ctx.admin().await;
        let (_, analyst) = ctx.user("ana@example.com", UserStatus::Active, &["analyst"]).await;
        let dashboard = ctx.dashboard("Sales", admin.user_id).await;
        ctx.grant(dashboard.id, "analyst", CapabilitySet { view: true, ..CapabilitySet::NONE }).await;

        let detail = ctx.services.dashboards.get(&analyst, dashboard.id).await.unwrap();
        assert!(detail.capabilities.view && !detail.capabilities.edit);
        assert!(detail.grants.is_none());

        let update = UpdateDashboardRequest {
            name: Some("Renamed".into()),
            ..Default::default()
        };
        let err = ctx.services.dashboards.update(&analyst, dashboard.id, update.clone()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));

        let err = ctx.services.dashboards.export(&analyst, dashboard.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));

        ctx.grant(dashboard.id, "analyst", CapabilitySet { view: true, edit: true, export: true }).await;
        let renamed = ctx.services.dashboards.update(&analyst, dashboard.id, update).await.unwrap();
        assert_eq!(renamed.name, "Renamed");
        ctx.services.dashboards.export(&analyst, dashboard.id).await.unwrap();

        let audit = ctx.audit();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].details, Some(json!({ "updated": ["name"] })));
    }

    #[tokio::test]
    async fn soft_deleted_dashboard_disappears() {
        let ctx = TestContext::new();
        let admin = ctx.admin().await;
        let (_, analyst) = ctx.user("ana@example.com", UserStatus::Active, &["analyst"]).await;
        let dashboard = ctx.dashboard("Ops", admin.user_id).await;
        ctx.grant(dashboard.id, "analyst", CapabilitySet::ALL).await;

        assert_eq!(ctx.services.dashboards.list_visible(&analyst).await.unwrap().len(), 1);

        ctx.services.dashboards.delete(&admin, dashboard.id).await.unwrap();

        assert!(ctx.services.dashboards.list_visible(&analyst).await.unwrap().is_empty());
        assert!(ctx.services.dashboards.list_visible(&admin).await.unwrap().is_empty());
        let err = ctx.services.dashboards.get(&admin, dashboard.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));

        // Never purged
        assert!(ctx.store.find_dashboard(dashboard.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn listing_orders_tabs_and_visualizations() {
        let ctx = TestContext::new();
        let admin = ctx.admin().await;
        let dashboard = ctx.dashboard("Ops", admin.user_id).await;

        let second = ctx.services.dashboards.add_tab(&admin, dashboard.id, tab("Second", Some(5))).await.unwrap();
        let first = ctx.services.dashboards.add_tab(&admin, dashboard.id, tab("First", Some(1))).await.unwrap();
        ctx.services
            .dashboards
            .add_visualization(&admin, dashboard.id, first.id, chart("bar", 2))
            .await
            .unwrap();
        ctx.services
            .dashboards
            .add_visualization(&admin, dashboard.id, first.id, chart("line", 0))
            .await
            .unwrap();

        let listed = ctx.services.dashboards.list_visible(&admin).await.unwrap();
        let tabs = &listed[0].tabs;
        assert_eq!(tabs[0].tab.id, first.id);
        assert_eq!(tabs[1].tab.id, second.id);
        let kinds: Vec<_> = tabs[0].visualizations.iter().map(|v| v.kind.as_str()).collect();
        assert_eq!(kinds, vec!["line", "bar"]);
        assert_eq!(listed[0].capabilities, CapabilitySet::ALL);

        let appended = ctx.services.dashboards.add_tab(&admin, dashboard.id, tab("Third", None)).await.unwrap();
        assert_eq!(appended.position, 2);
    }

    #[tokio::test]
    async fn visualization_tab_must_belong_to_dashboard() {
        let ctx = TestContext::new();
        let admin = ctx.admin().await;
        let ops = ctx.dashboard("Ops", admin.user_id).await;
        let sales = ctx.dashboard("Sales", admin.user_id).await;
        let ops_tab = ctx.services.dashboards.add_tab(&admin, ops.id, tab("Main", None)).await.unwrap();

        let err = ctx
            .services
            .dashboards
            .add_visualization(&admin, sales.id, ops_tab.id, chart("bar", 0))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(ref msg) if msg == MSG_TAB_NOT_FOUND));
    }

    #[tokio::test]
    async fn grant_and_revoke_are_audited() {
        let ctx = TestContext::new();
        let admin = ctx.admin().await;
        let dashboard = ctx.dashboard("Ops", admin.user_id).await;
        let analyst = ctx.role("analyst").await;

        let request = GrantRequest {
            role_id: analyst.id,
            capabilities: CapabilitySet { view: true, export: true, edit: false },
        };
        let grant = ctx.services.dashboards.put_grant(&admin, dashboard.id, request).await.unwrap();
        assert_eq!(grant.role_name, "analyst");

        let detail = ctx.services.dashboards.get(&admin, dashboard.id).await.unwrap();
        assert_eq!(detail.grants.map(|g| g.len()), Some(1));

        ctx.services.dashboards.revoke(&admin, dashboard.id, analyst.id).await.unwrap();
        let err = ctx.services.dashboards.revoke(&admin, dashboard.id, analyst.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));

        let actions: Vec<_> = ctx.audit().iter().map(|e| e.action).collect();
        assert_eq!(actions, vec![AuditAction::Grant, AuditAction::Revoke]);
    }

    #[tokio::test]
    async fn only_admins_create_dashboards() {
        let ctx = TestContext::new();
        let (_, analyst) = ctx.user("ana@example.com", UserStatus::Active, &["analyst"]).await;
        let admin = ctx.admin().await;

        let request = CreateDashboardRequest {
            name: "Revenue".into(),
            description: None,
            layout: None,
        };
        let err = ctx.services.dashboards.create(&analyst, request.clone()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));

        let created = ctx.services.dashboards.create(&admin, request).await.unwrap();
        assert_eq!(created.dashboard.created_by, admin.user_id);

        let blank = CreateDashboardRequest {
            name: String::new(),
            description: None,
            layout: None,
        };
        let err = ctx.services.dashboards.create(&admin, blank).await.unwrap_err();
        assert_eq!(err.to_string(), "Dashboard name is required");
        assert_eq!(ctx.audit().len(), 1);
    }
}
