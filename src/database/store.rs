use async_trait::async_trait;

use super::manager::DatabaseError;
use super::models::*;
use crate::audit::AuditEvent;
use crate::types::{CapabilitySet, Lifecycle};

/// Persistence seam used by every service.
///
/// `PgStore` is the production implementation; `testing::MemoryStore` backs the
/// unit tests. Lookups return `Ok(None)` / `Ok(false)` for missing rows and leave
/// the NotFound decision to the caller. Unique violations surface as
/// [`DatabaseError::Conflict`].
#[async_trait]
pub trait Store: Send + Sync {
    async fn ping(&self) -> Result<(), DatabaseError>;

    // Users
    async fn find_user(&self, id: i64) -> Result<Option<User>, DatabaseError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, DatabaseError>;
    /// Newest first
    async fn list_users(&self, filter: &UserFilter) -> Result<Vec<User>, DatabaseError>;
    /// Inserts the user and their `role_ids` atomically
    async fn insert_user(&self, user: &NewUser) -> Result<User, DatabaseError>;
    async fn update_user(&self, id: i64, changes: &UserChanges) -> Result<Option<User>, DatabaseError>;
    async fn delete_user(&self, id: i64) -> Result<bool, DatabaseError>;
    async fn touch_last_login(&self, id: i64) -> Result<(), DatabaseError>;

    // Role membership
    async fn user_role_names(&self, user_id: i64) -> Result<Vec<String>, DatabaseError>;
    /// `(user_id, role_name)` for every assignment
    async fn all_user_role_names(&self) -> Result<Vec<(i64, String)>, DatabaseError>;
    async fn add_user_role(&self, user_id: i64, role_id: i64, assigned_by: Option<i64>) -> Result<(), DatabaseError>;
    async fn replace_user_roles(
        &self,
        user_id: i64,
        role_ids: &[i64],
        assigned_by: Option<i64>,
    ) -> Result<(), DatabaseError>;

    // Roles and permissions
    async fn list_roles(&self) -> Result<Vec<Role>, DatabaseError>;
    async fn find_role(&self, id: i64) -> Result<Option<Role>, DatabaseError>;
    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>, DatabaseError>;
    async fn insert_role(&self, role: &NewRole) -> Result<Role, DatabaseError>;
    async fn delete_role(&self, id: i64) -> Result<bool, DatabaseError>;
    async fn list_permissions(&self) -> Result<Vec<Permission>, DatabaseError>;
    /// `(role_id, permission)` for every role/permission link
    async fn all_role_permissions(&self) -> Result<Vec<(i64, Permission)>, DatabaseError>;
    async fn replace_role_permissions(&self, role_id: i64, permission_ids: &[i64]) -> Result<(), DatabaseError>;
    /// Insert the `(resource, action)` pair if missing and return the stored row
    async fn ensure_permission(
        &self,
        resource: &str,
        action: &str,
        description: Option<&str>,
    ) -> Result<Permission, DatabaseError>;

    // Dashboards
    /// Newest first; `active_only` drops soft-deleted dashboards
    async fn list_dashboards(&self, active_only: bool) -> Result<Vec<Dashboard>, DatabaseError>;
    async fn find_dashboard(&self, id: i64) -> Result<Option<Dashboard>, DatabaseError>;
    async fn insert_dashboard(&self, dashboard: &NewDashboard) -> Result<Dashboard, DatabaseError>;
    async fn update_dashboard(&self, id: i64, changes: &DashboardChanges) -> Result<Option<Dashboard>, DatabaseError>;
    async fn set_dashboard_lifecycle(&self, id: i64, lifecycle: Lifecycle) -> Result<bool, DatabaseError>;

    // Dashboard grants
    /// Every grant held by any of the named roles
    async fn grants_for_roles(&self, role_names: &[String]) -> Result<Vec<DashboardGrant>, DatabaseError>;
    async fn dashboard_grants(&self, dashboard_id: i64) -> Result<Vec<DashboardGrant>, DatabaseError>;
    async fn upsert_grant(
        &self,
        dashboard_id: i64,
        role_id: i64,
        capabilities: CapabilitySet,
    ) -> Result<DashboardGrant, DatabaseError>;
    async fn delete_grant(&self, dashboard_id: i64, role_id: i64) -> Result<bool, DatabaseError>;

    // Tabs and visualizations
    async fn dashboard_tabs(&self, dashboard_id: i64) -> Result<Vec<DashboardTab>, DatabaseError>;
    async fn find_tab(&self, tab_id: i64) -> Result<Option<DashboardTab>, DatabaseError>;
    async fn insert_tab(&self, tab: &NewTab) -> Result<DashboardTab, DatabaseError>;
    async fn tab_visualizations(&self, tab_ids: &[i64]) -> Result<Vec<Visualization>, DatabaseError>;
    async fn insert_visualization(&self, viz: &NewVisualization) -> Result<Visualization, DatabaseError>;

    // Data models
    async fn list_data_models(&self) -> Result<Vec<DataModel>, DatabaseError>;
    async fn find_data_model(&self, id: i64) -> Result<Option<DataModel>, DatabaseError>;
    async fn insert_data_model(&self, model: &NewDataModel) -> Result<DataModel, DatabaseError>;
    async fn update_data_model(&self, id: i64, changes: &DataModelChanges) -> Result<Option<DataModel>, DatabaseError>;
    /// Relationships where the model is source or target
    async fn model_relationships(&self, model_id: i64) -> Result<Vec<DataRelationship>, DatabaseError>;
    async fn insert_relationship(&self, relationship: &NewRelationship) -> Result<DataRelationship, DatabaseError>;

    // Uploads
    async fn list_uploads(&self, filter: &UploadFilter) -> Result<Vec<Upload>, DatabaseError>;
    async fn find_upload(&self, id: i64) -> Result<Option<Upload>, DatabaseError>;
    async fn insert_upload(&self, upload: &NewUpload) -> Result<Upload, DatabaseError>;
    async fn update_upload(&self, id: i64, changes: &UploadChanges) -> Result<Option<Upload>, DatabaseError>;

    // Audit trail
    async fn append_audit(&self, event: &AuditEvent) -> Result<AuditLog, DatabaseError>;
    async fn list_audit(&self, query: &AuditQuery) -> Result<Vec<AuditLog>, DatabaseError>;
}
