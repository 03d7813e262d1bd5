use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::access::Principal;
use crate::audit::{AuditEvent, AuditFailurePolicy};
use crate::config::UploadConfig;
use crate::database::models::*;
use crate::database::{DatabaseError, Store};
use crate::services::Services;
use crate::types::{CapabilitySet, Lifecycle, UploadStatus, UserStatus};

#[derive(Default)]
struct State {
    next_id: i64,
    users: BTreeMap<i64, User>,
    user_roles: BTreeSet<(i64, i64)>,
    roles: BTreeMap<i64, Role>,
    permissions: BTreeMap<i64, Permission>,
    role_permissions: BTreeSet<(i64, i64)>,
    dashboards: BTreeMap<i64, Dashboard>,
    grants: BTreeMap<(i64, i64), DashboardGrant>,
    tabs: BTreeMap<i64, DashboardTab>,
    visualizations: BTreeMap<i64, Visualization>,
    data_models: BTreeMap<i64, DataModel>,
    relationships: BTreeMap<i64, DataRelationship>,
    uploads: BTreeMap<i64, Upload>,
    audit: Vec<AuditLog>,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-memory [`Store`] with the same uniqueness and cascade rules as the schema
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    fail_audit: AtomicBool,
    offline: AtomicBool,
}

fn newest_first<T, F>(items: &mut [T], key: F)
where
    F: Fn(&T) -> (chrono::DateTime<Utc>, i64),
{
    items.sort_by(|a, b| key(b).cmp(&key(a)));
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_online(&self) -> Result<(), DatabaseError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(DatabaseError::Unavailable("memory store offline".into()));
        }
        Ok(())
    }

    /// Make every subsequent audit insert fail
    pub fn fail_audit_writes(&self, fail: bool) {
        self.fail_audit.store(fail, Ordering::SeqCst);
    }

    /// Make every call fail as if the database were unreachable
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Snapshot of the audit trail in insertion order
    pub fn audit_entries(&self) -> Vec<AuditLog> {
        self.state().audit.clone()
    }

    fn grant_with_role(state: &State, grant: &DashboardGrant) -> DashboardGrant {
        let mut grant = grant.clone();
        if let Some(role) = state.roles.get(&grant.role_id) {
            grant.role_name = role.name.clone();
        }
        grant
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> Result<(), DatabaseError> {
        self.check_online()
    }

    async fn find_user(&self, id: i64) -> Result<Option<User>, DatabaseError> {
        self.check_online()?;
        Ok(self.state().users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, DatabaseError> {
        self.check_online()?;
        Ok(self.state().users.values().find(|u| u.email == email).cloned())
    }

    async fn list_users(&self, filter: &UserFilter) -> Result<Vec<User>, DatabaseError> {
        self.check_online()?;
        let mut users: Vec<User> = self
            .state()
            .users
            .values()
            .filter(|u| filter.status.map_or(true, |status| u.status == status))
            .cloned()
            .collect();
        newest_first(&mut users, |u| (u.created_at, u.id));
        Ok(users
            .into_iter()
            .skip(filter.offset.max(0) as usize)
            .take(filter.limit.max(0) as usize)
            .collect())
    }

    async fn insert_user(&self, user: &NewUser) -> Result<User, DatabaseError> {
        self.check_online()?;
        let mut state = self.state();
        if state.users.values().any(|u| u.email == user.email) {
            return Err(DatabaseError::Conflict("users_email_key".into()));
        }
        if let Some(missing) = user.role_ids.iter().find(|id| !state.roles.contains_key(id)) {
            return Err(DatabaseError::QueryError(format!("role {missing} does not exist")));
        }
        let now = Utc::now();
        let id = state.next_id();
        let row = User {
            id,
            email: user.email.clone(),
            password_hash: user.password_hash.clone(),
            full_name: user.full_name.clone(),
            status: user.status,
            last_login_at: None,
            created_at: now,
            updated_at: now,
        };
        state.users.insert(id, row.clone());
        for role_id in &user.role_ids {
            state.user_roles.insert((id, *role_id));
        }
        Ok(row)
    }

    async fn update_user(&self, id: i64, changes: &UserChanges) -> Result<Option<User>, DatabaseError> {
        self.check_online()?;
        let mut state = self.state();
        if let Some(email) = &changes.email {
            if state.users.values().any(|u| u.id != id && &u.email == email) {
                return Err(DatabaseError::Conflict("users_email_key".into()));
            }
        }
        let Some(user) = state.users.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(full_name) = &changes.full_name {
            user.full_name = full_name.clone();
        }
        if let Some(email) = &changes.email {
            user.email = email.clone();
        }
        if let Some(hash) = &changes.password_hash {
            user.password_hash = hash.clone();
        }
        if let Some(status) = changes.status {
            user.status = status;
        }
        user.updated_at = Utc::now();
        Ok(Some(user.clone()))
    }

    async fn delete_user(&self, id: i64) -> Result<bool, DatabaseError> {
        self.check_online()?;
        let mut state = self.state();
        let removed = state.users.remove(&id).is_some();
        state.user_roles.retain(|(user_id, _)| *user_id != id);
        Ok(removed)
    }

    async fn touch_last_login(&self, id: i64) -> Result<(), DatabaseError> {
        self.check_online()?;
        if let Some(user) = self.state().users.get_mut(&id) {
            user.last_login_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn user_role_names(&self, user_id: i64) -> Result<Vec<String>, DatabaseError> {
        self.check_online()?;
        let state = self.state();
        let mut names: Vec<String> = state
            .user_roles
            .iter()
            .filter(|(uid, _)| *uid == user_id)
            .filter_map(|(_, role_id)| state.roles.get(role_id).map(|r| r.name.clone()))
            .collect();
        names.sort();
        Ok(names)
    }

    async fn all_user_role_names(&self) -> Result<Vec<(i64, String)>, DatabaseError> {
        self.check_online()?;
        let state = self.state();
        Ok(state
            .user_roles
            .iter()
            .filter_map(|(uid, role_id)| state.roles.get(role_id).map(|r| (*uid, r.name.clone())))
            .collect())
    }

    async fn add_user_role(&self, user_id: i64, role_id: i64, _assigned_by: Option<i64>) -> Result<(), DatabaseError> {
        self.check_online()?;
        self.state().user_roles.insert((user_id, role_id));
        Ok(())
    }

    async fn replace_user_roles(
        &self,
        user_id: i64,
        role_ids: &[i64],
        _assigned_by: Option<i64>,
    ) -> Result<(), DatabaseError> {
        self.check_online()?;
        let mut state = self.state();
        state.user_roles.retain(|(uid, _)| *uid != user_id);
        for role_id in role_ids {
            state.user_roles.insert((user_id, *role_id));
        }
        Ok(())
    }

    async fn list_roles(&self) -> Result<Vec<Role>, DatabaseError> {
        self.check_online()?;
        let mut roles: Vec<Role> = self.state().roles.values().cloned().collect();
        roles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(roles)
    }

    async fn find_role(&self, id: i64) -> Result<Option<Role>, DatabaseError> {
        self.check_online()?;
        Ok(self.state().roles.get(&id).cloned())
    }

    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>, DatabaseError> {
        self.check_online()?;
        Ok(self.state().roles.values().find(|r| r.name == name).cloned())
    }

    async fn insert_role(&self, role: &NewRole) -> Result<Role, DatabaseError> {
        self.check_online()?;
        let mut state = self.state();
        if state.roles.values().any(|r| r.name == role.name) {
            return Err(DatabaseError::Conflict("roles_name_key".into()));
        }
        let id = state.next_id();
        let row = Role {
            id,
            name: role.name.clone(),
            description: role.description.clone(),
            is_system_role: role.is_system_role,
            created_at: Utc::now(),
        };
        state.roles.insert(id, row.clone());
        Ok(row)
    }

    async fn delete_role(&self, id: i64) -> Result<bool, DatabaseError> {
        self.check_online()?;
        let mut state = self.state();
        let removed = state.roles.remove(&id).is_some();
        state.user_roles.retain(|(_, role_id)| *role_id != id);
        state.role_permissions.retain(|(role_id, _)| *role_id != id);
        state.grants.retain(|(_, role_id), _| *role_id != id);
        Ok(removed)
    }

    async fn list_permissions(&self) -> Result<Vec<Permission>, DatabaseError> {
        self.check_online()?;
        let mut permissions: Vec<Permission> = self.state().permissions.values().cloned().collect();
        permissions.sort_by(|a, b| (&a.resource, &a.action).cmp(&(&b.resource, &b.action)));
        Ok(permissions)
    }

    async fn all_role_permissions(&self) -> Result<Vec<(i64, Permission)>, DatabaseError> {
        self.check_online()?;
        let state = self.state();
        Ok(state
            .role_permissions
            .iter()
            .filter_map(|(role_id, perm_id)| state.permissions.get(perm_id).map(|p| (*role_id, p.clone())))
            .collect())
    }

    async fn replace_role_permissions(&self, role_id: i64, permission_ids: &[i64]) -> Result<(), DatabaseError> {
        self.check_online()?;
        let mut state = self.state();
        state.role_permissions.retain(|(rid, _)| *rid != role_id);
        for permission_id in permission_ids {
            state.role_permissions.insert((role_id, *permission_id));
        }
        Ok(())
    }

    async fn ensure_permission(
        &self,
        resource: &str,
        action: &str,
        description: Option<&str>,
    ) -> Result<Permission, DatabaseError> {
        self.check_online()?;
        let mut state = self.state();
        if let Some(existing) = state
            .permissions
            .values_mut()
            .find(|p| p.resource == resource && p.action == action)
        {
            if let Some(description) = description {
                existing.description = Some(description.to_string());
            }
            return Ok(existing.clone());
        }
        let id = state.next_id();
        let row = Permission {
            id,
            resource: resource.to_string(),
            action: action.to_string(),
            description: description.map(str::to_string),
        };
        state.permissions.insert(id, row.clone());
        Ok(row)
    }

    async fn list_dashboards(&self, active_only: bool) -> Result<Vec<Dashboard>, DatabaseError> {
        self.check_online()?;
        let mut dashboards: Vec<Dashboard> = self
            .state()
            .dashboards
            .values()
            .filter(|d| !active_only || d.lifecycle.is_active())
            .cloned()
            .collect();
        newest_first(&mut dashboards, |d| (d.created_at, d.id));
        Ok(dashboards)
    }

    async fn find_dashboard(&self, id: i64) -> Result<Option<Dashboard>, DatabaseError> {
        self.check_online()?;
        Ok(self.state().dashboards.get(&id).cloned())
    }

    async fn insert_dashboard(&self, dashboard: &NewDashboard) -> Result<Dashboard, DatabaseError> {
        self.check_online()?;
        let mut state = self.state();
        let now = Utc::now();
        let id = state.next_id();
        let row = Dashboard {
            id,
            name: dashboard.name.clone(),
            description: dashboard.description.clone(),
            layout: dashboard.layout.clone(),
            lifecycle: Lifecycle::Active,
            created_by: dashboard.created_by,
            created_at: now,
            updated_at: now,
        };
        state.dashboards.insert(id, row.clone());
        Ok(row)
    }

    async fn update_dashboard(&self, id: i64, changes: &DashboardChanges) -> Result<Option<Dashboard>, DatabaseError> {
        self.check_online()?;
        let mut state = self.state();
        let Some(dashboard) = state.dashboards.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(name) = &changes.name {
            dashboard.name = name.clone();
        }
        if let Some(description) = &changes.description {
            dashboard.description = Some(description.clone());
        }
        if let Some(layout) = &changes.layout {
            dashboard.layout = layout.clone();
        }
        dashboard.updated_at = Utc::now();
        Ok(Some(dashboard.clone()))
    }

    async fn set_dashboard_lifecycle(&self, id: i64, lifecycle: Lifecycle) -> Result<bool, DatabaseError> {
        self.check_online()?;
        let mut state = self.state();
        match state.dashboards.get_mut(&id) {
            Some(dashboard) => {
                dashboard.lifecycle = lifecycle;
                dashboard.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn grants_for_roles(&self, role_names: &[String]) -> Result<Vec<DashboardGrant>, DatabaseError> {
        self.check_online()?;
        let state = self.state();
        Ok(state
            .grants
            .values()
            .map(|grant| Self::grant_with_role(&state, grant))
            .filter(|grant| role_names.contains(&grant.role_name))
            .collect())
    }

    async fn dashboard_grants(&self, dashboard_id: i64) -> Result<Vec<DashboardGrant>, DatabaseError> {
        self.check_online()?;
        let state = self.state();
        Ok(state
            .grants
            .values()
            .filter(|grant| grant.dashboard_id == dashboard_id)
            .map(|grant| Self::grant_with_role(&state, grant))
            .collect())
    }

    async fn upsert_grant(
        &self,
        dashboard_id: i64,
        role_id: i64,
        capabilities: CapabilitySet,
    ) -> Result<DashboardGrant, DatabaseError> {
        self.check_online()?;
        let mut state = self.state();
        let role_name = state
            .roles
            .get(&role_id)
            .map(|r| r.name.clone())
            .ok_or_else(|| DatabaseError::QueryError(format!("role {role_id} does not exist")))?;
        let now = Utc::now();
        let next_id = state.next_id();
        let grant = state
            .grants
            .entry((dashboard_id, role_id))
            .or_insert_with(|| DashboardGrant {
                id: next_id,
                dashboard_id,
                role_id,
                role_name: role_name.clone(),
                capabilities,
                created_at: now,
                updated_at: now,
            });
        grant.capabilities = capabilities;
        grant.updated_at = now;
        Ok(grant.clone())
    }

    async fn delete_grant(&self, dashboard_id: i64, role_id: i64) -> Result<bool, DatabaseError> {
        self.check_online()?;
        Ok(self.state().grants.remove(&(dashboard_id, role_id)).is_some())
    }

    async fn dashboard_tabs(&self, dashboard_id: i64) -> Result<Vec<DashboardTab>, DatabaseError> {
        self.check_online()?;
        let mut tabs: Vec<DashboardTab> = self
            .state()
            .tabs
            .values()
            .filter(|t| t.dashboard_id == dashboard_id)
            .cloned()
            .collect();
        tabs.sort_by_key(|t| (t.position, t.id));
        Ok(tabs)
    }

    async fn find_tab(&self, tab_id: i64) -> Result<Option<DashboardTab>, DatabaseError> {
        self.check_online()?;
        Ok(self.state().tabs.get(&tab_id).cloned())
    }

    async fn insert_tab(&self, tab: &NewTab) -> Result<DashboardTab, DatabaseError> {
        self.check_online()?;
        let mut state = self.state();
        let now = Utc::now();
        let id = state.next_id();
        let row = DashboardTab {
            id,
            dashboard_id: tab.dashboard_id,
            name: tab.name.clone(),
            position: tab.position,
            config: tab.config.clone(),
            created_at: now,
            updated_at: now,
        };
        state.tabs.insert(id, row.clone());
        Ok(row)
    }

    async fn tab_visualizations(&self, tab_ids: &[i64]) -> Result<Vec<Visualization>, DatabaseError> {
        self.check_online()?;
        Ok(self
            .state()
            .visualizations
            .values()
            .filter(|v| tab_ids.contains(&v.tab_id))
            .cloned()
            .collect())
    }

    async fn insert_visualization(&self, viz: &NewVisualization) -> Result<Visualization, DatabaseError> {
        self.check_online()?;
        let mut state = self.state();
        let now = Utc::now();
        let id = state.next_id();
        let row = Visualization {
            id,
            tab_id: viz.tab_id,
            kind: viz.kind.clone(),
            title: viz.title.clone(),
            config: viz.config.clone(),
            query: viz.query.clone(),
            position: viz.position,
            refresh_rate: viz.refresh_rate,
            created_at: now,
            updated_at: now,
        };
        state.visualizations.insert(id, row.clone());
        Ok(row)
    }

    async fn list_data_models(&self) -> Result<Vec<DataModel>, DatabaseError> {
        self.check_online()?;
        let mut models: Vec<DataModel> = self.state().data_models.values().cloned().collect();
        newest_first(&mut models, |m| (m.created_at, m.id));
        Ok(models)
    }

    async fn find_data_model(&self, id: i64) -> Result<Option<DataModel>, DatabaseError> {
        self.check_online()?;
        Ok(self.state().data_models.get(&id).cloned())
    }

    async fn insert_data_model(&self, model: &NewDataModel) -> Result<DataModel, DatabaseError> {
        self.check_online()?;
        let mut state = self.state();
        if state.data_models.values().any(|m| m.name == model.name) {
            return Err(DatabaseError::Conflict("data_models_name_key".into()));
        }
        let now = Utc::now();
        let id = state.next_id();
        let row = DataModel {
            id,
            name: model.name.clone(),
            display_name: model.display_name.clone(),
            description: model.description.clone(),
            fields: model.fields.clone(),
            version: 1,
            lifecycle: Lifecycle::Active,
            table_name: model.table_name.clone(),
            created_by: model.created_by,
            created_at: now,
            updated_at: now,
        };
        state.data_models.insert(id, row.clone());
        Ok(row)
    }

    async fn update_data_model(&self, id: i64, changes: &DataModelChanges) -> Result<Option<DataModel>, DatabaseError> {
        self.check_online()?;
        let mut state = self.state();
        let Some(model) = state.data_models.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(display_name) = &changes.display_name {
            model.display_name = display_name.clone();
        }
        if let Some(description) = &changes.description {
            model.description = Some(description.clone());
        }
        if let Some(fields) = &changes.fields {
            model.fields = fields.clone();
            model.version += 1;
        }
        if let Some(lifecycle) = changes.lifecycle {
            model.lifecycle = lifecycle;
        }
        model.updated_at = Utc::now();
        Ok(Some(model.clone()))
    }

    async fn model_relationships(&self, model_id: i64) -> Result<Vec<DataRelationship>, DatabaseError> {
        self.check_online()?;
        Ok(self
            .state()
            .relationships
            .values()
            .filter(|r| r.source_model_id == model_id || r.target_model_id == model_id)
            .cloned()
            .collect())
    }

    async fn insert_relationship(&self, relationship: &NewRelationship) -> Result<DataRelationship, DatabaseError> {
        self.check_online()?;
        let mut state = self.state();
        let id = state.next_id();
        let row = DataRelationship {
            id,
            name: relationship.name.clone(),
            source_model_id: relationship.source_model_id,
            target_model_id: relationship.target_model_id,
            kind: relationship.kind,
            source_field: relationship.source_field.clone(),
            target_field: relationship.target_field.clone(),
            lifecycle: Lifecycle::Active,
            created_at: Utc::now(),
        };
        state.relationships.insert(id, row.clone());
        Ok(row)
    }

    async fn list_uploads(&self, filter: &UploadFilter) -> Result<Vec<Upload>, DatabaseError> {
        self.check_online()?;
        let mut uploads: Vec<Upload> = self
            .state()
            .uploads
            .values()
            .filter(|u| filter.model_id.map_or(true, |id| u.model_id == Some(id)))
            .filter(|u| filter.status.map_or(true, |status| u.status == status))
            .cloned()
            .collect();
        newest_first(&mut uploads, |u| (u.created_at, u.id));
        uploads.truncate(filter.limit.max(0) as usize);
        Ok(uploads)
    }

    async fn find_upload(&self, id: i64) -> Result<Option<Upload>, DatabaseError> {
        self.check_online()?;
        Ok(self.state().uploads.get(&id).cloned())
    }

    async fn insert_upload(&self, upload: &NewUpload) -> Result<Upload, DatabaseError> {
        self.check_online()?;
        let mut state = self.state();
        let now = Utc::now();
        let id = state.next_id();
        let row = Upload {
            id,
            user_id: upload.user_id,
            model_id: upload.model_id,
            file_name: upload.file_name.clone(),
            file_size: upload.file_size,
            status: UploadStatus::Pending,
            records_count: 0,
            records_success: 0,
            records_failed: 0,
            error_log: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        };
        state.uploads.insert(id, row.clone());
        Ok(row)
    }

    async fn update_upload(&self, id: i64, changes: &UploadChanges) -> Result<Option<Upload>, DatabaseError> {
        self.check_online()?;
        let mut state = self.state();
        let Some(upload) = state.uploads.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(status) = changes.status {
            upload.status = status;
        }
        if let Some(count) = changes.records_count {
            upload.records_count = count;
        }
        if let Some(count) = changes.records_success {
            upload.records_success = count;
        }
        if let Some(count) = changes.records_failed {
            upload.records_failed = count;
        }
        if let Some(log) = &changes.error_log {
            upload.error_log = Some(log.clone());
        }
        if let Some(at) = changes.completed_at {
            upload.completed_at = Some(at);
        }
        upload.updated_at = Utc::now();
        Ok(Some(upload.clone()))
    }

    async fn append_audit(&self, event: &AuditEvent) -> Result<AuditLog, DatabaseError> {
        self.check_online()?;
        if self.fail_audit.load(Ordering::SeqCst) {
            return Err(DatabaseError::QueryError("audit_logs insert rejected".into()));
        }
        let mut state = self.state();
        let id = state.next_id();
        let row = AuditLog {
            id,
            user_id: event.actor,
            action: event.action,
            resource_type: event.resource_type,
            resource_id: event.resource_id,
            details: event.detail.clone(),
            outcome: event.outcome,
            ip_address: event.ip_address.clone(),
            user_agent: event.user_agent.clone(),
            created_at: Utc::now(),
        };
        state.audit.push(row.clone());
        Ok(row)
    }

    async fn list_audit(&self, query: &AuditQuery) -> Result<Vec<AuditLog>, DatabaseError> {
        self.check_online()?;
        let mut logs: Vec<AuditLog> = self
            .state()
            .audit
            .iter()
            .filter(|log| query.matches(log))
            .cloned()
            .collect();
        newest_first(&mut logs, |log| (log.created_at, log.id));
        Ok(logs
            .into_iter()
            .skip(query.offset.max(0) as usize)
            .take(query.limit.max(0) as usize)
            .collect())
    }
}

/// Services wired to a fresh in-memory store, plus helpers for arranging fixtures
pub struct TestContext {
    pub store: Arc<MemoryStore>,
    pub services: Services,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_policy(AuditFailurePolicy::LogAndContinue)
    }

    pub fn with_policy(policy: AuditFailurePolicy) -> Self {
        let store = Arc::new(MemoryStore::new());
        let services = Services::new(store.clone(), policy, UploadConfig::default());
        Self { store, services }
    }

    /// Create a role, flagged as a system role when it is one of the seeded names
    pub async fn role(&self, name: &str) -> Role {
        if let Ok(Some(existing)) = self.store.find_role_by_name(name).await {
            return existing;
        }
        self.store
            .insert_role(&NewRole {
                name: name.to_string(),
                description: None,
                is_system_role: matches!(name, "super_admin" | "admin" | "user"),
            })
            .await
            .expect("insert role")
    }

    /// Insert a user directly, bypassing registration, and assign the named roles
    pub async fn user(&self, email: &str, status: UserStatus, roles: &[&str]) -> (User, Principal) {
        let mut role_ids = Vec::new();
        for name in roles {
            role_ids.push(self.role(name).await.id);
        }

        let user = self
            .store
            .insert_user(&NewUser {
                email: email.to_string(),
                password_hash: crate::auth::hash_password("correct horse battery").expect("hash"),
                full_name: email.split('@').next().unwrap_or(email).to_string(),
                status,
                role_ids,
            })
            .await
            .expect("insert user");

        let principal = Principal::new(user.id, roles.iter().copied());
        (user, principal)
    }

    pub async fn admin(&self) -> Principal {
        self.user("root@example.com", UserStatus::Active, &["admin"]).await.1
    }

    pub async fn dashboard(&self, name: &str, created_by: i64) -> Dashboard {
        self.store
            .insert_dashboard(&NewDashboard {
                name: name.to_string(),
                description: None,
                layout: serde_json::json!({}),
                created_by,
            })
            .await
            .expect("insert dashboard")
    }

    pub async fn grant(&self, dashboard_id: i64, role: &str, capabilities: CapabilitySet) -> DashboardGrant {
        let role = self.role(role).await;
        self.store
            .upsert_grant(dashboard_id, role.id, capabilities)
            .await
            .expect("upsert grant")
    }

    /// Audit entries appended since the context was created
    pub fn audit(&self) -> Vec<AuditLog> {
        self.store.audit_entries()
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_enforces_unique_email() {
        let ctx = TestContext::new();
        ctx.user("dup@example.com", UserStatus::Pending, &[]).await;

        let err = ctx
            .store
            .insert_user(&NewUser {
                email: "dup@example.com".into(),
                password_hash: "x".into(),
                full_name: "Dup".into(),
                status: UserStatus::Pending,
                role_ids: vec![],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::Conflict(_)));
    }

    #[tokio::test]
    async fn user_insert_with_a_missing_role_leaves_nothing_behind() {
        let ctx = TestContext::new();
        let role = ctx.role("user").await;

        let err = ctx
            .store
            .insert_user(&NewUser {
                email: "ana@example.com".into(),
                password_hash: "x".into(),
                full_name: "Ana".into(),
                status: UserStatus::Pending,
                role_ids: vec![role.id, 9_999],
            })
            .await
            .unwrap_err();

        assert!(matches!(err, DatabaseError::QueryError(_)));
        assert!(ctx.store.find_user_by_email("ana@example.com").await.unwrap().is_none());
        assert!(ctx.store.all_user_role_names().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn deleting_a_role_drops_its_grants() {
        let ctx = TestContext::new();
        let dashboard = ctx.dashboard("Ops", 1).await;
        let grant = ctx.grant(dashboard.id, "analyst", CapabilitySet::ALL).await;

        assert!(ctx.store.delete_role(grant.role_id).await.unwrap());
        assert!(ctx.store.dashboard_grants(dashboard.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn offline_store_reports_unavailable() {
        let ctx = TestContext::new();
        ctx.store.set_offline(true);
        assert!(matches!(ctx.store.ping().await, Err(DatabaseError::Unavailable(_))));
    }
}
