use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use validator::Validate;

use super::{require_admin, ServiceError, ServiceResult};
use crate::access::Principal;
use crate::audit::{AuditEvent, AuditRecorder};
use crate::auth;
use crate::database::models::{NewRole, NewUser, Permission, Role, RoleWithPermissions, UserChanges};
use crate::database::{DatabaseError, Store};
use crate::types::{AuditAction, ResourceType, UserStatus};
use crate::validation::{normalize_email, ValidatedRequest};

pub const MSG_ROLE_NOT_FOUND: &str = "Role not found";
pub const MSG_ROLE_TAKEN: &str = "Role name already exists";
pub const MSG_SYSTEM_ROLE: &str = "System roles cannot be deleted";

/// `(resource, action, description)` seeded by `biadmin seed`
pub const PERMISSION_CATALOGUE: &[(&str, &str, &str)] = &[
    ("user", "view", "View users"),
    ("user", "create", "Create users"),
    ("user", "update", "Update users"),
    ("user", "delete", "Delete users"),
    ("user", "approve", "Approve users"),
    ("dashboard", "view", "View dashboards"),
    ("dashboard", "create", "Create dashboards"),
    ("dashboard", "update", "Update dashboards"),
    ("dashboard", "delete", "Delete dashboards"),
    ("data_model", "view", "View data models"),
    ("data_model", "create", "Create data models"),
    ("data_model", "update", "Update data models"),
    ("data_model", "delete", "Delete data models"),
    ("upload", "view", "View uploads"),
    ("upload", "create", "Create uploads"),
    ("upload", "rollback", "Rollback uploads"),
    ("role", "view", "View roles"),
    ("role", "create", "Create roles"),
    ("role", "update", "Update roles"),
    ("role", "delete", "Delete roles"),
    ("organization", "view", "View organization"),
    ("organization", "create", "Create org units"),
    ("organization", "update", "Update org units"),
    ("organization", "delete", "Delete org units"),
    ("report", "view", "View reports"),
    ("report", "create", "Create reports"),
    ("report", "export", "Export reports"),
];

/// Permissions withheld from `admin` but held by `super_admin`
const SUPER_ADMIN_ONLY: &[&str] = &["role:delete", "user:delete"];

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateRoleRequest {
    #[validate(length(min = 1, max = 100, message = "Role name is required"))]
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub permission_ids: Vec<i64>,
}

impl ValidatedRequest for CreateRoleRequest {
    const FIELD_ORDER: &'static [&'static str] = &["name"];
}

/// Bootstrap account created by `biadmin seed` when missing
#[derive(Debug, Clone)]
pub struct SeedAdmin {
    pub email: String,
    pub password: String,
    pub full_name: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SeedReport {
    pub permissions: usize,
    pub roles_created: Vec<String>,
    /// Existing roles whose permission set was brought back in line
    pub roles_updated: Vec<String>,
    pub admin_created: bool,
}

#[derive(Clone)]
pub struct RoleService {
    store: Arc<dyn Store>,
    audit: AuditRecorder,
}

impl RoleService {
    pub fn new(store: Arc<dyn Store>, audit: AuditRecorder) -> Self {
        Self { store, audit }
    }

    pub async fn list(&self, _principal: &Principal) -> ServiceResult<Vec<RoleWithPermissions>> {
        let (roles, links) = futures::try_join!(self.store.list_roles(), self.store.all_role_permissions())?;

        let mut by_role: BTreeMap<i64, Vec<Permission>> = BTreeMap::new();
        for (role_id, permission) in links {
            by_role.entry(role_id).or_default().push(permission);
        }

        Ok(roles
            .into_iter()
            .map(|role| {
                let permissions = by_role.remove(&role.id).unwrap_or_default();
                RoleWithPermissions { role, permissions }
            })
            .collect())
    }

    pub async fn permissions(&self, _principal: &Principal) -> ServiceResult<Vec<Permission>> {
        Ok(self.store.list_permissions().await?)
    }

    pub async fn create(&self, principal: &Principal, request: CreateRoleRequest) -> ServiceResult<RoleWithPermissions> {
        require_admin(principal)?;
        request.check()?;

        if self.store.find_role_by_name(&request.name).await?.is_some() {
            return Err(ServiceError::Conflict(MSG_ROLE_TAKEN.into()));
        }

        let catalogue = self.store.list_permissions().await?;
        let wanted: BTreeSet<i64> = request.permission_ids.iter().copied().collect();
        let permissions: Vec<Permission> = catalogue.into_iter().filter(|p| wanted.contains(&p.id)).collect();
        if permissions.len() != wanted.len() {
            return Err(ServiceError::validation("permission_ids", "Unknown permission id"));
        }

        let role = self
            .store
            .insert_role(&NewRole {
                name: request.name,
                description: request.description,
                is_system_role: false,
            })
            .await
            .map_err(|e| match e {
                DatabaseError::Conflict(_) => ServiceError::Conflict(MSG_ROLE_TAKEN.into()),
                other => other.into(),
            })?;

        let ids: Vec<i64> = wanted.into_iter().collect();
        self.store.replace_role_permissions(role.id, &ids).await?;

        self.audit
            .record(
                AuditEvent::new(AuditAction::Create, ResourceType::Role)
                    .actor(principal.user_id)
                    .resource(role.id)
                    .detail(json!({
                        "name": role.name,
                        "permissions": permissions.iter().map(Permission::key).collect::<Vec<_>>(),
                    })),
            )
            .await?;

        Ok(RoleWithPermissions { role, permissions })
    }

    pub async fn delete(&self, principal: &Principal, id: i64) -> ServiceResult<()> {
        require_admin(principal)?;

        let role = self
            .store
            .find_role(id)
            .await?
            .ok_or_else(|| ServiceError::not_found(MSG_ROLE_NOT_FOUND))?;

        if role.is_system_role {
            return Err(ServiceError::forbidden(MSG_SYSTEM_ROLE));
        }

        if !self.store.delete_role(id).await? {
            return Err(ServiceError::not_found(MSG_ROLE_NOT_FOUND));
        }

        self.audit
            .record(
                AuditEvent::new(AuditAction::Delete, ResourceType::Role)
                    .actor(principal.user_id)
                    .resource(id)
                    .detail(json!({ "name": role.name })),
            )
            .await?;

        Ok(())
    }

    /// Idempotently install the permission catalogue, the three system roles and
    /// an active `super_admin` account. Safe to run on every deploy.
    pub async fn seed(&self, admin: &SeedAdmin) -> ServiceResult<SeedReport> {
        let mut report = SeedReport::default();

        let mut catalogue = Vec::with_capacity(PERMISSION_CATALOGUE.len());
        for (resource, action, description) in PERMISSION_CATALOGUE {
            catalogue.push(self.store.ensure_permission(resource, action, Some(*description)).await?);
        }
        report.permissions = catalogue.len();

        let everything: Vec<i64> = catalogue.iter().map(|p| p.id).collect();
        let admin_set: Vec<i64> = catalogue
            .iter()
            .filter(|p| !SUPER_ADMIN_ONLY.contains(&p.key().as_str()))
            .map(|p| p.id)
            .collect();
        let view_set: Vec<i64> = catalogue.iter().filter(|p| p.action == "view").map(|p| p.id).collect();

        let seeded = [
            ("super_admin", "Super administrator with full system access", everything),
            ("admin", "Administrator with management capabilities", admin_set),
            ("user", "Standard user with view access", view_set),
        ];

        let mut current: BTreeMap<i64, BTreeSet<i64>> = BTreeMap::new();
        for (role_id, permission) in self.store.all_role_permissions().await? {
            current.entry(role_id).or_default().insert(permission.id);
        }

        let mut super_admin = None;
        for (name, description, permission_ids) in seeded {
            let (role, created) = match self.store.find_role_by_name(name).await? {
                Some(role) => (role, false),
                None => {
                    let role = self
                        .store
                        .insert_role(&NewRole {
                            name: name.to_string(),
                            description: Some(description.to_string()),
                            is_system_role: true,
                        })
                        .await?;
                    self.audit
                        .record(
                            AuditEvent::new(AuditAction::Create, ResourceType::Role)
                                .resource(role.id)
                                .detail(json!({ "name": role.name, "seeded": true })),
                        )
                        .await?;
                    report.roles_created.push(role.name.clone());
                    (role, true)
                }
            };

            let target: BTreeSet<i64> = permission_ids.iter().copied().collect();
            if current.remove(&role.id).unwrap_or_default() != target {
                self.store.replace_role_permissions(role.id, &permission_ids).await?;
                if !created {
                    self.audit
                        .record(
                            AuditEvent::new(AuditAction::Update, ResourceType::Role)
                                .resource(role.id)
                                .detail(json!({ "name": role.name, "permissions": target.len(), "seeded": true })),
                        )
                        .await?;
                    report.roles_updated.push(role.name.clone());
                }
            }
            if name == "super_admin" {
                super_admin = Some(role);
            }
        }

        if let Some(role) = super_admin {
            report.admin_created = self.seed_admin(admin, &role).await?;
        }

        tracing::info!(
            "seeded {} permissions, created roles {:?}, updated roles {:?}, admin created: {}",
            report.permissions,
            report.roles_created,
            report.roles_updated,
            report.admin_created
        );
        Ok(report)
    }

    async fn seed_admin(&self, admin: &SeedAdmin, role: &Role) -> ServiceResult<bool> {
        let email = normalize_email(&admin.email);

        if let Some(existing) = self.store.find_user_by_email(&email).await? {
            let mut updated = Vec::new();
            if existing.status != UserStatus::Active {
                let changes = UserChanges {
                    status: Some(UserStatus::Active),
                    ..Default::default()
                };
                self.store.update_user(existing.id, &changes).await?;
                updated.push("status");
            }
            let roles = self.store.user_role_names(existing.id).await?;
            if !roles.iter().any(|name| name == &role.name) {
                self.store.add_user_role(existing.id, role.id, None).await?;
                updated.push("roles");
            }

            if !updated.is_empty() {
                tracing::info!("restored super administrator {} ({:?})", existing.email, updated);
                self.audit
                    .record(
                        AuditEvent::new(AuditAction::Update, ResourceType::User)
                            .resource(existing.id)
                            .detail(json!({ "email": existing.email, "updated": updated, "seeded": true })),
                    )
                    .await?;
            }
            return Ok(false);
        }

        let user = self
            .store
            .insert_user(&NewUser {
                email,
                password_hash: auth::hash_password(&admin.password)?,
                full_name: admin.full_name.clone(),
                status: UserStatus::Active,
                role_ids: vec![role.id],
            })
            .await?;

        self.audit
            .record(
                AuditEvent::new(AuditAction::Create, ResourceType::User)
                    .resource(user.id)
                    .detail(json!({ "email": user.email, "role": role.name })),
            )
            .await?;

        Ok(true)
    }
}
