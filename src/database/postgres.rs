use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, Row};

use super::manager::{DatabaseError, DatabaseManager};
use super::models::*;
use super::store::Store;
use crate::audit::AuditEvent;
use crate::types::{CapabilitySet, Lifecycle};

const USER_COLUMNS: &str = "id, email, password_hash, full_name, status, last_login_at, created_at, updated_at";
const DASHBOARD_COLUMNS: &str = "id, name, description, layout, is_active, created_by, created_at, updated_at";
const TAB_COLUMNS: &str = "id, dashboard_id, name, position, config, created_at, updated_at";
const VISUALIZATION_COLUMNS: &str =
    "id, tab_id, kind, title, config, query, position, refresh_rate, created_at, updated_at";
const DATA_MODEL_COLUMNS: &str =
    "id, name, display_name, description, schema_json, version, is_active, table_name, created_by, created_at, updated_at";
const RELATIONSHIP_COLUMNS: &str =
    "id, name, source_model_id, target_model_id, kind, source_field, target_field, is_active, created_at";
const UPLOAD_COLUMNS: &str = "id, user_id, model_id, file_name, file_size, status, records_count, records_success, \
     records_failed, error_log, created_at, updated_at, completed_at";
const AUDIT_COLUMNS: &str =
    "id, user_id, action, resource_type, resource_id, details, outcome, ip_address, user_agent, created_at";

/// Grants joined with the owning role's name
const GRANT_SELECT: &str = "SELECT dp.id, dp.dashboard_id, dp.role_id, r.name AS role_name, dp.permissions, \
     dp.created_at, dp.updated_at \
     FROM dashboard_permissions dp JOIN roles r ON r.id = dp.role_id";

/// PostgreSQL-backed [`Store`] using runtime-checked queries
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn from_manager(manager: &DatabaseManager) -> Self {
        Self::new(manager.pool().clone())
    }
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> Result<(), DatabaseError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn find_user(&self, id: i64) -> Result<Option<User>, DatabaseError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        Ok(sqlx::query_as::<_, User>(&query).bind(id).fetch_optional(&self.pool).await?)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, DatabaseError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        Ok(sqlx::query_as::<_, User>(&query).bind(email).fetch_optional(&self.pool).await?)
    }

    async fn list_users(&self, filter: &UserFilter) -> Result<Vec<User>, DatabaseError> {
        let query = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE ($1::text IS NULL OR status = $1) \
             ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3"
        );
        Ok(sqlx::query_as::<_, User>(&query)
            .bind(filter.status.map(|status| status.as_str()))
            .bind(filter.limit)
            .bind(filter.offset)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn insert_user(&self, user: &NewUser) -> Result<User, DatabaseError> {
        let query = format!(
            "INSERT INTO users (email, password_hash, full_name, status) VALUES ($1, $2, $3, $4) \
             RETURNING {USER_COLUMNS}"
        );
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, User>(&query)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(&user.full_name)
            .bind(user.status.as_str())
            .fetch_one(&mut *tx)
            .await?;

        if !user.role_ids.is_empty() {
            sqlx::query(
                "INSERT INTO user_roles (user_id, role_id) \
                 SELECT $1, role_id FROM UNNEST($2::bigint[]) AS role_id \
                 ON CONFLICT (user_id, role_id) DO NOTHING",
            )
            .bind(row.id)
            .bind(user.role_ids.as_slice())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(row)
    }

    async fn update_user(&self, id: i64, changes: &UserChanges) -> Result<Option<User>, DatabaseError> {
        let query = format!(
            "UPDATE users SET \
                full_name = COALESCE($2, full_name), \
                email = COALESCE($3, email), \
                password_hash = COALESCE($4, password_hash), \
                status = COALESCE($5, status), \
                updated_at = NOW() \
             WHERE id = $1 RETURNING {USER_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, User>(&query)
            .bind(id)
            .bind(changes.full_name.as_deref())
            .bind(changes.email.as_deref())
            .bind(changes.password_hash.as_deref())
            .bind(changes.status.map(|status| status.as_str()))
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn delete_user(&self, id: i64) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn touch_last_login(&self, id: i64) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn user_role_names(&self, user_id: i64) -> Result<Vec<String>, DatabaseError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT r.name FROM user_roles ur JOIN roles r ON r.id = ur.role_id \
             WHERE ur.user_id = $1 ORDER BY r.name",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    async fn all_user_role_names(&self) -> Result<Vec<(i64, String)>, DatabaseError> {
        Ok(sqlx::query_as(
            "SELECT ur.user_id, r.name FROM user_roles ur JOIN roles r ON r.id = ur.role_id \
             ORDER BY ur.user_id, r.name",
        )
        .fetch_all(&self.pool)
        .await?)
    }

    async fn add_user_role(&self, user_id: i64, role_id: i64, assigned_by: Option<i64>) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO user_roles (user_id, role_id, assigned_by) VALUES ($1, $2, $3) \
             ON CONFLICT (user_id, role_id) DO NOTHING",
        )
        .bind(user_id)
        .bind(role_id)
        .bind(assigned_by)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn replace_user_roles(
        &self,
        user_id: i64,
        role_ids: &[i64],
        assigned_by: Option<i64>,
    ) -> Result<(), DatabaseError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM user_roles WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO user_roles (user_id, role_id, assigned_by) \
             SELECT $1, role_id, $3 FROM UNNEST($2::bigint[]) AS role_id \
             ON CONFLICT (user_id, role_id) DO NOTHING",
        )
        .bind(user_id)
        .bind(role_ids)
        .bind(assigned_by)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn list_roles(&self) -> Result<Vec<Role>, DatabaseError> {
        Ok(sqlx::query_as::<_, Role>(
            "SELECT id, name, description, is_system_role, created_at FROM roles ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?)
    }

    async fn find_role(&self, id: i64) -> Result<Option<Role>, DatabaseError> {
        Ok(sqlx::query_as::<_, Role>(
            "SELECT id, name, description, is_system_role, created_at FROM roles WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>, DatabaseError> {
        Ok(sqlx::query_as::<_, Role>(
            "SELECT id, name, description, is_system_role, created_at FROM roles WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn insert_role(&self, role: &NewRole) -> Result<Role, DatabaseError> {
        Ok(sqlx::query_as::<_, Role>(
            "INSERT INTO roles (name, description, is_system_role) VALUES ($1, $2, $3) \
             RETURNING id, name, description, is_system_role, created_at",
        )
        .bind(&role.name)
        .bind(role.description.as_deref())
        .bind(role.is_system_role)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn delete_role(&self, id: i64) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM roles WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_permissions(&self) -> Result<Vec<Permission>, DatabaseError> {
        Ok(sqlx::query_as::<_, Permission>(
            "SELECT id, resource, action, description FROM permissions ORDER BY resource, action",
        )
        .fetch_all(&self.pool)
        .await?)
    }

    async fn all_role_permissions(&self) -> Result<Vec<(i64, Permission)>, DatabaseError> {
        let rows = sqlx::query(
            "SELECT rp.role_id, p.id, p.resource, p.action, p.description \
             FROM role_permissions rp JOIN permissions p ON p.id = rp.permission_id \
             ORDER BY rp.role_id, p.resource, p.action",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut links = Vec::with_capacity(rows.len());
        for row in &rows {
            let role_id: i64 = row.try_get("role_id")?;
            links.push((role_id, Permission::from_row(row)?));
        }
        Ok(links)
    }

    async fn replace_role_permissions(&self, role_id: i64, permission_ids: &[i64]) -> Result<(), DatabaseError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM role_permissions WHERE role_id = $1")
            .bind(role_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO role_permissions (role_id, permission_id) \
             SELECT $1, permission_id FROM UNNEST($2::bigint[]) AS permission_id \
             ON CONFLICT DO NOTHING",
        )
        .bind(role_id)
        .bind(permission_ids)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn ensure_permission(
        &self,
        resource: &str,
        action: &str,
        description: Option<&str>,
    ) -> Result<Permission, DatabaseError> {
        Ok(sqlx::query_as::<_, Permission>(
            "INSERT INTO permissions (resource, action, description) VALUES ($1, $2, $3) \
             ON CONFLICT (resource, action) \
             DO UPDATE SET description = COALESCE(EXCLUDED.description, permissions.description) \
             RETURNING id, resource, action, description",
        )
        .bind(resource)
        .bind(action)
        .bind(description)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn list_dashboards(&self, active_only: bool) -> Result<Vec<Dashboard>, DatabaseError> {
        let query = format!(
            "SELECT {DASHBOARD_COLUMNS} FROM dashboards WHERE ($1 = FALSE OR is_active) \
             ORDER BY created_at DESC, id DESC"
        );
        Ok(sqlx::query_as::<_, Dashboard>(&query)
            .bind(active_only)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn find_dashboard(&self, id: i64) -> Result<Option<Dashboard>, DatabaseError> {
        let query = format!("SELECT {DASHBOARD_COLUMNS} FROM dashboards WHERE id = $1");
        Ok(sqlx::query_as::<_, Dashboard>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn insert_dashboard(&self, dashboard: &NewDashboard) -> Result<Dashboard, DatabaseError> {
        let query = format!(
            "INSERT INTO dashboards (name, description, layout, created_by) VALUES ($1, $2, $3, $4) \
             RETURNING {DASHBOARD_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Dashboard>(&query)
            .bind(&dashboard.name)
            .bind(dashboard.description.as_deref())
            .bind(&dashboard.layout)
            .bind(dashboard.created_by)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn update_dashboard(&self, id: i64, changes: &DashboardChanges) -> Result<Option<Dashboard>, DatabaseError> {
        let query = format!(
            "UPDATE dashboards SET \
                name = COALESCE($2, name), \
                description = COALESCE($3, description), \
                layout = COALESCE($4, layout), \
                updated_at = NOW() \
             WHERE id = $1 RETURNING {DASHBOARD_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Dashboard>(&query)
            .bind(id)
            .bind(changes.name.as_deref())
            .bind(changes.description.as_deref())
            .bind(changes.layout.as_ref())
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn set_dashboard_lifecycle(&self, id: i64, lifecycle: Lifecycle) -> Result<bool, DatabaseError> {
        let result = sqlx::query("UPDATE dashboards SET is_active = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(lifecycle.is_active())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn grants_for_roles(&self, role_names: &[String]) -> Result<Vec<DashboardGrant>, DatabaseError> {
        if role_names.is_empty() {
            return Ok(Vec::new());
        }
        let query = format!("{GRANT_SELECT} WHERE r.name = ANY($1) ORDER BY dp.dashboard_id, r.name");
        Ok(sqlx::query_as::<_, DashboardGrant>(&query)
            .bind(role_names)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn dashboard_grants(&self, dashboard_id: i64) -> Result<Vec<DashboardGrant>, DatabaseError> {
        let query = format!("{GRANT_SELECT} WHERE dp.dashboard_id = $1 ORDER BY r.name");
        Ok(sqlx::query_as::<_, DashboardGrant>(&query)
            .bind(dashboard_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn upsert_grant(
        &self,
        dashboard_id: i64,
        role_id: i64,
        capabilities: CapabilitySet,
    ) -> Result<DashboardGrant, DatabaseError> {
        Ok(sqlx::query_as::<_, DashboardGrant>(
            "WITH upserted AS ( \
                INSERT INTO dashboard_permissions (dashboard_id, role_id, permissions) VALUES ($1, $2, $3) \
                ON CONFLICT (dashboard_id, role_id) \
                DO UPDATE SET permissions = EXCLUDED.permissions, updated_at = NOW() \
                RETURNING id, dashboard_id, role_id, permissions, created_at, updated_at \
             ) \
             SELECT u.id, u.dashboard_id, u.role_id, r.name AS role_name, u.permissions, u.created_at, u.updated_at \
             FROM upserted u JOIN roles r ON r.id = u.role_id",
        )
        .bind(dashboard_id)
        .bind(role_id)
        .bind(Json(capabilities))
        .fetch_one(&self.pool)
        .await?)
    }

    async fn delete_grant(&self, dashboard_id: i64, role_id: i64) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM dashboard_permissions WHERE dashboard_id = $1 AND role_id = $2")
            .bind(dashboard_id)
            .bind(role_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn dashboard_tabs(&self, dashboard_id: i64) -> Result<Vec<DashboardTab>, DatabaseError> {
        let query = format!("SELECT {TAB_COLUMNS} FROM dashboard_tabs WHERE dashboard_id = $1 ORDER BY position, id");
        Ok(sqlx::query_as::<_, DashboardTab>(&query)
            .bind(dashboard_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn find_tab(&self, tab_id: i64) -> Result<Option<DashboardTab>, DatabaseError> {
        let query = format!("SELECT {TAB_COLUMNS} FROM dashboard_tabs WHERE id = $1");
        Ok(sqlx::query_as::<_, DashboardTab>(&query)
            .bind(tab_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn insert_tab(&self, tab: &NewTab) -> Result<DashboardTab, DatabaseError> {
        let query = format!(
            "INSERT INTO dashboard_tabs (dashboard_id, name, position, config) VALUES ($1, $2, $3, $4) \
             RETURNING {TAB_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, DashboardTab>(&query)
            .bind(tab.dashboard_id)
            .bind(&tab.name)
            .bind(tab.position)
            .bind(&tab.config)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn tab_visualizations(&self, tab_ids: &[i64]) -> Result<Vec<Visualization>, DatabaseError> {
        if tab_ids.is_empty() {
            return Ok(Vec::new());
        }
        let query = format!(
            "SELECT {VISUALIZATION_COLUMNS} FROM visualizations WHERE tab_id = ANY($1) ORDER BY tab_id, position, id"
        );
        Ok(sqlx::query_as::<_, Visualization>(&query)
            .bind(tab_ids)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn insert_visualization(&self, viz: &NewVisualization) -> Result<Visualization, DatabaseError> {
        let query = format!(
            "INSERT INTO visualizations (tab_id, kind, title, config, query, position, refresh_rate) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {VISUALIZATION_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Visualization>(&query)
            .bind(viz.tab_id)
            .bind(&viz.kind)
            .bind(viz.title.as_deref())
            .bind(&viz.config)
            .bind(viz.query.as_deref())
            .bind(viz.position)
            .bind(viz.refresh_rate)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn list_data_models(&self) -> Result<Vec<DataModel>, DatabaseError> {
        let query = format!("SELECT {DATA_MODEL_COLUMNS} FROM data_models ORDER BY created_at DESC, id DESC");
        Ok(sqlx::query_as::<_, DataModel>(&query).fetch_all(&self.pool).await?)
    }

    async fn find_data_model(&self, id: i64) -> Result<Option<DataModel>, DatabaseError> {
        let query = format!("SELECT {DATA_MODEL_COLUMNS} FROM data_models WHERE id = $1");
        Ok(sqlx::query_as::<_, DataModel>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn insert_data_model(&self, model: &NewDataModel) -> Result<DataModel, DatabaseError> {
        let query = format!(
            "INSERT INTO data_models (name, display_name, description, schema_json, table_name, created_by) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {DATA_MODEL_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, DataModel>(&query)
            .bind(&model.name)
            .bind(&model.display_name)
            .bind(model.description.as_deref())
            .bind(Json(&model.fields))
            .bind(&model.table_name)
            .bind(model.created_by)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn update_data_model(&self, id: i64, changes: &DataModelChanges) -> Result<Option<DataModel>, DatabaseError> {
        let query = format!(
            "UPDATE data_models SET \
                display_name = COALESCE($2, display_name), \
                description = COALESCE($3, description), \
                schema_json = COALESCE($4, schema_json), \
                version = CASE WHEN $4::jsonb IS NULL THEN version ELSE version + 1 END, \
                is_active = COALESCE($5, is_active), \
                updated_at = NOW() \
             WHERE id = $1 RETURNING {DATA_MODEL_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, DataModel>(&query)
            .bind(id)
            .bind(changes.display_name.as_deref())
            .bind(changes.description.as_deref())
            .bind(changes.fields.as_ref().map(Json))
            .bind(changes.lifecycle.map(Lifecycle::is_active))
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn model_relationships(&self, model_id: i64) -> Result<Vec<DataRelationship>, DatabaseError> {
        let query = format!(
            "SELECT {RELATIONSHIP_COLUMNS} FROM data_relationships \
             WHERE source_model_id = $1 OR target_model_id = $1 ORDER BY id"
        );
        Ok(sqlx::query_as::<_, DataRelationship>(&query)
            .bind(model_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn insert_relationship(&self, relationship: &NewRelationship) -> Result<DataRelationship, DatabaseError> {
        let query = format!(
            "INSERT INTO data_relationships (name, source_model_id, target_model_id, kind, source_field, target_field) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {RELATIONSHIP_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, DataRelationship>(&query)
            .bind(&relationship.name)
            .bind(relationship.source_model_id)
            .bind(relationship.target_model_id)
            .bind(relationship.kind.as_str())
            .bind(&relationship.source_field)
            .bind(&relationship.target_field)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn list_uploads(&self, filter: &UploadFilter) -> Result<Vec<Upload>, DatabaseError> {
        let query = format!(
            "SELECT {UPLOAD_COLUMNS} FROM upload_history \
             WHERE ($1::bigint IS NULL OR model_id = $1) AND ($2::text IS NULL OR status = $2) \
             ORDER BY created_at DESC, id DESC LIMIT $3"
        );
        Ok(sqlx::query_as::<_, Upload>(&query)
            .bind(filter.model_id)
            .bind(filter.status.map(|status| status.as_str()))
            .bind(filter.limit)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn find_upload(&self, id: i64) -> Result<Option<Upload>, DatabaseError> {
        let query = format!("SELECT {UPLOAD_COLUMNS} FROM upload_history WHERE id = $1");
        Ok(sqlx::query_as::<_, Upload>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn insert_upload(&self, upload: &NewUpload) -> Result<Upload, DatabaseError> {
        let query = format!(
            "INSERT INTO upload_history (user_id, model_id, file_name, file_size) VALUES ($1, $2, $3, $4) \
             RETURNING {UPLOAD_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Upload>(&query)
            .bind(upload.user_id)
            .bind(upload.model_id)
            .bind(&upload.file_name)
            .bind(upload.file_size)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn update_upload(&self, id: i64, changes: &UploadChanges) -> Result<Option<Upload>, DatabaseError> {
        let query = format!(
            "UPDATE upload_history SET \
                status = COALESCE($2, status), \
                records_count = COALESCE($3, records_count), \
                records_success = COALESCE($4, records_success), \
                records_failed = COALESCE($5, records_failed), \
                error_log = COALESCE($6, error_log), \
                completed_at = COALESCE($7, completed_at), \
                updated_at = NOW() \
             WHERE id = $1 RETURNING {UPLOAD_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Upload>(&query)
            .bind(id)
            .bind(changes.status.map(|status| status.as_str()))
            .bind(changes.records_count)
            .bind(changes.records_success)
            .bind(changes.records_failed)
            .bind(changes.error_log.as_deref())
            .bind(changes.completed_at)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn append_audit(&self, event: &AuditEvent) -> Result<AuditLog, DatabaseError> {
        let query = format!(
            "INSERT INTO audit_logs \
                (user_id, action, resource_type, resource_id, details, outcome, ip_address, user_agent) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {AUDIT_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, AuditLog>(&query)
            .bind(event.actor)
            .bind(event.action.as_str())
            .bind(event.resource_type.as_str())
            .bind(event.resource_id)
            .bind(event.detail.as_ref())
            .bind(event.outcome.as_str())
            .bind(event.ip_address.as_deref())
            .bind(event.user_agent.as_deref())
            .fetch_one(&self.pool)
            .await?)
    }

    async fn list_audit(&self, query: &AuditQuery) -> Result<Vec<AuditLog>, DatabaseError> {
        let sql = format!(
            "SELECT {AUDIT_COLUMNS} FROM audit_logs \
             WHERE ($1::text IS NULL OR action = $1) \
               AND ($2::text IS NULL OR resource_type = $2) \
               AND ($3::bigint IS NULL OR user_id = $3) \
             ORDER BY created_at DESC, id DESC LIMIT $4 OFFSET $5"
        );
        Ok(sqlx::query_as::<_, AuditLog>(&sql)
            .bind(query.action.map(|action| action.as_str()))
            .bind(query.resource_type.map(|kind| kind.as_str()))
            .bind(query.actor)
            .bind(query.limit)
            .bind(query.offset)
            .fetch_all(&self.pool)
            .await?)
    }
}
