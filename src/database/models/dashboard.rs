use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{postgres::PgRow, FromRow, Row};

use super::json_column;
use crate::types::{CapabilitySet, Lifecycle};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dashboard {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub layout: Value,
    pub lifecycle: Lifecycle,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for Dashboard {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let is_active: bool = row.try_get("is_active")?;
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            layout: row.try_get("layout")?,
            lifecycle: Lifecycle::from(is_active),
            created_by: row.try_get("created_by")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// One role's capabilities on one dashboard
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardGrant {
    pub id: i64,
    pub dashboard_id: i64,
    pub role_id: i64,
    pub role_name: String,
    pub capabilities: CapabilitySet,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for DashboardGrant {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            dashboard_id: row.try_get("dashboard_id")?,
            role_id: row.try_get("role_id")?,
            role_name: row.try_get("role_name")?,
            capabilities: json_column(row, "permissions")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DashboardTab {
    pub id: i64,
    pub dashboard_id: i64,
    pub name: String,
    pub position: i32,
    pub config: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Visualization {
    pub id: i64,
    pub tab_id: i64,
    pub kind: String,
    pub title: Option<String>,
    pub config: Value,
    /// Stored verbatim, never executed here
    pub query: Option<String>,
    pub position: i32,
    pub refresh_rate: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TabWithVisualizations {
    #[serde(flatten)]
    pub tab: DashboardTab,
    pub visualizations: Vec<Visualization>,
}

/// A dashboard together with everything hanging off it
#[derive(Debug, Clone, Serialize)]
pub struct DashboardDetail {
    #[serde(flatten)]
    pub dashboard: Dashboard,
    pub tabs: Vec<TabWithVisualizations>,
    /// Effective capabilities of the caller
    pub capabilities: CapabilitySet,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grants: Option<Vec<DashboardGrant>>,
}

impl DashboardDetail {
    /// Group visualizations under their tabs, both ordered by position
    pub fn assemble(
        dashboard: Dashboard,
        mut tabs: Vec<DashboardTab>,
        mut visualizations: Vec<Visualization>,
        capabilities: CapabilitySet,
    ) -> Self {
        tabs.sort_by_key(|tab| (tab.position, tab.id));
        visualizations.sort_by_key(|viz| (viz.position, viz.id));

        let tabs = tabs
            .into_iter()
            .map(|tab| {
                let visualizations = visualizations
                    .iter()
                    .filter(|viz| viz.tab_id == tab.id)
                    .cloned()
                    .collect();
                TabWithVisualizations { tab, visualizations }
            })
            .collect();

        Self {
            dashboard,
            tabs,
            capabilities,
            grants: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewDashboard {
    pub name: String,
    pub description: Option<String>,
    pub layout: Value,
    pub created_by: i64,
}

#[derive(Debug, Clone, Default)]
pub struct DashboardChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub layout: Option<Value>,
}

impl DashboardChanges {
    pub fn touched(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.name.is_some() {
            fields.push("name");
        }
        if self.description.is_some() {
            fields.push("description");
        }
        if self.layout.is_some() {
            fields.push("layout");
        }
        fields
    }
}

#[derive(Debug, Clone)]
pub struct NewTab {
    pub dashboard_id: i64,
    pub name: String,
    pub position: i32,
    pub config: Value,
}

#[derive(Debug, Clone)]
pub struct NewVisualization {
    pub tab_id: i64,
    pub kind: String,
    pub title: Option<String>,
    pub config: Value,
    pub query: Option<String>,
    pub position: i32,
    pub refresh_rate: Option<i32>,
}
