pub mod audit;
pub mod dashboard;
pub mod data_model;
pub mod role;
pub mod upload;
pub mod user;

pub use audit::{AuditLog, AuditQuery};
pub use dashboard::{
    Dashboard, DashboardChanges, DashboardDetail, DashboardGrant, DashboardTab, NewDashboard, NewTab,
    NewVisualization, TabWithVisualizations, Visualization,
};
pub use data_model::{
    DataModel, DataModelChanges, DataModelDetail, DataRelationship, FieldDefinition, NewDataModel, NewRelationship,
};
pub use role::{NewRole, Permission, Role, RoleWithPermissions};
pub use upload::{NewUpload, Upload, UploadChanges, UploadFilter};
pub use user::{NewUser, User, UserChanges, UserFilter, UserWithRoles};

use serde::de::DeserializeOwned;
use sqlx::{postgres::PgRow, Row};
use std::str::FromStr;

use crate::types::UnknownVariant;

/// Read a text column into one of the closed enums in `crate::types`
pub(crate) fn text_column<T>(row: &PgRow, column: &str) -> Result<T, sqlx::Error>
where
    T: FromStr<Err = UnknownVariant>,
{
    let raw: String = row.try_get(column)?;
    raw.parse().map_err(|e: UnknownVariant| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}

/// Read a JSONB column into a typed value
pub(crate) fn json_column<T>(row: &PgRow, column: &str) -> Result<T, sqlx::Error>
where
    T: DeserializeOwned,
{
    let raw: serde_json::Value = row.try_get(column)?;
    serde_json::from_value(raw).map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}
