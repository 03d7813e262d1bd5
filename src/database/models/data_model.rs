use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgRow, FromRow, Row};

use super::{json_column, text_column};
use crate::types::{FieldType, Lifecycle, RelationshipKind};

/// One column in a data model's schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub unique: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataModel {
    pub id: i64,
    pub name: String,
    pub display_name: String,
    pub description: Option<String>,
    pub fields: Vec<FieldDefinition>,
    pub version: i32,
    pub lifecycle: Lifecycle,
    pub table_name: String,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for DataModel {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let is_active: bool = row.try_get("is_active")?;
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            display_name: row.try_get("display_name")?,
            description: row.try_get("description")?,
            fields: json_column(row, "schema_json")?,
            version: row.try_get("version")?,
            lifecycle: Lifecycle::from(is_active),
            table_name: row.try_get("table_name")?,
            created_by: row.try_get("created_by")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataRelationship {
    pub id: i64,
    pub name: String,
    pub source_model_id: i64,
    pub target_model_id: i64,
    pub kind: RelationshipKind,
    pub source_field: String,
    pub target_field: String,
    pub lifecycle: Lifecycle,
    pub created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for DataRelationship {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let is_active: bool = row.try_get("is_active")?;
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            source_model_id: row.try_get("source_model_id")?,
            target_model_id: row.try_get("target_model_id")?,
            kind: text_column(row, "kind")?,
            source_field: row.try_get("source_field")?,
            target_field: row.try_get("target_field")?,
            lifecycle: Lifecycle::from(is_active),
            created_at: row.try_get("created_at")?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DataModelDetail {
    #[serde(flatten)]
    pub model: DataModel,
    /// Relationships where this model is either the source or the target
    pub relationships: Vec<DataRelationship>,
}

#[derive(Debug, Clone)]
pub struct NewDataModel {
    pub name: String,
    pub display_name: String,
    pub description: Option<String>,
    pub fields: Vec<FieldDefinition>,
    pub table_name: String,
    pub created_by: i64,
}

#[derive(Debug, Clone, Default)]
pub struct DataModelChanges {
    pub display_name: Option<String>,
    pub description: Option<String>,
    /// Replacing the field list bumps the model version
    pub fields: Option<Vec<FieldDefinition>>,
    pub lifecycle: Option<Lifecycle>,
}

impl DataModelChanges {
    pub fn touched(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.display_name.is_some() {
            fields.push("display_name");
        }
        if self.description.is_some() {
            fields.push("description");
        }
        if self.fields.is_some() {
            fields.push("fields");
        }
        if self.lifecycle.is_some() {
            fields.push("is_active");
        }
        fields
    }
}

#[derive(Debug, Clone)]
pub struct NewRelationship {
    pub name: String,
    pub source_model_id: i64,
    pub target_model_id: i64,
    pub kind: RelationshipKind,
    pub source_field: String,
    pub target_field: String,
}

/// Physical table name reserved for a model: `dm_` plus the lowercased name
/// with each whitespace run collapsed to one underscore.
pub fn table_name_for(name: &str) -> String {
    let slug = name
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("_");
    format!("dm_{slug}")
}
