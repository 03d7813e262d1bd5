use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;
use validator::Validate;

use super::{require_admin, ServiceError, ServiceResult};
use crate::access::Principal;
use crate::audit::{AuditEvent, AuditRecorder};
use crate::database::models::data_model::table_name_for;
use crate::database::models::{
    DataModel, DataModelChanges, DataModelDetail, DataRelationship, FieldDefinition, NewDataModel, NewRelationship,
};
use crate::database::{DatabaseError, Store};
use crate::types::{AuditAction, Lifecycle, RelationshipKind, ResourceType};
use crate::validation::ValidatedRequest;

pub const MSG_MODEL_NOT_FOUND: &str = "Data model not found";
pub const MSG_MODEL_TAKEN: &str = "Data model name already exists";

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateDataModelRequest {
    #[validate(length(min = 1, max = 255, message = "Model name is required"))]
    pub name: String,
    #[validate(length(min = 1, max = 255, message = "Display name is required"))]
    pub display_name: String,
    pub description: Option<String>,
    #[validate(length(min = 1, message = "At least one field is required"))]
    pub fields: Vec<FieldDefinition>,
}

impl ValidatedRequest for CreateDataModelRequest {
    const FIELD_ORDER: &'static [&'static str] = &["name", "display_name", "fields"];
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateDataModelRequest {
    #[validate(length(min = 1, max = 255, message = "Display name is required"))]
    pub display_name: Option<String>,
    pub description: Option<String>,
    #[validate(length(min = 1, message = "At least one field is required"))]
    pub fields: Option<Vec<FieldDefinition>>,
    pub is_active: Option<bool>,
}

impl ValidatedRequest for UpdateDataModelRequest {
    const FIELD_ORDER: &'static [&'static str] = &["display_name", "fields"];
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateRelationshipRequest {
    #[validate(length(min = 1, max = 255, message = "Relationship name is required"))]
    pub name: String,
    pub target_model_id: i64,
    pub kind: RelationshipKind,
    #[validate(length(min = 1, message = "Source field is required"))]
    pub source_field: String,
    #[validate(length(min = 1, message = "Target field is required"))]
    pub target_field: String,
}

impl ValidatedRequest for CreateRelationshipRequest {
    const FIELD_ORDER: &'static [&'static str] = &["name", "source_field", "target_field"];
}

/// Field names must be present and distinct within one model
fn check_fields(fields: &[FieldDefinition]) -> ServiceResult<()> {
    let mut seen = BTreeSet::new();
    for field in fields {
        let name = field.name.trim();
        if name.is_empty() {
            return Err(ServiceError::validation("fields", "Field name is required"));
        }
        if !seen.insert(name) {
            return Err(ServiceError::validation("fields", format!("Duplicate field name '{name}'")));
        }
    }
    Ok(())
}

#[derive(Clone)]
pub struct DataModelService {
    store: Arc<dyn Store>,
    audit: AuditRecorder,
}

impl DataModelService {
    pub fn new(store: Arc<dyn Store>, audit: AuditRecorder) -> Self {
        Self { store, audit }
    }

    pub async fn list(&self, _principal: &Principal) -> ServiceResult<Vec<DataModel>> {
        Ok(self.store.list_data_models().await?)
    }

    pub async fn get(&self, _principal: &Principal, id: i64) -> ServiceResult<DataModelDetail> {
        let (model, relationships) = futures::try_join!(self.load(id), async {
            self.store.model_relationships(id).await.map_err(ServiceError::from)
        })?;
        Ok(DataModelDetail { model, relationships })
    }

    pub async fn create(&self, principal: &Principal, request: CreateDataModelRequest) -> ServiceResult<DataModel> {
        require_admin(principal)?;
        request.check()?;
        check_fields(&request.fields)?;

        let table_name = table_name_for(&request.name);
        let model = self
            .store
            .insert_data_model(&NewDataModel {
                name: request.name,
                display_name: request.display_name,
                description: request.description,
                fields: request.fields,
                table_name,
                created_by: principal.user_id,
            })
            .await
            .map_err(|e| match e {
                DatabaseError::Conflict(_) => ServiceError::Conflict(MSG_MODEL_TAKEN.into()),
                other => other.into(),
            })?;

        self.audit
            .record(
                AuditEvent::new(AuditAction::Create, ResourceType::DataModel)
                    .actor(principal.user_id)
                    .resource(model.id)
                    .detail(json!({ "name": model.name, "table_name": model.table_name })),
            )
            .await?;

        Ok(model)
    }

    /// Replacing `fields` bumps the model version
    pub async fn update(&self, principal: &Principal, id: i64, request: UpdateDataModelRequest) -> ServiceResult<DataModel> {
        require_admin(principal)?;
        request.check()?;
        if let Some(fields) = &request.fields {
            check_fields(fields)?;
        }

        let current = self.load(id).await?;
        let changes = DataModelChanges {
            display_name: request.display_name,
            description: request.description,
            fields: request.fields,
            lifecycle: request.is_active.map(Lifecycle::from),
        };
        let touched = changes.touched();
        if touched.is_empty() {
            return Ok(current);
        }

        let model = self
            .store
            .update_data_model(id, &changes)
            .await?
            .ok_or_else(|| ServiceError::not_found(MSG_MODEL_NOT_FOUND))?;

        self.audit
            .record(
                AuditEvent::new(AuditAction::Update, ResourceType::DataModel)
                    .actor(principal.user_id)
                    .resource(id)
                    .detail(json!({ "updated": touched, "version": model.version })),
            )
            .await?;

        Ok(model)
    }

    /// Soft delete; uploads keep pointing at the model
    pub async fn delete(&self, principal: &Principal, id: i64) -> ServiceResult<()> {
        require_admin(principal)?;

        let model = self.load(id).await?;
        if !model.lifecycle.is_active() {
            return Err(ServiceError::not_found(MSG_MODEL_NOT_FOUND));
        }

        let changes = DataModelChanges {
            lifecycle: Some(Lifecycle::Inactive),
            ..Default::default()
        };
        self.store
            .update_data_model(id, &changes)
            .await?
            .ok_or_else(|| ServiceError::not_found(MSG_MODEL_NOT_FOUND))?;

        self.audit
            .record(
                AuditEvent::new(AuditAction::Delete, ResourceType::DataModel)
                    .actor(principal.user_id)
                    .resource(id)
                    .detail(json!({ "name": model.name })),
            )
            .await?;

        Ok(())
    }

    pub async fn add_relationship(
        &self,
        principal: &Principal,
        id: i64,
        request: CreateRelationshipRequest,
    ) -> ServiceResult<DataRelationship> {
        require_admin(principal)?;
        request.check()?;

        let source = self.load(id).await?;
        let target = self
            .store
            .find_data_model(request.target_model_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Target data model not found"))?;

        if !source.fields.iter().any(|f| f.name == request.source_field) {
            return Err(ServiceError::validation(
                "source_field",
                format!("Unknown field '{}' on {}", request.source_field, source.name),
            ));
        }
        if !target.fields.iter().any(|f| f.name == request.target_field) {
            return Err(ServiceError::validation(
                "target_field",
                format!("Unknown field '{}' on {}", request.target_field, target.name),
            ));
        }

        let relationship = self
            .store
            .insert_relationship(&NewRelationship {
                name: request.name,
                source_model_id: source.id,
                target_model_id: target.id,
                kind: request.kind,
                source_field: request.source_field,
                target_field: request.target_field,
            })
            .await?;

        self.audit
            .record(
                AuditEvent::new(AuditAction::Create, ResourceType::DataModel)
                    .actor(principal.user_id)
                    .resource(source.id)
                    .detail(json!({
                        "relationship": relationship.name,
                        "target_model_id": target.id,
                        "kind": relationship.kind,
                    })),
            )
            .await?;

        Ok(relationship)
    }

    async fn load(&self, id: i64) -> ServiceResult<DataModel> {
        self.store
            .find_data_model(id)
            .await?
            .ok_or_else(|| ServiceError::not_found(MSG_MODEL_NOT_FOUND))
    }
}
