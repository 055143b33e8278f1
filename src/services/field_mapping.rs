use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use super::audit;
use crate::auth::Permission;
use crate::database::models::audit_log::AuditAction;
use crate::database::models::schema::FieldMapping;
use crate::middleware::ValidatedUser;
use crate::result::{created, ok, ServiceError, ServiceResult, Validator};

const MAPPING_COLUMNS: &str = "m.id, m.schema_field_id, m.source_key, m.is_active, m.created_at";

#[derive(Debug, Clone, Deserialize)]
pub struct CreateFieldMapping {
    pub schema_field_id: Uuid,
    pub source_key: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FieldMappingFilter {
    pub schema_id: Option<Uuid>,
    pub schema_field_id: Option<Uuid>,
}

#[async_trait]
pub trait FieldMappingService: Send + Sync {
    async fn list(&self, actor: &ValidatedUser, filter: FieldMappingFilter) -> ServiceResult<Vec<FieldMapping>>;

    async fn create(&self, actor: &ValidatedUser, input: CreateFieldMapping) -> ServiceResult<FieldMapping>;

    async fn remove(&self, actor: &ValidatedUser, id: Uuid) -> ServiceResult<FieldMapping>;
}

pub struct PgFieldMappingService {
    pool: PgPool,
}

impl PgFieldMappingService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FieldMappingService for PgFieldMappingService {
    async fn list(&self, actor: &ValidatedUser, filter: FieldMappingFilter) -> ServiceResult<Vec<FieldMapping>> {
        actor.require(Permission::SchemasRead)?;

        let mappings = sqlx::query_as::<_, FieldMapping>(&format!(
            "SELECT {} FROM field_mappings m
             JOIN schema_fields f ON f.id = m.schema_field_id
             WHERE m.is_active
               AND ($1::uuid IS NULL OR f.schema_id = $1)
               AND ($2::uuid IS NULL OR m.schema_field_id = $2)
             ORDER BY f.display_order, m.source_key",
            MAPPING_COLUMNS
        ))
        .bind(filter.schema_id)
        .bind(filter.schema_field_id)
        .fetch_all(&self.pool)
        .await?;

        ok(mappings)
    }

    async fn create(&self, actor: &ValidatedUser, input: CreateFieldMapping) -> ServiceResult<FieldMapping> {
        actor.require(Permission::SchemasManage)?;

        Validator::new()
            .required("source_key", &input.source_key)
            .max_len("source_key", &input.source_key, 200)
            .finish()?;

        let mut tx = self.pool.begin().await?;

        let field_active: Option<bool> = sqlx::query_scalar("SELECT is_active FROM schema_fields WHERE id = $1")
            .bind(input.schema_field_id)
            .fetch_optional(&mut *tx)
            .await?;
        if field_active != Some(true) {
            return Err(ServiceError::invalid("schema_field_id", "Field does not exist or is not active"));
        }

        // A removed mapping is revived rather than duplicated.
        let mapping = sqlx::query_as::<_, FieldMapping>(
            "INSERT INTO field_mappings AS m (schema_field_id, source_key) VALUES ($1, $2)
             ON CONFLICT (schema_field_id, source_key) DO UPDATE SET is_active = true
             WHERE NOT m.is_active
             RETURNING m.id, m.schema_field_id, m.source_key, m.is_active, m.created_at",
        )
        .bind(input.schema_field_id)
        .bind(input.source_key.trim())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| {
            ServiceError::Conflict(format!("Source key '{}' is already mapped to this field", input.source_key.trim()))
        })?;

        audit::record(
            &mut tx,
            actor,
            "field_mapping",
            mapping.id,
            AuditAction::Create,
            json!({ "schema_field_id": mapping.schema_field_id, "source_key": mapping.source_key }),
        )
        .await?;
        tx.commit().await?;

        created(mapping)
    }

    async fn remove(&self, actor: &ValidatedUser, id: Uuid) -> ServiceResult<FieldMapping> {
        actor.require(Permission::SchemasManage)?;

        let mut tx = self.pool.begin().await?;

        let mapping = sqlx::query_as::<_, FieldMapping>(
            "UPDATE field_mappings SET is_active = false WHERE id = $1
             RETURNING id, schema_field_id, source_key, is_active, created_at",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ServiceError::not_found("Field mapping", id))?;

        audit::record(
            &mut tx,
            actor,
            "field_mapping",
            id,
            AuditAction::Deactivate,
            json!({ "source_key": mapping.source_key }),
        )
        .await?;
        tx.commit().await?;

        ok(mapping)
    }
}
