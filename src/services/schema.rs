//! Schemas and their ordered field definitions.

use std::collections::HashSet;

use async_trait::async_trait;
use serde::Deserialize;
use serde_with::rust::double_option;
use serde_json::json;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::audit;
use crate::auth::Permission;
use crate::database::models::audit_log::AuditAction;
use crate::database::models::schema::{FieldType, Schema, SchemaDetails, SchemaField};
use crate::database::{PageQuery, Paginated};
use crate::middleware::ValidatedUser;
use crate::result::{created, ok, ServiceError, ServiceResult, ValidationError, Validator};

const SCHEMA_COLUMNS: &str = "id, project_id, name, description, is_active, created_at, updated_at";
pub(crate) const FIELD_COLUMNS: &str = "id, schema_id, name, label, field_type, is_required, max_length, options, \
     display_order, is_active, created_at, updated_at";

#[derive(Debug, Clone, Deserialize)]
pub struct CreateSchema {
    pub project_id: Uuid,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateSchema {
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SchemaFilter {
    pub project_id: Option<Uuid>,
    #[serde(default)]
    pub include_inactive: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateField {
    pub name: String,
    pub label: String,
    pub field_type: FieldType,
    #[serde(default)]
    pub is_required: bool,
    pub max_length: Option<i32>,
    #[serde(default)]
    pub options: Vec<String>,
    /// Appended after the last field when absent
    pub display_order: Option<i32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateField {
    pub label: Option<String>,
    pub is_required: Option<bool>,
    /// Absent keeps the limit, `null` removes it
    #[serde(default, with = "double_option")]
    pub max_length: Option<Option<i32>>,
    pub options: Option<Vec<String>>,
}

impl UpdateField {
    /// Limit after the update is applied to a field currently limited to `current`
    pub fn resulting_max_length(&self, current: Option<i32>) -> Option<i32> {
        match self.max_length {
            Some(requested) => requested,
            None => current,
        }
    }
}

#[async_trait]
pub trait SchemaService: Send + Sync {
    async fn list(&self, actor: &ValidatedUser, filter: SchemaFilter, page: PageQuery)
        -> ServiceResult<Paginated<Schema>>;

    async fn get(&self, actor: &ValidatedUser, id: Uuid) -> ServiceResult<SchemaDetails>;

    async fn create(&self, actor: &ValidatedUser, input: CreateSchema) -> ServiceResult<Schema>;

    async fn update(&self, actor: &ValidatedUser, id: Uuid, input: UpdateSchema) -> ServiceResult<Schema>;

    async fn deactivate(&self, actor: &ValidatedUser, id: Uuid) -> ServiceResult<Schema>;

    async fn list_fields(&self, actor: &ValidatedUser, schema_id: Uuid) -> ServiceResult<Vec<SchemaField>>;

    async fn add_field(&self, actor: &ValidatedUser, schema_id: Uuid, input: CreateField)
        -> ServiceResult<SchemaField>;

    async fn update_field(
        &self,
        actor: &ValidatedUser,
        schema_id: Uuid,
        field_id: Uuid,
        input: UpdateField,
    ) -> ServiceResult<SchemaField>;

    async fn remove_field(&self, actor: &ValidatedUser, schema_id: Uuid, field_id: Uuid)
        -> ServiceResult<SchemaField>;

    /// Rewrite display order to follow `field_ids`
    async fn reorder_fields(
        &self,
        actor: &ValidatedUser,
        schema_id: Uuid,
        field_ids: Vec<Uuid>,
    ) -> ServiceResult<Vec<SchemaField>>;
}

pub struct PgSchemaService {
    pool: PgPool,
}

impl PgSchemaService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

async fn load_schema(conn: &mut PgConnection, id: Uuid) -> Result<Schema, ServiceError> {
    sqlx::query_as::<_, Schema>(&format!("SELECT {} FROM schemas WHERE id = $1", SCHEMA_COLUMNS))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Schema", id))
}

/// Active fields in display order
pub(crate) async fn active_fields(conn: &mut PgConnection, schema_id: Uuid) -> Result<Vec<SchemaField>, sqlx::Error> {
    sqlx::query_as::<_, SchemaField>(&format!(
        "SELECT {} FROM schema_fields WHERE schema_id = $1 AND is_active ORDER BY display_order",
        FIELD_COLUMNS
    ))
    .bind(schema_id)
    .fetch_all(&mut *conn)
    .await
}

async fn load_field(conn: &mut PgConnection, schema_id: Uuid, field_id: Uuid) -> Result<SchemaField, ServiceError> {
    sqlx::query_as::<_, SchemaField>(&format!(
        "SELECT {} FROM schema_fields WHERE id = $1 AND schema_id = $2",
        FIELD_COLUMNS
    ))
    .bind(field_id)
    .bind(schema_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| ServiceError::not_found("Field", field_id))
}

fn field_rules(validator: &mut Validator, field_type: FieldType, max_length: Option<i32>, options: &[String]) {
    if let Some(max) = max_length {
        validator.check(field_type == FieldType::Text, "max_length", "Only text fields take a maximum length");
        validator.check(max > 0, "max_length", "Must be greater than zero");
    }

    if field_type == FieldType::Choice {
        validator.check(!options.is_empty(), "options", "Choice fields need at least one option");
        validator.check(
            options.iter().all(|o| !o.trim().is_empty()),
            "options",
            "Options cannot be blank",
        );
    } else {
        validator.check(options.is_empty(), "options", "Only choice fields take options");
    }
}

/// Validation for a new field definition
pub fn validate_new_field(input: &CreateField) -> Result<(), ServiceError> {
    let mut validator = Validator::new();
    validator
        .required("name", &input.name)
        .code("name", input.name.trim())
        .max_len("name", &input.name, 100)
        .required("label", &input.label)
        .max_len("label", &input.label, 200);
    field_rules(&mut validator, input.field_type, input.max_length, &input.options);

    if let Some(order) = input.display_order {
        validator.check(order > 0, "display_order", "Must be greater than zero");
    }
    validator.finish()
}

/// A reorder request must name every active field exactly once
pub fn check_reorder(active: &[Uuid], requested: &[Uuid]) -> Result<(), ServiceError> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();

    for id in requested {
        if !seen.insert(*id) {
            errors.push(ValidationError::new("field_ids", format!("Field {} is listed more than once", id)));
        } else if !active.contains(id) {
            errors.push(ValidationError::new("field_ids", format!("Field {} is not an active field of this schema", id)));
        }
    }

    for id in active {
        if !seen.contains(id) {
            errors.push(ValidationError::new("field_ids", format!("Field {} is missing", id)));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ServiceError::Invalid(errors))
    }
}

#[async_trait]
impl SchemaService for PgSchemaService {
    async fn list(
        &self,
        actor: &ValidatedUser,
        filter: SchemaFilter,
        page: PageQuery,
    ) -> ServiceResult<Paginated<Schema>> {
        actor.require(Permission::SchemasRead)?;

        const WHERE: &str = "($1::uuid IS NULL OR project_id = $1) AND ($2 OR is_active)";

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM schemas WHERE {}", WHERE))
            .bind(filter.project_id)
            .bind(filter.include_inactive)
            .fetch_one(&self.pool)
            .await?;

        let items = sqlx::query_as::<_, Schema>(&format!(
            "SELECT {} FROM schemas WHERE {} ORDER BY name LIMIT $3 OFFSET $4",
            SCHEMA_COLUMNS, WHERE
        ))
        .bind(filter.project_id)
        .bind(filter.include_inactive)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        ok(page.wrap(items, total))
    }

    async fn get(&self, actor: &ValidatedUser, id: Uuid) -> ServiceResult<SchemaDetails> {
        actor.require(Permission::SchemasRead)?;

        let mut conn = self.pool.acquire().await?;
        let schema = load_schema(&mut conn, id).await?;
        let fields = active_fields(&mut conn, id).await?;
        ok(SchemaDetails { schema, fields })
    }

    async fn create(&self, actor: &ValidatedUser, input: CreateSchema) -> ServiceResult<Schema> {
        actor.require(Permission::SchemasManage)?;

        Validator::new()
            .required("name", &input.name)
            .max_len("name", &input.name, 200)
            .finish()?;

        let mut tx = self.pool.begin().await?;

        let project_active: Option<bool> = sqlx::query_scalar("SELECT is_active FROM projects WHERE id = $1")
            .bind(input.project_id)
            .fetch_optional(&mut *tx)
            .await?;
        if project_active != Some(true) {
            return Err(ServiceError::invalid("project_id", "Project does not exist or is not active"));
        }

        let schema = sqlx::query_as::<_, Schema>(&format!(
            "INSERT INTO schemas (project_id, name, description) VALUES ($1, $2, $3) RETURNING {}",
            SCHEMA_COLUMNS
        ))
        .bind(input.project_id)
        .bind(input.name.trim())
        .bind(&input.description)
        .fetch_one(&mut *tx)
        .await?;

        audit::record(&mut tx, actor, "schema", schema.id, AuditAction::Create, json!({ "name": schema.name }))
            .await?;
        tx.commit().await?;

        created(schema)
    }

    async fn update(&self, actor: &ValidatedUser, id: Uuid, input: UpdateSchema) -> ServiceResult<Schema> {
        actor.require(Permission::SchemasManage)?;

        if let Some(name) = &input.name {
            Validator::new().required("name", name).max_len("name", name, 200).finish()?;
        }

        let mut tx = self.pool.begin().await?;

        let schema = sqlx::query_as::<_, Schema>(&format!(
            "UPDATE schemas SET
                name = COALESCE($2, name),
                description = COALESCE($3, description),
                is_active = COALESCE($4, is_active),
                updated_at = now()
             WHERE id = $1
             RETURNING {}",
            SCHEMA_COLUMNS
        ))
        .bind(id)
        .bind(input.name.as_deref().map(str::trim))
        .bind(&input.description)
        .bind(input.is_active)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ServiceError::not_found("Schema", id))?;

        let action = match input.is_active {
            Some(false) => AuditAction::Deactivate,
            Some(true) => AuditAction::Restore,
            None => AuditAction::Update,
        };
        audit::record(&mut tx, actor, "schema", id, action, json!({ "name": input.name })).await?;
        tx.commit().await?;

        ok(schema)
    }

    async fn deactivate(&self, actor: &ValidatedUser, id: Uuid) -> ServiceResult<Schema> {
        self.update(
            actor,
            id,
            UpdateSchema {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
    }

    async fn list_fields(&self, actor: &ValidatedUser, schema_id: Uuid) -> ServiceResult<Vec<SchemaField>> {
        actor.require(Permission::SchemasRead)?;

        let mut conn = self.pool.acquire().await?;
        load_schema(&mut conn, schema_id).await?;
        ok(active_fields(&mut conn, schema_id).await?)
    }

    async fn add_field(
        &self,
        actor: &ValidatedUser,
        schema_id: Uuid,
        input: CreateField,
    ) -> ServiceResult<SchemaField> {
        actor.require(Permission::SchemasManage)?;
        validate_new_field(&input)?;

        let mut tx = self.pool.begin().await?;
        load_schema(&mut tx, schema_id).await?;

        let display_order = match input.display_order {
            Some(order) => {
                let taken: bool = sqlx::query_scalar(
                    "SELECT EXISTS (SELECT 1 FROM schema_fields WHERE schema_id = $1 AND display_order = $2 AND is_active)",
                )
                .bind(schema_id)
                .bind(order)
                .fetch_one(&mut *tx)
                .await?;
                if taken {
                    return Err(ServiceError::Conflict(format!("Display order {} is already used", order)));
                }
                order
            }
            None => {
                sqlx::query_scalar::<_, i32>(
                    "SELECT COALESCE(MAX(display_order), 0) + 1 FROM schema_fields WHERE schema_id = $1 AND is_active",
                )
                .bind(schema_id)
                .fetch_one(&mut *tx)
                .await?
            }
        };

        let options: Vec<String> = input.options.iter().map(|o| o.trim().to_string()).collect();

        let field = sqlx::query_as::<_, SchemaField>(&format!(
            "INSERT INTO schema_fields (schema_id, name, label, field_type, is_required, max_length, options, display_order)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING {}",
            FIELD_COLUMNS
        ))
        .bind(schema_id)
        .bind(input.name.trim())
        .bind(input.label.trim())
        .bind(input.field_type)
        .bind(input.is_required)
        .bind(input.max_length)
        .bind(&options)
        .bind(display_order)
        .fetch_one(&mut *tx)
        .await?;

        audit::record(
            &mut tx,
            actor,
            "schema_field",
            field.id,
            AuditAction::Create,
            json!({ "schema_id": schema_id, "name": field.name, "display_order": display_order }),
        )
        .await?;
        tx.commit().await?;

        created(field)
    }

    async fn update_field(
        &self,
        actor: &ValidatedUser,
        schema_id: Uuid,
        field_id: Uuid,
        input: UpdateField,
    ) -> ServiceResult<SchemaField> {
        actor.require(Permission::SchemasManage)?;

        let mut tx = self.pool.begin().await?;
        let existing = load_field(&mut tx, schema_id, field_id).await?;

        let mut validator = Validator::new();
        if let Some(label) = &input.label {
            validator.required("label", label).max_len("label", label, 200);
        }
        let options = input.options.clone().unwrap_or_else(|| existing.options.clone());
        let max_length = input.resulting_max_length(existing.max_length);
        field_rules(&mut validator, existing.field_type, max_length, &options);
        validator.finish()?;

        let options: Vec<String> = options.iter().map(|o| o.trim().to_string()).collect();

        let field = sqlx::query_as::<_, SchemaField>(&format!(
            "UPDATE schema_fields SET
                label = COALESCE($2, label),
                is_required = COALESCE($3, is_required),
                max_length = $4,
                options = $5,
                updated_at = now()
             WHERE id = $1
             RETURNING {}",
            FIELD_COLUMNS
        ))
        .bind(field_id)
        .bind(input.label.as_deref().map(str::trim))
        .bind(input.is_required)
        .bind(max_length)
        .bind(&options)
        .fetch_one(&mut *tx)
        .await?;

        audit::record(
            &mut tx,
            actor,
            "schema_field",
            field_id,
            AuditAction::Update,
            json!({ "label": input.label, "is_required": input.is_required, "max_length": max_length }),
        )
        .await?;
        tx.commit().await?;

        ok(field)
    }

    async fn remove_field(
        &self,
        actor: &ValidatedUser,
        schema_id: Uuid,
        field_id: Uuid,
    ) -> ServiceResult<SchemaField> {
        actor.require(Permission::SchemasManage)?;

        let mut tx = self.pool.begin().await?;
        load_field(&mut tx, schema_id, field_id).await?;

        let field = sqlx::query_as::<_, SchemaField>(&format!(
            "UPDATE schema_fields SET is_active = false, updated_at = now() WHERE id = $1 RETURNING {}",
            FIELD_COLUMNS
        ))
        .bind(field_id)
        .fetch_one(&mut *tx)
        .await?;

        audit::record(
            &mut tx,
            actor,
            "schema_field",
            field_id,
            AuditAction::Deactivate,
            json!({ "schema_id": schema_id, "name": field.name }),
        )
        .await?;
        tx.commit().await?;

        ok(field)
    }

    async fn reorder_fields(
        &self,
        actor: &ValidatedUser,
        schema_id: Uuid,
        field_ids: Vec<Uuid>,
    ) -> ServiceResult<Vec<SchemaField>> {
        actor.require(Permission::SchemasManage)?;

        let mut tx = self.pool.begin().await?;
        load_schema(&mut tx, schema_id).await?;

        let active: Vec<Uuid> = active_fields(&mut tx, schema_id).await?.into_iter().map(|f| f.id).collect();
        check_reorder(&active, &field_ids)?;

        // Park every field on a negative slot first so the unique index never sees a collision.
        sqlx::query(
            "UPDATE schema_fields SET display_order = -display_order - 1 WHERE schema_id = $1 AND is_active",
        )
        .bind(schema_id)
        .execute(&mut *tx)
        .await?;

        for (position, id) in field_ids.iter().enumerate() {
            sqlx::query("UPDATE schema_fields SET display_order = $2, updated_at = now() WHERE id = $1")
                .bind(id)
                .bind(position as i32 + 1)
                .execute(&mut *tx)
                .await?;
        }

        audit::record(
            &mut tx,
            actor,
            "schema",
            schema_id,
            AuditAction::Update,
            json!({ "field_order": field_ids }),
        )
        .await?;

        let fields = active_fields(&mut tx, schema_id).await?;
        tx.commit().await?;

        ok(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_field(field_type: FieldType) -> CreateField {
        CreateField {
            name: "invoice_number".into(),
            label: "Invoice number".into(),
            field_type,
            is_required: true,
            max_length: None,
            options: vec![],
            display_order: None,
        }
    }

    fn invalid_fields(err: ServiceError) -> Vec<String> {
        match err {
            ServiceError::Invalid(errors) => errors.into_iter().map(|e| e.field).collect(),
            other => panic!("expected Invalid, got {:?}", other),
        }
    }

    #[test]
    fn plain_text_field_is_valid() {
        let mut input = new_field(FieldType::Text);
        input.max_length = Some(40);
        assert!(validate_new_field(&input).is_ok());
    }

    #[test]
    fn choice_fields_need_options() {
        let err = validate_new_field(&new_field(FieldType::Choice)).unwrap_err();
        assert_eq!(invalid_fields(err), vec!["options"]);

        let mut input = new_field(FieldType::Choice);
        input.options = vec!["EUR".into(), "USD".into()];
        assert!(validate_new_field(&input).is_ok());
    }

    #[test]
    fn options_and_max_length_are_type_specific() {
        let mut input = new_field(FieldType::Integer);
        input.options = vec!["1".into()];
        input.max_length = Some(3);
        let fields = invalid_fields(validate_new_field(&input).unwrap_err());
        assert!(fields.contains(&"options".to_string()));
        assert!(fields.contains(&"max_length".to_string()));
    }

    #[test]
    fn field_names_are_codes() {
        let mut input = new_field(FieldType::Text);
        input.name = "invoice number".into();
        input.display_order = Some(0);
        let fields = invalid_fields(validate_new_field(&input).unwrap_err());
        assert_eq!(fields, vec!["name", "display_order"]);
    }

    #[test]
    fn max_length_can_be_kept_changed_or_removed() {
        let keep: UpdateField = serde_json::from_value(json!({ "label": "Invoice" })).unwrap();
        assert_eq!(keep.resulting_max_length(Some(40)), Some(40));

        let change: UpdateField = serde_json::from_value(json!({ "max_length": 80 })).unwrap();
        assert_eq!(change.resulting_max_length(Some(40)), Some(80));

        let clear: UpdateField = serde_json::from_value(json!({ "max_length": null })).unwrap();
        assert_eq!(clear.max_length, Some(None));
        assert_eq!(clear.resulting_max_length(Some(40)), None);
    }

    #[test]
    fn reorder_accepts_a_permutation() {
        let ids: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        let reversed: Vec<Uuid> = ids.iter().rev().cloned().collect();
        assert!(check_reorder(&ids, &reversed).is_ok());
    }

    #[test]
    fn reorder_rejects_missing_duplicate_and_foreign_ids() {
        let ids: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();

        assert!(check_reorder(&ids, &ids[..2]).is_err());
        assert!(check_reorder(&ids, &[ids[0], ids[0], ids[1], ids[2]]).is_err());

        let err = check_reorder(&ids, &[ids[0], ids[1], ids[2], Uuid::new_v4()]).unwrap_err();
        match err {
            ServiceError::Invalid(errors) => assert_eq!(errors.len(), 1),
            other => panic!("expected Invalid, got {:?}", other),
        }
    }

    mod db {
        use sqlx::PgPool;

        use super::super::*;
        use crate::testing::fixtures;

        fn extra(name: &str, display_order: Option<i32>) -> CreateField {
            CreateField {
                name: name.into(),
                label: name.into(),
                field_type: FieldType::Text,
                is_required: false,
                max_length: None,
                options: vec![],
                display_order,
            }
        }

        #[sqlx::test(migrations = "./migrations/tenant")]
        async fn reorder_renumbers_from_one(pool: PgPool) {
            let ws = fixtures::workspace(&pool).await;
            let schemas = PgSchemaService::new(pool.clone());

            let reversed: Vec<Uuid> = ws.fields.iter().rev().map(|f| f.id).collect();
            let fields = schemas
                .reorder_fields(&ws.admin, ws.schema_id, reversed.clone())
                .await
                .unwrap()
                .into_inner();

            let ids: Vec<_> = fields.iter().map(|f| f.id).collect();
            let orders: Vec<_> = fields.iter().map(|f| f.display_order).collect();
            assert_eq!(ids, reversed);
            assert_eq!(orders, vec![1, 2, 3]);
        }

        #[sqlx::test(migrations = "./migrations/tenant")]
        async fn taken_display_order_is_a_conflict(pool: PgPool) {
            let ws = fixtures::workspace(&pool).await;
            let schemas = PgSchemaService::new(pool.clone());

            let err = schemas
                .add_field(&ws.admin, ws.schema_id, extra("vendor", Some(2)))
                .await
                .unwrap_err();
            assert!(matches!(err, ServiceError::Conflict(_)));

            let appended = schemas
                .add_field(&ws.admin, ws.schema_id, extra("vendor", None))
                .await
                .unwrap()
                .into_inner();
            assert_eq!(appended.display_order, 4);
        }

        #[sqlx::test(migrations = "./migrations/tenant")]
        async fn duplicate_field_name_is_a_conflict(pool: PgPool) {
            let ws = fixtures::workspace(&pool).await;

            let err = PgSchemaService::new(pool.clone())
                .add_field(&ws.admin, ws.schema_id, extra("notes", None))
                .await
                .unwrap_err();
            assert!(matches!(err, ServiceError::Conflict(_)));
        }

        #[sqlx::test(migrations = "./migrations/tenant")]
        async fn null_max_length_clears_the_stored_limit(pool: PgPool) {
            let ws = fixtures::workspace(&pool).await;
            let schemas = PgSchemaService::new(pool.clone());
            let notes = &ws.fields[2];

            let limited: UpdateField = serde_json::from_value(serde_json::json!({ "max_length": 200 })).unwrap();
            let field = schemas
                .update_field(&ws.admin, ws.schema_id, notes.id, limited)
                .await
                .unwrap()
                .into_inner();
            assert_eq!(field.max_length, Some(200));

            let relabel: UpdateField = serde_json::from_value(serde_json::json!({ "label": "Remarks" })).unwrap();
            let field = schemas
                .update_field(&ws.admin, ws.schema_id, notes.id, relabel)
                .await
                .unwrap()
                .into_inner();
            assert_eq!(field.max_length, Some(200));

            let cleared: UpdateField = serde_json::from_value(serde_json::json!({ "max_length": null })).unwrap();
            let field = schemas
                .update_field(&ws.admin, ws.schema_id, notes.id, cleared)
                .await
                .unwrap()
                .into_inner();
            assert_eq!(field.max_length, None);
        }
    }
}
