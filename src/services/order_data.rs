//! Field values of an order, entered by hand or imported from extraction output.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::audit;
use super::order::load_order;
use super::schema::active_fields;
use crate::auth::Permission;
use crate::database::models::audit_log::AuditAction;
use crate::database::models::order::{Order, OrderFieldValue};
use crate::database::models::schema::SchemaField;
use crate::middleware::ValidatedUser;
use crate::result::{ok, ServiceError, ServiceResult, ValidationError};

#[derive(Debug, Clone, Deserialize)]
pub struct OrderValues {
    pub values: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtractedImport {
    /// Field names written by the import
    pub applied: Vec<String>,
    /// Source keys with no active mapping
    pub ignored: Vec<String>,
    pub values: Vec<OrderFieldValue>,
}

/// A validated change to one field; `None` clears the stored value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldChange {
    pub schema_field_id: Uuid,
    pub field_name: String,
    pub value: Option<String>,
}

#[async_trait]
pub trait OrderDataService: Send + Sync {
    async fn get(&self, actor: &ValidatedUser, order_id: Uuid) -> ServiceResult<Vec<OrderFieldValue>>;

    async fn update(
        &self,
        actor: &ValidatedUser,
        order_id: Uuid,
        input: OrderValues,
    ) -> ServiceResult<Vec<OrderFieldValue>>;

    async fn import_extracted(
        &self,
        actor: &ValidatedUser,
        order_id: Uuid,
        input: OrderValues,
    ) -> ServiceResult<ExtractedImport>;
}

pub struct PgOrderDataService {
    pool: PgPool,
}

impl PgOrderDataService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn raw_text(value: &Value) -> Result<Option<String>, String> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::Bool(b) => Ok(Some(b.to_string())),
        Value::Array(_) | Value::Object(_) => Err("Value must be a string, number, boolean or null".to_string()),
    }
}

/// Check every submitted value against the schema; any error rejects the whole set
pub fn validate_values(
    fields: &[SchemaField],
    values: &BTreeMap<String, Value>,
) -> Result<Vec<FieldChange>, ServiceError> {
    let mut changes = Vec::with_capacity(values.len());
    let mut errors = Vec::new();

    for (name, value) in values {
        let Some(field) = fields.iter().find(|f| f.is_active && f.name == *name) else {
            errors.push(ValidationError::new(name.as_str(), "Unknown field"));
            continue;
        };

        let normalized = raw_text(value).and_then(|raw| match raw {
            None => Ok(None),
            Some(raw) if raw.trim().is_empty() => Ok(None),
            Some(raw) => field.normalize_value(&raw).map(Some),
        });

        match normalized {
            Ok(value) => changes.push(FieldChange {
                schema_field_id: field.id,
                field_name: field.name.clone(),
                value,
            }),
            Err(message) => errors.push(ValidationError::new(name.as_str(), message)),
        }
    }

    if errors.is_empty() {
        Ok(changes)
    } else {
        Err(ServiceError::Invalid(errors))
    }
}

/// Translate extraction keys to field names through the active mappings.
/// Returns the field values and the keys nothing maps.
pub fn map_extracted(
    fields: &[SchemaField],
    mappings: &[(String, Uuid)],
    values: &BTreeMap<String, Value>,
) -> Result<(BTreeMap<String, Value>, Vec<String>), ServiceError> {
    let mut mapped = BTreeMap::new();
    let mut ignored = Vec::new();
    let mut errors = Vec::new();

    for (key, value) in values {
        let field = mappings
            .iter()
            .find(|(source_key, _)| source_key == key)
            .and_then(|(_, field_id)| fields.iter().find(|f| f.id == *field_id && f.is_active));

        match field {
            Some(field) if mapped.contains_key(&field.name) => errors.push(ValidationError::new(
                key.as_str(),
                format!("Field '{}' is mapped from more than one key", field.name),
            )),
            Some(field) => {
                mapped.insert(field.name.clone(), value.clone());
            }
            None => ignored.push(key.clone()),
        }
    }

    if errors.is_empty() {
        Ok((mapped, ignored))
    } else {
        Err(ServiceError::Invalid(errors))
    }
}

/// Current values of every active field of the order's schema, in display order
pub(crate) async fn load_values(conn: &mut PgConnection, order: &Order) -> Result<Vec<OrderFieldValue>, sqlx::Error> {
    sqlx::query_as::<_, OrderFieldValue>(
        "SELECT f.id AS schema_field_id, f.name AS field_name, f.label, f.field_type, f.is_required,
                f.display_order, d.value, d.updated_by, d.updated_at
         FROM schema_fields f
         LEFT JOIN order_data d ON d.schema_field_id = f.id AND d.order_id = $1
         WHERE f.schema_id = $2 AND f.is_active
         ORDER BY f.display_order",
    )
    .bind(order.id)
    .bind(order.schema_id)
    .fetch_all(&mut *conn)
    .await
}

async fn apply_changes(
    conn: &mut PgConnection,
    order_id: Uuid,
    actor: &ValidatedUser,
    changes: &[FieldChange],
) -> Result<(), sqlx::Error> {
    for change in changes {
        match &change.value {
            Some(value) => {
                sqlx::query(
                    "INSERT INTO order_data (order_id, schema_field_id, value, updated_by)
                     VALUES ($1, $2, $3, $4)
                     ON CONFLICT (order_id, schema_field_id)
                     DO UPDATE SET value = EXCLUDED.value, updated_by = EXCLUDED.updated_by, updated_at = now()",
                )
                .bind(order_id)
                .bind(change.schema_field_id)
                .bind(value)
                .bind(actor.id)
                .execute(&mut *conn)
                .await?;
            }
            None => {
                sqlx::query("DELETE FROM order_data WHERE order_id = $1 AND schema_field_id = $2")
                    .bind(order_id)
                    .bind(change.schema_field_id)
                    .execute(&mut *conn)
                    .await?;
            }
        }
    }

    sqlx::query("UPDATE orders SET updated_at = now() WHERE id = $1")
        .bind(order_id)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

fn ensure_editable(order: &Order) -> Result<(), ServiceError> {
    if order.status.is_editable() {
        Ok(())
    } else {
        Err(ServiceError::Conflict(format!(
            "Order data cannot be changed while the order is {}",
            order.status.as_str()
        )))
    }
}

fn change_summary(changes: &[FieldChange]) -> Value {
    let values: serde_json::Map<String, Value> = changes
        .iter()
        .map(|c| (c.field_name.clone(), json!(c.value)))
        .collect();
    Value::Object(values)
}

#[async_trait]
impl OrderDataService for PgOrderDataService {
    async fn get(&self, actor: &ValidatedUser, order_id: Uuid) -> ServiceResult<Vec<OrderFieldValue>> {
        actor.require(Permission::OrdersRead)?;

        let mut conn = self.pool.acquire().await?;
        let order = load_order(&mut conn, order_id, false).await?;
        ok(load_values(&mut conn, &order).await?)
    }

    async fn update(
        &self,
        actor: &ValidatedUser,
        order_id: Uuid,
        input: OrderValues,
    ) -> ServiceResult<Vec<OrderFieldValue>> {
        actor.require(Permission::OrdersProcess)?;

        let mut tx = self.pool.begin().await?;
        let order = load_order(&mut tx, order_id, true).await?;
        ensure_editable(&order)?;

        let fields = active_fields(&mut tx, order.schema_id).await?;
        let changes = validate_values(&fields, &input.values)?;

        apply_changes(&mut tx, order_id, actor, &changes).await?;
        audit::record(
            &mut tx,
            actor,
            "order",
            order_id,
            AuditAction::Update,
            json!({ "values": change_summary(&changes) }),
        )
        .await?;

        let values = load_values(&mut tx, &order).await?;
        tx.commit().await?;

        tracing::debug!("Updated {} field(s) on order {}", changes.len(), order_id);
        ok(values)
    }

    async fn import_extracted(
        &self,
        actor: &ValidatedUser,
        order_id: Uuid,
        input: OrderValues,
    ) -> ServiceResult<ExtractedImport> {
        actor.require(Permission::OrdersProcess)?;

        let mut tx = self.pool.begin().await?;
        let order = load_order(&mut tx, order_id, true).await?;
        ensure_editable(&order)?;

        let fields = active_fields(&mut tx, order.schema_id).await?;
        let mappings: Vec<(String, Uuid)> = sqlx::query_as(
            "SELECT m.source_key, m.schema_field_id
             FROM field_mappings m
             JOIN schema_fields f ON f.id = m.schema_field_id
             WHERE f.schema_id = $1 AND f.is_active AND m.is_active",
        )
        .bind(order.schema_id)
        .fetch_all(&mut *tx)
        .await?;

        let (mapped, ignored) = map_extracted(&fields, &mappings, &input.values)?;
        let changes = validate_values(&fields, &mapped)?;

        apply_changes(&mut tx, order_id, actor, &changes).await?;
        audit::record(
            &mut tx,
            actor,
            "order",
            order_id,
            AuditAction::Import,
            json!({ "values": change_summary(&changes), "ignored": ignored }),
        )
        .await?;

        let values = load_values(&mut tx, &order).await?;
        tx.commit().await?;

        if !ignored.is_empty() {
            tracing::info!("Order {}: ignored unmapped extraction keys {:?}", order_id, ignored);
        }

        ok(ExtractedImport {
            applied: changes.into_iter().map(|c| c.field_name).collect(),
            ignored,
            values,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::schema::FieldType;
    use chrono::Utc;

    fn field(name: &str, field_type: FieldType, order: i32) -> SchemaField {
        let now = Utc::now();
        SchemaField {
            id: Uuid::new_v4(),
            schema_id: Uuid::nil(),
            name: name.into(),
            label: name.to_uppercase(),
            field_type,
            is_required: false,
            max_length: None,
            options: vec![],
            display_order: order,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn fields() -> Vec<SchemaField> {
        let mut currency = field("currency", FieldType::Choice, 3);
        currency.options = vec!["EUR".into(), "USD".into()];
        vec![
            field("invoice_date", FieldType::Date, 1),
            field("total", FieldType::Decimal, 2),
            currency,
            field("paid", FieldType::Boolean, 4),
        ]
    }

    fn values(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn valid_values_are_normalized() {
        let changes = validate_values(
            &fields(),
            &values(&[
                ("total", json!(12.50)),
                ("currency", json!("eur")),
                ("paid", json!(true)),
                ("invoice_date", Value::Null),
            ]),
        )
        .unwrap();

        let by_name: BTreeMap<_, _> = changes.iter().map(|c| (c.field_name.as_str(), c.value.clone())).collect();
        assert_eq!(by_name["total"].as_deref(), Some("12.5"));
        assert_eq!(by_name["currency"].as_deref(), Some("EUR"));
        assert_eq!(by_name["paid"].as_deref(), Some("true"));
        assert_eq!(by_name["invoice_date"], None);
    }

    #[test]
    fn one_bad_value_rejects_the_whole_update() {
        let err = validate_values(
            &fields(),
            &values(&[
                ("total", json!("12.5")),
                ("invoice_date", json!("31/12/2024")),
                ("colour", json!("red")),
                ("paid", json!({"nested": true})),
            ]),
        )
        .unwrap_err();

        match err {
            ServiceError::Invalid(errors) => {
                let names: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
                assert_eq!(names, vec!["colour", "invoice_date", "paid"]);
            }
            other => panic!("expected Invalid, got {:?}", other),
        }
    }

    #[test]
    fn blank_strings_clear_the_value() {
        let changes = validate_values(&fields(), &values(&[("total", json!("  "))])).unwrap();
        assert_eq!(changes[0].value, None);
    }

    #[test]
    fn extracted_keys_follow_mappings_and_report_the_rest() {
        let fields = fields();
        let mappings = vec![
            ("InvoiceTotal".to_string(), fields[1].id),
            ("Currency".to_string(), fields[2].id),
        ];

        let (mapped, ignored) = map_extracted(
            &fields,
            &mappings,
            &values(&[
                ("InvoiceTotal", json!("99.90")),
                ("Currency", json!("USD")),
                ("VendorName", json!("Acme")),
            ]),
        )
        .unwrap();

        assert_eq!(mapped.len(), 2);
        assert_eq!(mapped["total"], json!("99.90"));
        assert_eq!(mapped["currency"], json!("USD"));
        assert_eq!(ignored, vec!["VendorName"]);
    }

    #[test]
    fn mappings_to_inactive_fields_are_ignored() {
        let mut fields = fields();
        fields[1].is_active = false;
        let mappings = vec![("InvoiceTotal".to_string(), fields[1].id)];

        let (mapped, ignored) =
            map_extracted(&fields, &mappings, &values(&[("InvoiceTotal", json!("1"))])).unwrap();
        assert!(mapped.is_empty());
        assert_eq!(ignored, vec!["InvoiceTotal"]);
    }

    #[test]
    fn two_keys_for_one_field_are_invalid() {
        let fields = fields();
        let mappings = vec![
            ("Total".to_string(), fields[1].id),
            ("Amount".to_string(), fields[1].id),
        ];

        let result = map_extracted(&fields, &mappings, &values(&[("Total", json!("1")), ("Amount", json!("2"))]));
        assert!(matches!(result, Err(ServiceError::Invalid(_))));
    }
}
