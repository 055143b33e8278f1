use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use super::audit;
use super::order::load_order;
use crate::auth::Permission;
use crate::database::models::audit_log::AuditAction;
use crate::database::models::document::Document;
use crate::middleware::ValidatedUser;
use crate::result::{created, ok, ServiceError, ServiceResult, Validator};

const DOCUMENT_COLUMNS: &str =
    "id, order_id, file_name, content_type, storage_uri, size_bytes, page_count, uploaded_by, is_active, created_at";

/// Metadata of a document already stored elsewhere
#[derive(Debug, Clone, Deserialize)]
pub struct CreateDocument {
    pub file_name: String,
    pub content_type: String,
    pub storage_uri: String,
    pub size_bytes: i64,
    pub page_count: Option<i32>,
}

#[async_trait]
pub trait DocumentService: Send + Sync {
    async fn list(&self, actor: &ValidatedUser, order_id: Uuid) -> ServiceResult<Vec<Document>>;

    async fn add(&self, actor: &ValidatedUser, order_id: Uuid, input: CreateDocument) -> ServiceResult<Document>;

    async fn remove(&self, actor: &ValidatedUser, id: Uuid) -> ServiceResult<Document>;
}

pub struct PgDocumentService {
    pool: PgPool,
}

impl PgDocumentService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

pub fn validate_document(input: &CreateDocument) -> Result<(), ServiceError> {
    Validator::new()
        .required("file_name", &input.file_name)
        .max_len("file_name", &input.file_name, 255)
        .required("content_type", &input.content_type)
        .check(input.content_type.contains('/'), "content_type", "Must be a MIME type")
        .required("storage_uri", &input.storage_uri)
        .check(input.size_bytes >= 0, "size_bytes", "Cannot be negative")
        .check(input.page_count.map_or(true, |p| p >= 0), "page_count", "Cannot be negative")
        .finish()
}

#[async_trait]
impl DocumentService for PgDocumentService {
    async fn list(&self, actor: &ValidatedUser, order_id: Uuid) -> ServiceResult<Vec<Document>> {
        actor.require(Permission::OrdersRead)?;

        let mut conn = self.pool.acquire().await?;
        load_order(&mut conn, order_id, false).await?;

        let documents = sqlx::query_as::<_, Document>(&format!(
            "SELECT {} FROM documents WHERE order_id = $1 AND is_active ORDER BY created_at",
            DOCUMENT_COLUMNS
        ))
        .bind(order_id)
        .fetch_all(&mut *conn)
        .await?;

        ok(documents)
    }

    async fn add(&self, actor: &ValidatedUser, order_id: Uuid, input: CreateDocument) -> ServiceResult<Document> {
        actor.require(Permission::DocumentsManage)?;
        validate_document(&input)?;

        let mut tx = self.pool.begin().await?;
        let order = load_order(&mut tx, order_id, false).await?;

        if order.status.is_final() {
            return Err(ServiceError::Conflict(format!(
                "Documents cannot be added to an order that is {}",
                order.status.as_str()
            )));
        }

        let document = sqlx::query_as::<_, Document>(&format!(
            "INSERT INTO documents (order_id, file_name, content_type, storage_uri, size_bytes, page_count, uploaded_by)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {}",
            DOCUMENT_COLUMNS
        ))
        .bind(order_id)
        .bind(input.file_name.trim())
        .bind(input.content_type.trim())
        .bind(input.storage_uri.trim())
        .bind(input.size_bytes)
        .bind(input.page_count)
        .bind(actor.id)
        .fetch_one(&mut *tx)
        .await?;

        audit::record(
            &mut tx,
            actor,
            "document",
            document.id,
            AuditAction::Create,
            json!({ "order_id": order_id, "file_name": document.file_name }),
        )
        .await?;
        tx.commit().await?;

        created(document)
    }

    async fn remove(&self, actor: &ValidatedUser, id: Uuid) -> ServiceResult<Document> {
        actor.require(Permission::DocumentsManage)?;

        let mut tx = self.pool.begin().await?;

        let document = sqlx::query_as::<_, Document>(&format!(
            "UPDATE documents SET is_active = false WHERE id = $1 AND is_active RETURNING {}",
            DOCUMENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ServiceError::not_found("Document", id))?;

        audit::record(
            &mut tx,
            actor,
            "document",
            id,
            AuditAction::Deactivate,
            json!({ "order_id": document.order_id, "file_name": document.file_name }),
        )
        .await?;
        tx.commit().await?;

        ok(document)
    }
}
