use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Metadata of a source document attached to an order. The bytes live in external storage.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Document {
    pub id: Uuid,
    pub order_id: Uuid,
    pub file_name: String,
    pub content_type: String,
    pub storage_uri: String,
    pub size_bytes: i64,
    pub page_count: Option<i32>,
    pub uploaded_by: Uuid,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}
