use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Tenant registry row from the IAM database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Tenant {
    pub id: Uuid,
    pub identifier: String,
    pub name: String,
    pub database_name: Option<String>,
    #[serde(skip_serializing, default)]
    pub connection_string: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Where a tenant's database lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionTarget<'a> {
    ConnectionString(&'a str),
    /// Database on the shared server named by DATABASE_URL
    Database(&'a str),
}

impl Tenant {
    pub fn new(identifier: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            identifier: identifier.into(),
            name: name.into(),
            database_name: None,
            connection_string: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Explicit connection string first, then database name. Blank values count as missing.
    pub fn connection_target(&self) -> Option<ConnectionTarget<'_>> {
        non_blank(&self.connection_string)
            .map(ConnectionTarget::ConnectionString)
            .or_else(|| non_blank(&self.database_name).map(ConnectionTarget::Database))
    }

    pub fn has_connection_string(&self) -> bool {
        self.connection_target().is_some()
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}
