//! In-memory doubles used by unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use crate::auth::{generate_jwt, Claims};
use crate::database::models::tenant::Tenant;
use crate::tenancy::TenantStore;

/// Tenant registry kept in a vector, with the same lookup rules as the Postgres store
#[derive(Default)]
pub struct InMemoryTenantStore {
    tenants: Mutex<Vec<Tenant>>,
    id_lookups: AtomicUsize,
    reject_writes: bool,
}

impl InMemoryTenantStore {
    pub fn with(tenants: Vec<Tenant>) -> Self {
        Self {
            tenants: Mutex::new(tenants),
            id_lookups: AtomicUsize::new(0),
            reject_writes: false,
        }
    }

    /// Store whose inserts and updates all fail, like a registry that lost its connection
    pub fn rejecting_writes() -> Self {
        Self {
            reject_writes: true,
            ..Self::default()
        }
    }

    /// Number of times the id fallback ran
    pub fn id_lookups(&self) -> usize {
        self.id_lookups.load(Ordering::SeqCst)
    }

    fn set_active(&self, id: Uuid, active: bool) -> bool {
        let mut tenants = self.tenants.lock().unwrap();
        match tenants.iter_mut().find(|t| t.id == id) {
            Some(tenant) => {
                tenant.is_active = active;
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl TenantStore for InMemoryTenantStore {
    async fn try_get_by_identifier(&self, identifier: &str) -> Option<Tenant> {
        let tenants = self.tenants.lock().unwrap();
        tenants
            .iter()
            .find(|t| t.identifier.eq_ignore_ascii_case(identifier))
            .cloned()
    }

    async fn try_get_by_id(&self, id: &str) -> Option<Tenant> {
        self.id_lookups.fetch_add(1, Ordering::SeqCst);
        let id = Uuid::parse_str(id).ok()?;
        let tenants = self.tenants.lock().unwrap();
        tenants.iter().find(|t| t.id == id).cloned()
    }

    async fn get_all(&self) -> Vec<Tenant> {
        self.tenants.lock().unwrap().clone()
    }

    async fn try_add(&self, tenant: &Tenant) -> bool {
        if self.reject_writes {
            return false;
        }
        let mut tenants = self.tenants.lock().unwrap();
        if tenants
            .iter()
            .any(|t| t.id == tenant.id || t.identifier.eq_ignore_ascii_case(&tenant.identifier))
        {
            return false;
        }
        tenants.push(tenant.clone());
        true
    }

    async fn try_update(&self, tenant: &Tenant) -> bool {
        if self.reject_writes {
            return false;
        }
        let mut tenants = self.tenants.lock().unwrap();
        match tenants.iter_mut().find(|t| t.id == tenant.id) {
            Some(existing) => {
                *existing = tenant.clone();
                true
            }
            None => false,
        }
    }

    async fn try_remove(&self, id: Uuid) -> bool {
        self.set_active(id, false)
    }

    async fn try_restore(&self, id: Uuid) -> bool {
        self.set_active(id, true)
    }
}

/// Signed token for `sub` with the configured development secret
pub fn token_for(sub: &str, tenant: Option<&str>, access: Option<&str>) -> String {
    let claims = Claims::new(sub, tenant.map(str::to_string), access.map(str::to_string));
    generate_jwt(&claims).unwrap()
}

/// Rows seeded through the services into a database migrated with `migrations/tenant`
pub mod fixtures {
    use sqlx::PgPool;
    use uuid::Uuid;

    use crate::database::models::schema::{FieldType, SchemaField};
    use crate::middleware::validate_user::load_user;
    use crate::middleware::ValidatedUser;
    use crate::services::batch::CreateBatch;
    use crate::services::client::CreateClient;
    use crate::services::project::CreateProject;
    use crate::services::schema::{CreateField, CreateSchema};
    use crate::services::{
        BatchService, ClientService, PgBatchService, PgClientService, PgProjectService, PgSchemaService,
        ProjectService, SchemaService,
    };

    /// Active user holding `roles`, loaded the same way the request pipeline loads it
    pub async fn user(pool: &PgPool, email: &str, roles: &[&str]) -> ValidatedUser {
        let id: Uuid = sqlx::query_scalar("INSERT INTO users (email, display_name) VALUES ($1, $1) RETURNING id")
            .bind(email)
            .fetch_one(pool)
            .await
            .unwrap();

        for role in roles {
            sqlx::query("INSERT INTO user_roles (user_id, role_id) SELECT $1, id FROM roles WHERE code = $2")
                .bind(id)
                .bind(role)
                .execute(pool)
                .await
                .unwrap();
        }

        load_user(pool, email).await.unwrap().expect("seeded user is active")
    }

    pub struct Workspace {
        pub admin: ValidatedUser,
        pub project_id: Uuid,
        pub schema_id: Uuid,
        pub batch_id: Uuid,
        /// invoice_number (required text), total (required decimal), notes (optional text)
        pub fields: Vec<SchemaField>,
    }

    fn field(name: &str, field_type: FieldType, is_required: bool) -> CreateField {
        CreateField {
            name: name.into(),
            label: name.replace('_', " "),
            field_type,
            is_required,
            max_length: None,
            options: vec![],
            display_order: None,
        }
    }

    /// Client, project, invoice schema with three fields and an open batch
    pub async fn workspace(pool: &PgPool) -> Workspace {
        let admin = user(pool, "admin@acme.test", &["admin"]).await;

        let client = PgClientService::new(pool.clone())
            .create(
                &admin,
                CreateClient {
                    code: "acme".into(),
                    name: "Acme Corporation".into(),
                    contact_email: None,
                },
            )
            .await
            .unwrap()
            .into_inner();

        let project = PgProjectService::new(pool.clone())
            .create(
                &admin,
                CreateProject {
                    client_id: client.id,
                    code: "invoices".into(),
                    name: "Invoice capture".into(),
                    description: None,
                },
            )
            .await
            .unwrap()
            .into_inner();

        let schemas = PgSchemaService::new(pool.clone());
        let schema = schemas
            .create(
                &admin,
                CreateSchema {
                    project_id: project.id,
                    name: "Invoice".into(),
                    description: None,
                },
            )
            .await
            .unwrap()
            .into_inner();

        let mut fields = Vec::new();
        for input in [
            field("invoice_number", FieldType::Text, true),
            field("total", FieldType::Decimal, true),
            field("notes", FieldType::Text, false),
        ] {
            fields.push(schemas.add_field(&admin, schema.id, input).await.unwrap().into_inner());
        }

        let batch = PgBatchService::new(pool.clone())
            .create(
                &admin,
                CreateBatch {
                    project_id: project.id,
                    code: "jan-2024".into(),
                    name: "January 2024".into(),
                    due_date: None,
                },
            )
            .await
            .unwrap()
            .into_inner();

        Workspace {
            admin,
            project_id: project.id,
            schema_id: schema.id,
            batch_id: batch.batch.id,
            fields,
        }
    }
}
