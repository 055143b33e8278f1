//! Tenant administration for root users: registry CRUD, database provisioning,
//! health checks and migrations.

use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::config::config;
use crate::database::models::tenant::Tenant;
use crate::database::DatabaseManager;
use crate::result::{created, ok, ServiceError, ServiceResult, Validator};
use crate::tenancy::{migrate_one, migrate_tenants, MigrationReport, TenantMigrate, TenantMigrationOutcome, TenantStore};

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTenant {
    pub identifier: String,
    pub name: String,
    pub database_name: Option<String>,
    pub connection_string: Option<String>,
}

/// Partial update; absent fields keep their value
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateTenant {
    pub name: Option<String>,
    pub database_name: Option<String>,
    pub connection_string: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TenantListQuery {
    #[serde(default)]
    pub include_inactive: bool,
    #[serde(default)]
    pub include_health: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TenantHealth {
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TenantEntry {
    #[serde(flatten)]
    pub tenant: Tenant,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health: Option<TenantHealth>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProvisionedTenant {
    #[serde(flatten)]
    pub tenant: Tenant,
    pub migration: TenantMigrationOutcome,
}

pub struct TenantService {
    store: Arc<dyn TenantStore>,
    migrate: Arc<dyn TenantMigrate>,
}

/// Lowercase letter first, then lowercase letters, digits, hyphens or underscores
pub fn validate_identifier(identifier: &str) -> Result<(), ServiceError> {
    let mut chars = identifier.chars();
    let valid_start = chars.next().is_some_and(|c| c.is_ascii_lowercase());
    let valid_rest = chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_');

    Validator::new()
        .required("identifier", identifier)
        .check(identifier.len() >= 2, "identifier", "Must be at least 2 characters")
        .max_len("identifier", identifier, 63)
        .check(
            valid_start && valid_rest,
            "identifier",
            "Must start with a lowercase letter and contain only lowercase letters, digits, hyphens and underscores",
        )
        .finish()
}

/// Explicit tenant database names must look like the provisioned ones
pub fn validate_database_name(database_name: Option<&str>) -> Result<(), ServiceError> {
    match database_name {
        Some(name) if !DatabaseManager::is_valid_tenant_db_name(name) => Err(ServiceError::invalid(
            "database_name",
            "Must start with 'tenant_' followed by letters, digits or underscores",
        )),
        _ => Ok(()),
    }
}

fn blank_to_none(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

async fn check_health(tenant: &Tenant) -> TenantHealth {
    match DatabaseManager::tenant_health_check(tenant).await {
        Ok(()) => TenantHealth { healthy: true, error: None },
        Err(e) => {
            warn!("Health check failed for tenant '{}': {}", tenant.identifier, e);
            TenantHealth {
                healthy: false,
                error: Some(e.to_string()),
            }
        }
    }
}

impl TenantService {
    pub fn new(store: Arc<dyn TenantStore>, migrate: Arc<dyn TenantMigrate>) -> Self {
        Self { store, migrate }
    }

    async fn find(&self, key: &str) -> Result<Tenant, ServiceError> {
        self.store
            .try_get(key)
            .await
            .ok_or_else(|| ServiceError::not_found("Tenant", key))
    }

    pub async fn list(&self, query: TenantListQuery) -> ServiceResult<Vec<TenantEntry>> {
        let tenants: Vec<Tenant> = self
            .store
            .get_all()
            .await
            .into_iter()
            .filter(|t| query.include_inactive || t.is_active)
            .collect();

        let health: Vec<Option<TenantHealth>> = if query.include_health {
            join_all(tenants.iter().map(|t| async move { Some(check_health(t).await) })).await
        } else {
            vec![None; tenants.len()]
        };

        ok(tenants
            .into_iter()
            .zip(health)
            .map(|(tenant, health)| TenantEntry { tenant, health })
            .collect())
    }

    pub async fn get(&self, key: &str) -> ServiceResult<Tenant> {
        ok(self.find(key).await?)
    }

    /// Register a tenant, provisioning its database when it has no connection target,
    /// then bring its schema up to date.
    pub async fn create(&self, input: CreateTenant) -> ServiceResult<ProvisionedTenant> {
        let identifier = input.identifier.trim().to_lowercase();
        validate_identifier(&identifier)?;
        Validator::new()
            .required("name", &input.name)
            .max_len("name", &input.name, 200)
            .finish()?;

        if self.store.try_get_by_identifier(&identifier).await.is_some() {
            return Err(ServiceError::Conflict(format!("Tenant '{}' already exists", identifier)));
        }

        let mut tenant = Tenant::new(identifier, input.name.trim());
        tenant.database_name = blank_to_none(input.database_name);
        tenant.connection_string = blank_to_none(input.connection_string);
        validate_database_name(tenant.database_name.as_deref())?;

        if tenant.connection_target().is_none() {
            if !config().tenancy.provision_databases {
                return Err(ServiceError::invalid(
                    "database_name",
                    "A database name or connection string is required when provisioning is disabled",
                ));
            }
            tenant.database_name = Some(DatabaseManager::tenant_database_name(&tenant.identifier));
        }

        // A database is only ever created for a tenant that is already registered
        if !self.store.try_add(&tenant).await {
            return Err(ServiceError::Error(format!("Failed to register tenant '{}'", tenant.identifier)));
        }
        info!("Registered tenant '{}' ({})", tenant.identifier, tenant.id);

        if tenant.connection_string.is_none() && config().tenancy.provision_databases {
            if let Some(database_name) = tenant.database_name.as_deref() {
                if let Err(e) = DatabaseManager::create_database(database_name).await {
                    error!(
                        "Provisioning database {} for tenant '{}' failed, deactivating it: {}",
                        database_name, tenant.identifier, e
                    );
                    self.store.try_remove(tenant.id).await;
                    return Err(e.into());
                }
            }
        }

        let migration = migrate_one(&tenant, self.migrate.as_ref()).await;
        created(ProvisionedTenant { tenant, migration })
    }

    pub async fn update(&self, key: &str, input: UpdateTenant) -> ServiceResult<Tenant> {
        let mut tenant = self.find(key).await?;

        if let Some(name) = &input.name {
            Validator::new().required("name", name).max_len("name", name, 200).finish()?;
            tenant.name = name.trim().to_string();
        }
        if input.database_name.is_some() {
            tenant.database_name = blank_to_none(input.database_name);
            validate_database_name(tenant.database_name.as_deref())?;
        }
        if input.connection_string.is_some() {
            tenant.connection_string = blank_to_none(input.connection_string);
        }
        tenant.updated_at = Utc::now();

        if !self.store.try_update(&tenant).await {
            return Err(ServiceError::Error(format!("Failed to update tenant '{}'", tenant.identifier)));
        }
        DatabaseManager::evict_tenant(tenant.id).await;
        ok(tenant)
    }

    pub async fn remove(&self, key: &str) -> ServiceResult<Tenant> {
        let tenant = self.find(key).await?;
        if !tenant.is_active {
            return Err(ServiceError::Conflict(format!("Tenant '{}' is already inactive", tenant.identifier)));
        }
        if !self.store.try_remove(tenant.id).await {
            return Err(ServiceError::Error(format!("Failed to deactivate tenant '{}'", tenant.identifier)));
        }
        DatabaseManager::evict_tenant(tenant.id).await;
        info!("Deactivated tenant '{}'", tenant.identifier);
        ok(self.find(&tenant.id.to_string()).await?)
    }

    pub async fn restore(&self, key: &str) -> ServiceResult<Tenant> {
        let tenant = self.find(key).await?;
        if tenant.is_active {
            return Err(ServiceError::Conflict(format!("Tenant '{}' is already active", tenant.identifier)));
        }
        if !self.store.try_restore(tenant.id).await {
            return Err(ServiceError::Error(format!("Failed to restore tenant '{}'", tenant.identifier)));
        }
        DatabaseManager::evict_tenant(tenant.id).await;
        info!("Restored tenant '{}'", tenant.identifier);
        ok(self.find(&tenant.id.to_string()).await?)
    }

    pub async fn health(&self, key: &str) -> ServiceResult<TenantEntry> {
        let tenant = self.find(key).await?;
        let health = check_health(&tenant).await;
        ok(TenantEntry {
            tenant,
            health: Some(health),
        })
    }

    pub async fn migrate(&self, key: &str) -> ServiceResult<TenantMigrationOutcome> {
        let tenant = self.find(key).await?;
        ok(migrate_one(&tenant, self.migrate.as_ref()).await)
    }

    pub async fn migrate_all(&self) -> ServiceResult<MigrationReport> {
        let tenants = self.store.get_all().await;
        ok(migrate_tenants(&tenants, self.migrate.as_ref()).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tenancy::{MigrationError, MigrationStatus};
    use crate::testing::InMemoryTenantStore;
    use async_trait::async_trait;

    /// Reports one pending version for every tenant and applies it.
    struct OneStepMigrate;

    #[async_trait]
    impl TenantMigrate for OneStepMigrate {
        async fn pending(&self, _tenant: &Tenant) -> Result<Vec<i64>, MigrationError> {
            Ok(vec![1])
        }

        async fn apply(&self, _tenant: &Tenant) -> Result<Vec<i64>, MigrationError> {
            Ok(vec![1])
        }
    }

    fn tenant(identifier: &str, active: bool) -> Tenant {
        let mut tenant = Tenant::new(identifier, identifier.to_uppercase());
        tenant.connection_string = Some(format!("postgres://db/{}", identifier));
        tenant.is_active = active;
        tenant
    }

    fn service(tenants: Vec<Tenant>) -> TenantService {
        TenantService::new(Arc::new(InMemoryTenantStore::with(tenants)), Arc::new(OneStepMigrate))
    }

    #[test]
    fn identifier_rules() {
        assert!(validate_identifier("acme").is_ok());
        assert!(validate_identifier("acme-eu_2").is_ok());
        assert!(validate_identifier("a").is_err());
        assert!(validate_identifier("2acme").is_err());
        assert!(validate_identifier("Acme").is_err());
        assert!(validate_identifier("acme corp").is_err());
    }

    #[tokio::test]
    async fn create_registers_and_migrates() {
        let service = service(vec![]);

        let created = service
            .create(CreateTenant {
                identifier: " Globex ".into(),
                name: "Globex".into(),
                database_name: None,
                connection_string: Some("postgres://db/globex".into()),
            })
            .await
            .unwrap()
            .into_inner();

        assert_eq!(created.tenant.identifier, "globex");
        assert_eq!(created.migration.status, MigrationStatus::Migrated);
        assert!(service.get("globex").await.is_ok());
    }

    #[tokio::test]
    async fn duplicate_identifier_is_a_conflict() {
        let service = service(vec![tenant("acme", true)]);

        let err = service
            .create(CreateTenant {
                identifier: "acme".into(),
                name: "Acme again".into(),
                database_name: None,
                connection_string: Some("postgres://db/acme2".into()),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[tokio::test]
    async fn list_hides_inactive_unless_asked() {
        let service = service(vec![tenant("acme", true), tenant("old", false)]);

        let active = service.list(TenantListQuery::default()).await.unwrap().into_inner();
        assert_eq!(active.len(), 1);
        assert!(active[0].health.is_none());

        let all = service
            .list(TenantListQuery {
                include_inactive: true,
                include_health: false,
            })
            .await
            .unwrap()
            .into_inner();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn remove_then_restore() {
        let service = service(vec![tenant("acme", true)]);

        let removed = service.remove("acme").await.unwrap().into_inner();
        assert!(!removed.is_active);
        assert!(matches!(service.remove("acme").await.unwrap_err(), ServiceError::Conflict(_)));

        let restored = service.restore("acme").await.unwrap().into_inner();
        assert!(restored.is_active);
    }

    #[tokio::test]
    async fn update_changes_only_given_fields() {
        let service = service(vec![tenant("acme", true)]);

        let updated = service
            .update(
                "acme",
                UpdateTenant {
                    name: Some("Acme Corporation".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .into_inner();

        assert_eq!(updated.name, "Acme Corporation");
        assert_eq!(updated.connection_string.as_deref(), Some("postgres://db/acme"));
    }

    #[tokio::test]
    async fn registry_and_admin_databases_are_refused() {
        let service = service(vec![tenant("acme", true)]);

        for reserved in ["docflow_iam", "postgres", "tenant-acme"] {
            let err = service
                .create(CreateTenant {
                    identifier: "globex".into(),
                    name: "Globex".into(),
                    database_name: Some(reserved.into()),
                    connection_string: None,
                })
                .await
                .unwrap_err();
            assert!(matches!(err, ServiceError::Invalid(_)), "{} was accepted", reserved);

            let err = service
                .update(
                    "acme",
                    UpdateTenant {
                        database_name: Some(reserved.into()),
                        ..Default::default()
                    },
                )
                .await
                .unwrap_err();
            assert!(matches!(err, ServiceError::Invalid(_)), "{} was accepted on update", reserved);
        }
        assert!(service.get("globex").await.is_err());
    }

    #[tokio::test]
    async fn failed_registration_provisions_nothing() {
        let service = TenantService::new(Arc::new(InMemoryTenantStore::rejecting_writes()), Arc::new(OneStepMigrate));

        let err = service
            .create(CreateTenant {
                identifier: "acme".into(),
                name: "Acme".into(),
                database_name: Some("tenant_acme".into()),
                connection_string: None,
            })
            .await
            .unwrap_err();

        match err {
            ServiceError::Error(message) => assert!(message.contains("Failed to register"), "{}", message),
            other => panic!("expected a registration error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn changing_the_connection_drops_the_cached_pool() {
        let acme = tenant("acme", true);
        let old_key = DatabaseManager::cache_lazy_tenant_pool(&acme).await.unwrap();
        let service = service(vec![acme]);

        let updated = service
            .update(
                "acme",
                UpdateTenant {
                    connection_string: Some("postgres://db/acme_moved".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .into_inner();

        assert_eq!(updated.connection_string.as_deref(), Some("postgres://db/acme_moved"));
        assert!(!DatabaseManager::is_cached(&old_key).await);
    }

    #[tokio::test]
    async fn deactivation_drops_the_cached_pool() {
        let acme = tenant("acme", true);
        let key = DatabaseManager::cache_lazy_tenant_pool(&acme).await.unwrap();
        let service = service(vec![acme]);

        service.remove("acme").await.unwrap();
        assert!(!DatabaseManager::is_cached(&key).await);
    }

    #[tokio::test]
    async fn unknown_tenant_is_not_found() {
        let service = service(vec![]);
        assert!(matches!(service.get("nobody").await.unwrap_err(), ServiceError::NotFound(_)));
        assert!(matches!(service.migrate("nobody").await.unwrap_err(), ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn migrate_all_covers_active_tenants() {
        let service = service(vec![tenant("acme", true), tenant("globex", true), tenant("old", false)]);

        let report = service.migrate_all().await.unwrap().into_inner();
        assert_eq!(report.total, 2);
        assert_eq!(report.migrated, 2);
        assert!(report.is_success());
    }
}
