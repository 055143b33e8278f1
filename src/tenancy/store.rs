//! Tenant registry lookups against the IAM database.
//!
//! Every operation swallows storage failures: lookups return `None`, writes
//! return `false`, listings return an empty vector. The failure is logged.

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::database::models::tenant::Tenant;

const TENANT_COLUMNS: &str = "id, identifier, name, database_name, connection_string, is_active, created_at, updated_at";

#[async_trait]
pub trait TenantStore: Send + Sync {
    async fn try_get_by_identifier(&self, identifier: &str) -> Option<Tenant>;

    /// `id` comes straight from a header or path; anything that is not a UUID yields `None`.
    async fn try_get_by_id(&self, id: &str) -> Option<Tenant>;

    async fn get_all(&self) -> Vec<Tenant>;

    async fn try_add(&self, tenant: &Tenant) -> bool;

    async fn try_update(&self, tenant: &Tenant) -> bool;

    /// Soft delete: marks the tenant inactive.
    async fn try_remove(&self, id: Uuid) -> bool;

    async fn try_restore(&self, id: Uuid) -> bool;

    /// Resolve by identifier, falling back to id.
    async fn try_get(&self, key: &str) -> Option<Tenant> {
        let key = key.trim();
        if key.is_empty() {
            debug!("Tenant lookup skipped: empty key");
            return None;
        }

        if let Some(tenant) = self.try_get_by_identifier(key).await {
            debug!("Tenant '{}' resolved by identifier", tenant.identifier);
            return Some(tenant);
        }

        if let Some(tenant) = self.try_get_by_id(key).await {
            debug!("Tenant '{}' resolved by id {}", tenant.identifier, tenant.id);
            return Some(tenant);
        }

        warn!("No tenant matches identifier or id '{}'", key);
        None
    }
}

pub struct PgTenantStore {
    pool: PgPool,
}

impl PgTenantStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TenantStore for PgTenantStore {
    async fn try_get_by_identifier(&self, identifier: &str) -> Option<Tenant> {
        let sql = format!("SELECT {} FROM tenants WHERE lower(identifier) = lower($1)", TENANT_COLUMNS);

        match sqlx::query_as::<_, Tenant>(&sql)
            .bind(identifier)
            .fetch_optional(&self.pool)
            .await
        {
            Ok(tenant) => tenant,
            Err(e) => {
                error!("Failed to look up tenant by identifier '{}': {}", identifier, e);
                None
            }
        }
    }

    async fn try_get_by_id(&self, id: &str) -> Option<Tenant> {
        let Ok(id) = Uuid::parse_str(id) else {
            debug!("Tenant key '{}' is not a UUID, skipping id lookup", id);
            return None;
        };

        let sql = format!("SELECT {} FROM tenants WHERE id = $1", TENANT_COLUMNS);

        match sqlx::query_as::<_, Tenant>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
        {
            Ok(tenant) => tenant,
            Err(e) => {
                error!("Failed to look up tenant by id {}: {}", id, e);
                None
            }
        }
    }

    async fn get_all(&self) -> Vec<Tenant> {
        let sql = format!("SELECT {} FROM tenants ORDER BY identifier", TENANT_COLUMNS);

        match sqlx::query_as::<_, Tenant>(&sql).fetch_all(&self.pool).await {
            Ok(tenants) => tenants,
            Err(e) => {
                error!("Failed to list tenants: {}", e);
                Vec::new()
            }
        }
    }

    async fn try_add(&self, tenant: &Tenant) -> bool {
        let result = sqlx::query(
            "INSERT INTO tenants (id, identifier, name, database_name, connection_string, is_active, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(tenant.id)
        .bind(&tenant.identifier)
        .bind(&tenant.name)
        .bind(&tenant.database_name)
        .bind(&tenant.connection_string)
        .bind(tenant.is_active)
        .bind(tenant.created_at)
        .bind(tenant.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                info!("Registered tenant '{}' ({})", tenant.identifier, tenant.id);
                true
            }
            Err(e) => {
                error!("Failed to register tenant '{}': {}", tenant.identifier, e);
                false
            }
        }
    }

    async fn try_update(&self, tenant: &Tenant) -> bool {
        let result = sqlx::query(
            "UPDATE tenants
             SET identifier = $2, name = $3, database_name = $4, connection_string = $5,
                 is_active = $6, updated_at = now()
             WHERE id = $1",
        )
        .bind(tenant.id)
        .bind(&tenant.identifier)
        .bind(&tenant.name)
        .bind(&tenant.database_name)
        .bind(&tenant.connection_string)
        .bind(tenant.is_active)
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) if done.rows_affected() == 1 => {
                info!("Updated tenant '{}' ({})", tenant.identifier, tenant.id);
                true
            }
            Ok(_) => {
                warn!("Tenant {} disappeared before update", tenant.id);
                false
            }
            Err(e) => {
                error!("Failed to update tenant '{}': {}", tenant.identifier, e);
                false
            }
        }
    }

    async fn try_remove(&self, id: Uuid) -> bool {
        set_active(&self.pool, id, false).await
    }

    async fn try_restore(&self, id: Uuid) -> bool {
        set_active(&self.pool, id, true).await
    }
}

async fn set_active(pool: &PgPool, id: Uuid, active: bool) -> bool {
    let result = sqlx::query("UPDATE tenants SET is_active = $2, updated_at = now() WHERE id = $1")
        .bind(id)
        .bind(active)
        .execute(pool)
        .await;

    match result {
        Ok(done) if done.rows_affected() == 1 => {
            info!("Tenant {} marked {}", id, if active { "active" } else { "inactive" });
            true
        }
        Ok(_) => {
            warn!("Tenant {} not found while setting is_active={}", id, active);
            false
        }
        Err(e) => {
            error!("Failed to set is_active={} on tenant {}: {}", active, id, e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::InMemoryTenantStore;

    fn store_with(tenants: &[(&str, bool)]) -> (InMemoryTenantStore, Vec<Tenant>) {
        let tenants: Vec<Tenant> = tenants
            .iter()
            .map(|(identifier, active)| {
                let mut tenant = Tenant::new(*identifier, identifier.to_uppercase());
                tenant.is_active = *active;
                tenant
            })
            .collect();
        (InMemoryTenantStore::with(tenants.clone()), tenants)
    }

    #[tokio::test]
    async fn resolves_by_identifier_first() {
        let (store, tenants) = store_with(&[("acme", true), ("globex", true)]);

        let found = store.try_get("globex").await.unwrap();
        assert_eq!(found.id, tenants[1].id);
        assert_eq!(store.id_lookups(), 0);
    }

    #[tokio::test]
    async fn falls_back_to_id() {
        let (store, tenants) = store_with(&[("acme", true)]);

        let found = store.try_get(&tenants[0].id.to_string()).await.unwrap();
        assert_eq!(found.identifier, "acme");
        assert_eq!(store.id_lookups(), 1);
    }

    #[tokio::test]
    async fn identifier_match_is_case_insensitive() {
        let (store, _) = store_with(&[("acme", true)]);
        assert!(store.try_get("ACME").await.is_some());
    }

    #[tokio::test]
    async fn returns_none_when_nothing_matches() {
        let (store, _) = store_with(&[("acme", true)]);

        assert!(store.try_get("initech").await.is_none());
        assert!(store.try_get(&Uuid::new_v4().to_string()).await.is_none());
        assert!(store.try_get("   ").await.is_none());
    }

    #[tokio::test]
    async fn inactive_tenants_are_still_found() {
        let (store, _) = store_with(&[("acme", false)]);

        let found = store.try_get("acme").await.unwrap();
        assert!(!found.is_active);
    }

    #[tokio::test]
    async fn soft_delete_and_restore_flip_is_active() {
        let (store, tenants) = store_with(&[("acme", true)]);
        let id = tenants[0].id;

        assert!(store.try_remove(id).await);
        assert!(!store.try_get("acme").await.unwrap().is_active);
        assert!(store.try_restore(id).await);
        assert!(store.try_get("acme").await.unwrap().is_active);
        assert!(!store.try_remove(Uuid::new_v4()).await);
    }

    #[sqlx::test(migrations = "./migrations/iam")]
    async fn postgres_store_round_trips_the_registry(pool: PgPool) {
        let store = PgTenantStore::new(pool);
        let mut tenant = Tenant::new("acme", "Acme");
        tenant.database_name = Some("tenant_0123456789abcdef".into());

        assert!(store.try_add(&tenant).await);
        assert!(!store.try_add(&Tenant::new("Acme", "Acme again")).await);

        let found = store.try_get("ACME").await.unwrap();
        assert_eq!(found.id, tenant.id);
        assert_eq!(found.database_name.as_deref(), Some("tenant_0123456789abcdef"));
        assert_eq!(store.try_get(&tenant.id.to_string()).await.unwrap().identifier, "acme");
        assert!(store.try_get("globex").await.is_none());

        assert!(store.try_remove(tenant.id).await);
        assert!(!store.try_get("acme").await.unwrap().is_active);
        assert!(store.try_restore(tenant.id).await);
        assert!(store.try_get("acme").await.unwrap().is_active);
        assert!(!store.try_remove(Uuid::new_v4()).await);
    }
}
