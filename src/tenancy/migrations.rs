//! Schema migrations for the IAM database and every tenant database.

use std::collections::HashSet;

use async_trait::async_trait;
use serde::Serialize;
use sqlx::migrate::{Migrate, MigrateError, Migrator};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::database::models::tenant::Tenant;
use crate::database::{DatabaseError, DatabaseManager};

pub static IAM_MIGRATOR: Migrator = sqlx::migrate!("./migrations/iam");
pub static TENANT_MIGRATOR: Migrator = sqlx::migrate!("./migrations/tenant");

#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error(transparent)]
    Database(#[from] DatabaseError),
    #[error(transparent)]
    Migrate(#[from] MigrateError),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Applies the tenant migration set to one tenant database
#[async_trait]
pub trait TenantMigrate: Send + Sync {
    /// Versions not yet applied
    async fn pending(&self, tenant: &Tenant) -> Result<Vec<i64>, MigrationError>;

    /// Apply everything pending, returning the versions applied
    async fn apply(&self, tenant: &Tenant) -> Result<Vec<i64>, MigrationError>;
}

pub struct SqlxTenantMigrate;

#[async_trait]
impl TenantMigrate for SqlxTenantMigrate {
    async fn pending(&self, tenant: &Tenant) -> Result<Vec<i64>, MigrationError> {
        let pool = DatabaseManager::tenant_pool(tenant).await?;
        let mut conn = pool.acquire().await?;

        conn.ensure_migrations_table().await?;
        let applied: HashSet<i64> = conn
            .list_applied_migrations()
            .await?
            .into_iter()
            .map(|m| m.version)
            .collect();

        Ok(TENANT_MIGRATOR
            .iter()
            .filter(|m| !m.migration_type.is_down_migration())
            .map(|m| m.version)
            .filter(|version| !applied.contains(version))
            .collect())
    }

    async fn apply(&self, tenant: &Tenant) -> Result<Vec<i64>, MigrationError> {
        let pending = self.pending(tenant).await?;
        if pending.is_empty() {
            return Ok(pending);
        }

        let pool = DatabaseManager::tenant_pool(tenant).await?;
        TENANT_MIGRATOR.run(&pool).await?;
        Ok(pending)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStatus {
    Migrated,
    UpToDate,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct TenantMigrationOutcome {
    pub tenant_id: Uuid,
    pub identifier: String,
    pub status: MigrationStatus,
    pub applied: Vec<i64>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MigrationReport {
    pub total: usize,
    pub migrated: usize,
    pub up_to_date: usize,
    pub skipped: usize,
    pub failed: usize,
    pub outcomes: Vec<TenantMigrationOutcome>,
}

impl MigrationReport {
    pub fn succeeded(&self) -> usize {
        self.migrated + self.up_to_date
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    fn record(&mut self, outcome: TenantMigrationOutcome) {
        match outcome.status {
            MigrationStatus::Migrated => self.migrated += 1,
            MigrationStatus::UpToDate => self.up_to_date += 1,
            MigrationStatus::Skipped => self.skipped += 1,
            MigrationStatus::Failed => self.failed += 1,
        }
        self.outcomes.push(outcome);
    }
}

/// Migrate every active tenant in turn. One tenant failing does not stop the others.
pub async fn migrate_tenants(tenants: &[Tenant], migrate: &dyn TenantMigrate) -> MigrationReport {
    let mut report = MigrationReport::default();

    for tenant in tenants.iter().filter(|t| t.is_active) {
        report.total += 1;
        let outcome = migrate_one(tenant, migrate).await;
        report.record(outcome);
    }

    info!(
        "Tenant migrations finished: {} total, {} migrated, {} up to date, {} skipped, {} failed",
        report.total, report.migrated, report.up_to_date, report.skipped, report.failed
    );
    report
}

/// Migrate one tenant, whatever its active flag
pub async fn migrate_one(tenant: &Tenant, migrate: &dyn TenantMigrate) -> TenantMigrationOutcome {
    let outcome = |status, applied, error| TenantMigrationOutcome {
        tenant_id: tenant.id,
        identifier: tenant.identifier.clone(),
        status,
        applied,
        error,
    };

    if tenant.connection_target().is_none() {
        warn!("Skipping tenant '{}': no connection string", tenant.identifier);
        return outcome(MigrationStatus::Skipped, Vec::new(), None);
    }

    let pending = match migrate.pending(tenant).await {
        Ok(pending) => pending,
        Err(e) => {
            error!("Failed to read migration state for tenant '{}': {}", tenant.identifier, e);
            return outcome(MigrationStatus::Failed, Vec::new(), Some(e.to_string()));
        }
    };

    if pending.is_empty() {
        info!("Tenant '{}' is up to date", tenant.identifier);
        return outcome(MigrationStatus::UpToDate, Vec::new(), None);
    }

    info!("Applying {} migration(s) to tenant '{}'", pending.len(), tenant.identifier);
    match migrate.apply(tenant).await {
        Ok(applied) => {
            info!("Tenant '{}' migrated: {:?}", tenant.identifier, applied);
            outcome(MigrationStatus::Migrated, applied, None)
        }
        Err(e) => {
            error!("Migration failed for tenant '{}': {}", tenant.identifier, e);
            outcome(MigrationStatus::Failed, Vec::new(), Some(e.to_string()))
        }
    }
}

/// Apply the IAM migration set to the registry database
pub async fn migrate_iam() -> Result<(), MigrationError> {
    let pool = DatabaseManager::iam_pool().await?;
    IAM_MIGRATOR.run(&pool).await?;
    info!("IAM database migrations applied");
    Ok(())
}
