pub mod migrations;
pub mod store;

pub use migrations::{
    migrate_iam, migrate_one, migrate_tenants, MigrationError, MigrationReport, MigrationStatus, SqlxTenantMigrate,
    TenantMigrate, TenantMigrationOutcome,
};
pub use store::{PgTenantStore, TenantStore};
